//! Depot transports - moving a finished archive to its depot

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use logdepot_core::Depot;
use tracing::info;

use crate::error::StepError;

/// Uploads archives to a depot
#[async_trait]
pub trait DepotTransport: Send + Sync {
    /// Store `local_file` at `relative_path` inside the depot (under the
    /// depot's support case, when set) and return the resulting URI
    async fn upload(
        &self,
        depot: &Depot,
        local_file: &Path,
        relative_path: &str,
    ) -> Result<String, StepError>;
}

/// Depot backed by a local or mounted directory (`file://` URIs)
#[derive(Debug, Clone, Default)]
pub struct FileSystemDepot;

impl FileSystemDepot {
    pub fn new() -> Self {
        Self
    }

    /// Directory a depot URI points at
    pub fn root_of(depot: &Depot) -> Result<PathBuf, StepError> {
        depot
            .uri
            .strip_prefix("file://")
            .map(PathBuf::from)
            .ok_or_else(|| {
                StepError::Upload(format!(
                    "unsupported depot URI '{}' for depot {}",
                    depot.uri, depot.name
                ))
            })
    }
}

/// `value` as a path that stays below the depot root: relative, non-empty
/// and made only of plain names
fn contained<'a>(what: &str, value: &'a str) -> Result<&'a Path, StepError> {
    let path = Path::new(value);
    let plain = path.components().all(|c| matches!(c, Component::Normal(_)));
    if value.is_empty() || !plain {
        return Err(StepError::Upload(format!(
            "{} '{}' must be a relative path inside the depot",
            what, value
        )));
    }
    Ok(path)
}

#[async_trait]
impl DepotTransport for FileSystemDepot {
    async fn upload(
        &self,
        depot: &Depot,
        local_file: &Path,
        relative_path: &str,
    ) -> Result<String, StepError> {
        let mut destination = Self::root_of(depot)?;
        if let Some(ref case) = depot.support_case {
            destination.push(contained("support case", case)?);
        }
        destination.push(contained("depot path", relative_path)?);

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = tokio::fs::copy(local_file, &destination).await?;

        let uri = format!("file://{}", destination.display());
        info!(depot = %depot.name, %uri, bytes, "Uploaded archive to depot");
        Ok(uri)
    }
}
