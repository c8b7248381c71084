//! Zip packaging of matched log files

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::StepError;

/// What went into an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    pub files: usize,
    pub bytes: u64,
}

/// Packages every file matching a set of globs into one archive
#[async_trait]
pub trait Archiver: Send + Sync {
    async fn zip_logs(&self, archive: &Path, patterns: &[String]) -> Result<ArchiveSummary, StepError>;
}

/// Deflate zip writer. Entry names are relative to `root` when the file
/// lives under it, else the absolute path without its leading `/`.
#[derive(Debug, Clone)]
pub struct ZipArchiver {
    root: PathBuf,
}

impl ZipArchiver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn entry_name(&self, path: &Path) -> String {
        let relative = path
            .strip_prefix(&self.root)
            .unwrap_or_else(|_| path.strip_prefix("/").unwrap_or(path));
        relative.to_string_lossy().replace('\\', "/")
    }
}

#[async_trait]
impl Archiver for ZipArchiver {
    async fn zip_logs(&self, archive: &Path, patterns: &[String]) -> Result<ArchiveSummary, StepError> {
        let this = self.clone();
        let archive = archive.to_path_buf();
        let patterns = patterns.to_vec();
        tokio::task::spawn_blocking(move || this.write_archive(&archive, &patterns))
            .await
            .map_err(|e| StepError::Archive(format!("archive task failed: {}", e)))?
    }
}

impl ZipArchiver {
    fn write_archive(&self, archive: &Path, patterns: &[String]) -> Result<ArchiveSummary, StepError> {
        let files = expand_patterns(patterns)?;
        if files.is_empty() {
            return Err(StepError::NothingMatched(patterns.to_vec()));
        }

        if let Some(parent) = archive.parent() {
            fs::create_dir_all(parent)?;
        }

        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .compression_level(Some(6));
        let mut writer = ZipWriter::new(File::create(archive)?);
        let mut bytes = 0u64;

        for path in &files {
            let name = self.entry_name(path);
            debug!(entry = %name, "Adding file to archive");
            writer.start_file(name, options)?;
            let mut source = File::open(path)?;
            bytes += io::copy(&mut source, &mut writer)?;
        }
        writer.finish()?;

        info!(archive = %archive.display(), files = files.len(), bytes, "Archive written");
        Ok(ArchiveSummary {
            path: archive.to_path_buf(),
            files: files.len(),
            bytes,
        })
    }
}

/// Regular files matched by any pattern, sorted and de-duplicated
fn expand_patterns(patterns: &[String]) -> Result<BTreeSet<PathBuf>, StepError> {
    let mut files = BTreeSet::new();
    for pattern in patterns {
        let paths = glob::glob(pattern).map_err(|e| StepError::InvalidPattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        files.extend(paths.flatten().filter(|p| p.is_file()));
    }
    Ok(files)
}
