//! Pattern resolution - which files make up a log bundle

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use logdepot_core::LogType;
use tracing::{debug, warn};

use crate::config::CollectionConfig;

/// Locates the database data directory whose logs and configs are
/// bundled with the current logs
pub trait DataDirLocator: Send + Sync {
    fn data_directory(&self) -> Option<PathBuf>;
}

/// Uses the configured directory, else the `PGDATA` environment variable
#[derive(Debug, Clone, Default)]
pub struct ConfiguredDataDir {
    configured: Option<PathBuf>,
}

impl ConfiguredDataDir {
    pub fn new(configured: Option<PathBuf>) -> Self {
        Self { configured }
    }
}

impl DataDirLocator for ConfiguredDataDir {
    fn data_directory(&self) -> Option<PathBuf> {
        self.configured.clone().or_else(|| {
            std::env::var_os("PGDATA")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        })
    }
}

/// Resolves the glob patterns collected for each log type
pub struct PatternResolver {
    config: CollectionConfig,
    locator: Arc<dyn DataDirLocator>,
}

impl PatternResolver {
    pub fn new(config: CollectionConfig) -> Self {
        let locator = Arc::new(ConfiguredDataDir::new(config.pg_data_dir.clone()));
        Self { config, locator }
    }

    /// Replace the data directory lookup
    pub fn with_locator(mut self, locator: Arc<dyn DataDirLocator>) -> Self {
        self.locator = locator;
        self
    }

    /// Patterns for a bundle of `log_type`.
    ///
    /// Archive bundles are `base_pattern` followed by the configured archive
    /// patterns. Current bundles ignore `base_pattern` and are the configured
    /// current patterns united with the database log paths.
    pub fn resolve(&self, log_type: LogType, base_pattern: Option<&str>) -> Vec<String> {
        match log_type {
            LogType::Archive => base_pattern
                .into_iter()
                .map(|p| self.absolutize(p))
                .chain(self.config.archive_patterns.iter().map(|p| self.absolutize(p)))
                .collect(),
            LogType::Current => self.current_patterns(),
        }
    }

    /// Configured current patterns ∪ database log patterns, first
    /// occurrence wins
    pub fn current_patterns(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.config
            .current_patterns
            .iter()
            .map(|p| self.absolutize(p))
            .chain(self.pg_log_patterns())
            .filter(|p| seen.insert(p.clone()))
            .collect()
    }

    /// `<data-dir>/*.conf` and `<data-dir>/pg_log/*`, or nothing when no
    /// data directory is known
    pub fn pg_log_patterns(&self) -> Vec<String> {
        match self.locator.data_directory() {
            Some(dir) => vec![
                dir.join("*.conf").to_string_lossy().into_owned(),
                dir.join("pg_log").join("*").to_string_lossy().into_owned(),
            ],
            None => Vec::new(),
        }
    }

    /// One pattern per rotated day found in the log directory:
    /// `<log_dir>/*-YYYYMMDD.gz`, oldest first
    pub fn historical_patterns(&self) -> Vec<String> {
        let log_dir = self.config.log_path();
        let entries = match std::fs::read_dir(&log_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %log_dir.display(), error = %e, "Cannot list log directory");
                return Vec::new();
            }
        };

        let days: BTreeSet<String> = entries
            .flatten()
            .filter_map(|entry| rotation_day(&entry.file_name().to_string_lossy()))
            .collect();
        debug!(dir = %log_dir.display(), days = days.len(), "Found rotated log days");

        days.into_iter()
            .map(|day| {
                log_dir
                    .join(format!("*-{}.gz", day))
                    .to_string_lossy()
                    .into_owned()
            })
            .collect()
    }

    /// Resolve a relative pattern against the configured root
    pub fn absolutize(&self, pattern: &str) -> String {
        self.config.absolute(pattern).to_string_lossy().into_owned()
    }
}

/// `evm.log-20240301.gz` → `20240301`
fn rotation_day(file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(".gz")?;
    let (_, day) = stem.rsplit_once('-')?;
    (day.len() == 8 && day.bytes().all(|b| b.is_ascii_digit())).then(|| day.to_string())
}
