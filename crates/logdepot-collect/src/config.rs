//! Log collection configuration
//!
//! Everything the engine needs to know about where logs live and which
//! globs to collect is passed in explicitly through these types; nothing
//! is looked up from global settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for collecting one server's logs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Directory relative patterns are resolved against
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
    /// Directory holding the live and rotated logs (relative to `root_dir`)
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Scratch directory for archives before upload
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Globs added to every historical bundle (configs and the like)
    #[serde(default)]
    pub archive_patterns: Vec<String>,
    /// Globs making up the current bundle
    #[serde(default)]
    pub current_patterns: Vec<String>,
    /// Database data directory; falls back to `PGDATA` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pg_data_dir: Option<PathBuf>,
    /// Region number used in log file names
    #[serde(default = "default_region")]
    pub region: String,
    /// Queue timeout for one collection run, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("log")
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("logdepot")
}

fn default_region() -> String {
    "0".to_string()
}

fn default_timeout_secs() -> u64 {
    3600
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            log_dir: default_log_dir(),
            work_dir: default_work_dir(),
            archive_patterns: Vec::new(),
            current_patterns: Vec::new(),
            pg_data_dir: None,
            region: default_region(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl CollectionConfig {
    /// Resolve a possibly relative path against `root_dir`
    pub fn absolute(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root_dir.join(path)
        }
    }

    /// Absolute log directory
    pub fn log_path(&self) -> PathBuf {
        self.absolute(&self.log_dir)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Queue worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Idle wait between polls, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Seconds between scheduled collection requests; 0 disables them
    #[serde(default = "default_collect_interval_secs")]
    pub collect_interval_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_collect_interval_secs() -> u64 {
    86_400
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            collect_interval_secs: default_collect_interval_secs(),
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn collect_interval(&self) -> Option<Duration> {
        (self.collect_interval_secs > 0).then(|| Duration::from_secs(self.collect_interval_secs))
    }
}

/// A configured depot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepotConfig {
    pub id: u64,
    pub name: String,
    /// Depot location, e.g. `file:///srv/log-depot`
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_case: Option<String>,
}
