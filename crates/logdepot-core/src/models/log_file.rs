//! Collected log bundle records

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DepotId, ServerId, TaskId};

pub type LogFileId = u64;

/// Kind of log bundle being collected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogType {
    /// Rotated logs and configuration for a past day
    Archive,
    /// The live logs
    Current,
}

impl LogType {
    /// Lowercase form used in progress messages
    pub fn as_lowercase(&self) -> &'static str {
        match self {
            LogType::Archive => "archive",
            LogType::Current => "current",
        }
    }
}

impl std::fmt::Display for LogType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogType::Archive => "Archive",
            LogType::Current => "Current",
        };
        f.write_str(s)
    }
}

/// State of a log bundle.
///
/// ```text
/// Collecting ──upload ok──▶ Available
///      │
///      └──any failure────▶ Error
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFileState {
    /// Being zipped or uploaded
    #[default]
    Collecting,
    /// Uploaded to the depot
    Available,
    /// Zip or upload failed
    Error,
}

impl std::fmt::Display for LogFileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogFileState::Collecting => "collecting",
            LogFileState::Available => "available",
            LogFileState::Error => "error",
        };
        f.write_str(s)
    }
}

/// One collected log bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogFile {
    /// Assigned by the store on insert
    pub id: LogFileId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Covers a bounded past window and is never collected twice
    pub historical: bool,
    pub state: LogFileState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging_started_on: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging_ended_on: Option<DateTime<Utc>>,
    /// Archive produced on the local host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_file: Option<PathBuf>,
    /// Where the depot stored the archive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depot_id: Option<DepotId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<ServerId>,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

impl LogFile {
    fn blank(historical: bool) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: String::new(),
            description: None,
            historical,
            state: LogFileState::Collecting,
            logging_started_on: None,
            logging_ended_on: None,
            local_file: None,
            log_uri: None,
            depot_id: None,
            task_id: None,
            resource_id: None,
            created_on: now,
            updated_on: now,
        }
    }

    /// A new bundle for a past window
    pub fn historical() -> Self {
        Self::blank(true)
    }

    /// A new bundle for the live logs
    pub fn current() -> Self {
        Self::blank(false)
    }

    pub fn is_collecting(&self) -> bool {
        self.state == LogFileState::Collecting
    }
}

/// Query over log files. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFileFilter {
    pub resource_id: Option<ServerId>,
    pub historical: Option<bool>,
    pub name: Option<String>,
    pub state: Option<LogFileState>,
    pub logging_started_on: Option<DateTime<Utc>>,
    pub logging_ended_on: Option<DateTime<Utc>>,
    /// Only records created after this instant
    pub created_after: Option<DateTime<Utc>>,
}

impl LogFileFilter {
    pub fn for_resource(resource_id: ServerId) -> Self {
        Self {
            resource_id: Some(resource_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, log_file: &LogFile) -> bool {
        if let Some(id) = self.resource_id {
            if log_file.resource_id != Some(id) {
                return false;
            }
        }
        if let Some(historical) = self.historical {
            if log_file.historical != historical {
                return false;
            }
        }
        if let Some(ref name) = self.name {
            if &log_file.name != name {
                return false;
            }
        }
        if let Some(state) = self.state {
            if log_file.state != state {
                return false;
            }
        }
        if let Some(started) = self.logging_started_on {
            if log_file.logging_started_on != Some(started) {
                return false;
            }
        }
        if let Some(ended) = self.logging_ended_on {
            if log_file.logging_ended_on != Some(ended) {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if log_file.created_on <= after {
                return false;
            }
        }
        true
    }
}
