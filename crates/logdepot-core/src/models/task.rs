//! Task records tracking one collection request

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ServerId;

pub type TaskId = u64;

/// Name prefix shared by every log retrieval task
pub const LOG_RETRIEVAL_TASK_PREFIX: &str = "Zipped log retrieval for ";

/// Message written to tasks swept up by the startup cleanup
pub const INCOMPLETE_AT_STARTUP_MESSAGE: &str = "Log Collection Incomplete during Server Startup";

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    #[default]
    Queued,
    Active,
    Finished,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Queued => "Queued",
            TaskState::Active => "Active",
            TaskState::Finished => "Finished",
        };
        f.write_str(s)
    }
}

/// Outcome reported alongside the state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    Ok,
    Warn,
    Error,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Ok => "Ok",
            TaskStatus::Warn => "Warn",
            TaskStatus::Error => "Error",
        };
        f.write_str(s)
    }
}

/// Progress record polled by whoever requested the collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub state: TaskState,
    pub status: TaskStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<ServerId>,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

impl Task {
    pub fn new(name: impl Into<String>, server_id: Option<ServerId>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: name.into(),
            state: TaskState::Queued,
            status: TaskStatus::Ok,
            message: String::new(),
            server_id,
            created_on: now,
            updated_on: now,
        }
    }

    pub fn update_status(&mut self, state: TaskState, status: TaskStatus, message: impl Into<String>) {
        self.state = state;
        self.status = status;
        self.message = message.into();
        self.updated_on = Utc::now();
    }

    pub fn is_finished(&self) -> bool {
        self.state == TaskState::Finished
    }

    pub fn is_log_retrieval(&self) -> bool {
        self.name.starts_with(LOG_RETRIEVAL_TASK_PREFIX)
    }
}
