//! Work queue messages and their single-flight key

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::TaskId;

pub type MessageId = u64;

/// Queue priorities (lower runs first)
pub const HIGH_PRIORITY: u8 = 20;
pub const NORMAL_PRIORITY: u8 = 100;

/// Kinds of work a server queues for itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchKind {
    /// A log collection run
    PostLogs,
    /// The startup sweep of interrupted collections
    StartupCleanup,
}

impl DispatchKind {
    pub fn method_name(&self) -> &'static str {
        match self {
            DispatchKind::PostLogs => "post_logs",
            DispatchKind::StartupCleanup => "delete_active_log_collections",
        }
    }

    /// Collections are single-flight per server and zone; the sweep only
    /// per server
    pub fn zone_scoped(&self) -> bool {
        matches!(self, DispatchKind::PostLogs)
    }
}

impl std::fmt::Display for DispatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.method_name())
    }
}

impl std::str::FromStr for DispatchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post_logs" => Ok(DispatchKind::PostLogs),
            "delete_active_log_collections" => Ok(DispatchKind::StartupCleanup),
            _ => Err(format!("Unknown queue method: {}", s)),
        }
    }
}

/// Identity of "the same logical request" for single-flight dispatch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueKey {
    pub class_name: String,
    pub instance_id: u64,
    pub method_name: String,
    pub server_guid: Uuid,
    /// Not every method is zone scoped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

impl std::fmt::Display for QueueKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}({}) on {}",
            self.class_name, self.method_name, self.instance_id, self.server_guid
        )?;
        if let Some(ref zone) = self.zone {
            write!(f, " in zone {}", zone)?;
        }
        Ok(())
    }
}

/// Delivery state of a queue message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageState {
    /// Waiting for a worker
    #[default]
    Ready,
    /// Picked up by a worker
    Dequeue,
    /// Delivered successfully. Terminal.
    Ok,
    /// Delivery raised an error. Terminal.
    Error,
    /// Delivery exceeded the message timeout. Terminal.
    Timeout,
}

impl MessageState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageState::Ok | MessageState::Error | MessageState::Timeout)
    }
}

impl std::fmt::Display for MessageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageState::Ready => "ready",
            MessageState::Dequeue => "dequeue",
            MessageState::Ok => "ok",
            MessageState::Error => "error",
            MessageState::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Invoked by the worker once a message reaches a terminal state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageCallback {
    /// Write the delivery outcome onto a task
    TaskStatus { task_id: TaskId },
}

/// Fields applied to a message when it is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub priority: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback: Option<MessageCallback>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub args: serde_json::Value,
}

impl Default for MessageTemplate {
    fn default() -> Self {
        Self {
            priority: NORMAL_PRIORITY,
            callback: None,
            timeout: None,
            args: serde_json::Value::Null,
        }
    }
}

/// A unit of work in the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: MessageId,
    pub key: QueueKey,
    pub priority: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback: Option<MessageCallback>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    pub args: serde_json::Value,
    pub state: MessageState,
    pub created_on: DateTime<Utc>,
}

impl QueueMessage {
    pub fn new(id: MessageId, key: QueueKey, template: MessageTemplate) -> Self {
        Self {
            id,
            key,
            priority: template.priority,
            callback: template.callback,
            timeout: template.timeout,
            args: template.args,
            state: MessageState::Ready,
            created_on: Utc::now(),
        }
    }
}
