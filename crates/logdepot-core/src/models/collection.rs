//! Options carried by a collection request

use serde::{Deserialize, Serialize};

use super::TaskId;

/// Which depot a collection uploads to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepotContext {
    /// The depot configured on the server itself
    #[default]
    Server,
    /// The depot configured on the server's zone
    Zone,
}

impl DepotContext {
    /// Any context other than `"Zone"` selects the server depot
    pub fn from_context(context: Option<&str>) -> Self {
        match context {
            Some("Zone") => DepotContext::Zone,
            _ => DepotContext::Server,
        }
    }
}

/// Arguments of one `post_logs` run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionOptions {
    pub task_id: TaskId,
    #[serde(default)]
    pub context: DepotContext,
    /// Skip historical windows and only collect the live logs
    #[serde(default)]
    pub only_current: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_case: Option<String>,
}

impl CollectionOptions {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            ..Default::default()
        }
    }

    /// Support case with blank values treated as absent
    pub fn support_case(&self) -> Option<String> {
        self.support_case
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}
