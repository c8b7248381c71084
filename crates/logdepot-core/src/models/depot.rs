//! Storage depot records

use serde::{Deserialize, Serialize};

pub type DepotId = u64;

/// Destination for uploaded log archives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Depot {
    pub id: DepotId,
    pub name: String,
    /// Depot location (e.g. `file:///srv/depot`)
    pub uri: String,
    /// Support case the next uploads are filed under
    #[serde(skip_serializing_if = "Option::is_none")]
    pub support_case: Option<String>,
}

impl Depot {
    pub fn new(id: DepotId, name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            uri: uri.into(),
            support_case: None,
        }
    }
}
