//! Server and zone identity

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DepotId;

pub type ServerId = u64;

/// Identity of the management server whose logs are collected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerIdentity {
    /// Database id of the server record
    pub id: ServerId,
    /// Fleet-wide unique server guid
    pub guid: Uuid,
    /// Human-readable server name
    pub name: String,
    /// Zone the server belongs to
    pub zone: Zone,
    /// Depot configured directly on the server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_depot_id: Option<DepotId>,
}

/// A zone groups servers and may carry its own log depot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_depot_id: Option<DepotId>,
}

impl ServerIdentity {
    /// Short identity used in log lines and task messages
    pub fn who_am_i(&self) -> String {
        format!("Server {} with id [{}]", self.name, self.id)
    }

    /// Queue class name used when addressing this server
    pub fn class_name(&self) -> &'static str {
        "MiqServer"
    }
}
