//! Daemon configuration file

use std::path::Path;

use logdepot_collect::{CollectionConfig, DepotConfig, QueueConfig};
use logdepot_core::{DepotId, ServerId, ServerIdentity, Zone};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub zone: ZoneConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub depots: Vec<DepotConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub id: ServerId,
    /// Generated when the config is loaded if not set
    #[serde(default)]
    pub guid: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub log_depot_id: Option<DepotId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneConfig {
    #[serde(default = "default_zone_name")]
    pub name: String,
    #[serde(default)]
    pub log_depot_id: Option<DepotId>,
}

fn default_zone_name() -> String {
    "default".to_string()
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            name: default_zone_name(),
            log_depot_id: None,
        }
    }
}

impl DaemonConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let mut config: DaemonConfig = toml::from_str(content)?;
        config.server.guid.get_or_insert_with(Uuid::new_v4);
        for id in [config.server.log_depot_id, config.zone.log_depot_id].into_iter().flatten() {
            if !config.depots.iter().any(|d| d.id == id) {
                tracing::warn!(depot_id = id, "Configured log depot is not defined under [[depots]]");
            }
        }
        Ok(config)
    }

    pub fn identity(&self) -> ServerIdentity {
        ServerIdentity {
            id: self.server.id,
            guid: self.server.guid.unwrap_or_else(Uuid::new_v4),
            name: self.server.name.clone(),
            zone: Zone {
                name: self.zone.name.clone(),
                log_depot_id: self.zone.log_depot_id,
            },
            log_depot_id: self.server.log_depot_id,
        }
    }
}
