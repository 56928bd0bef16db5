//! Data models for the FleetLink relay storage layer.

use serde::{Deserialize, Serialize};

/// A device known to the relay.
///
/// The MAC address is the stable identity; the row id survives agent
/// reinstalls and hostname changes as long as the MAC does.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    pub id: String,
    pub mac_address: String,
    pub hostname: String,
    pub os_info: String,
    pub local_ip: String,
    pub public_ip: String,
    pub agent_version: String,
    /// 1 while an agent session holds the device's group slot.
    pub online: i64,
    /// Unix timestamp of the last handshake, heartbeat, or status change.
    pub last_seen: i64,
    /// Free-form hardware details as a JSON document.
    pub specs: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Device {
    pub const fn is_online(&self) -> bool {
        self.online != 0
    }
}

/// One persisted heartbeat sample.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TelemetryRow {
    pub id: i64,
    pub device_id: String,
    pub cpu_usage: f64,
    pub ram_usage: f64,
    pub disk_usage: f64,
    /// Unix timestamp assigned by the relay at ingest.
    pub recorded_at: i64,
}
