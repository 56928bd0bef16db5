//! Database queries for the FleetLink relay.

use uuid::Uuid;

use fleetlink_core::db::unix_timestamp;
use fleetlink_proto::{SystemDescriptor, TelemetryReport};

use super::db::{DatabaseError, RelayDatabase};
use super::models::{Device, TelemetryRow};

impl RelayDatabase {
    // ===== Device queries =====

    /// Insert or update a device record keyed by its MAC address.
    ///
    /// Both paths mark the device online and stamp `last_seen`; the row id
    /// is stable across repeat handshakes for the same MAC.
    pub async fn upsert_device(
        &self,
        descriptor: &SystemDescriptor,
    ) -> Result<Device, DatabaseError> {
        let now = unix_timestamp();
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO devices (id, mac_address, hostname, os_info, local_ip, public_ip, \
             agent_version, online, last_seen, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?) \
             ON CONFLICT(mac_address) DO UPDATE SET \
                 hostname = excluded.hostname, \
                 os_info = excluded.os_info, \
                 local_ip = excluded.local_ip, \
                 public_ip = excluded.public_ip, \
                 agent_version = excluded.agent_version, \
                 online = 1, \
                 last_seen = excluded.last_seen, \
                 updated_at = excluded.updated_at",
        )
        .bind(&id)
        .bind(&descriptor.mac_address)
        .bind(&descriptor.hostname)
        .bind(&descriptor.os_info)
        .bind(&descriptor.local_ip)
        .bind(&descriptor.public_ip)
        .bind(&descriptor.agent_version)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_device_by_mac(&descriptor.mac_address).await
    }

    /// Get a device by its id.
    pub async fn get_device(&self, id: &str) -> Result<Device, DatabaseError> {
        sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Device {id}")))
    }

    /// Get a device by its MAC address.
    pub async fn get_device_by_mac(&self, mac: &str) -> Result<Device, DatabaseError> {
        sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE mac_address = ?")
            .bind(mac)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Device with MAC {mac}")))
    }

    /// List all devices, most recently seen first.
    pub async fn list_devices(&self) -> Result<Vec<Device>, DatabaseError> {
        let devices = sqlx::query_as::<_, Device>("SELECT * FROM devices ORDER BY last_seen DESC")
            .fetch_all(self.pool())
            .await?;

        Ok(devices)
    }

    /// Flip the online flag and stamp `last_seen`.
    pub async fn set_online(&self, id: &str, online: bool) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE devices SET online = ?, last_seen = ? WHERE id = ?")
            .bind(i64::from(online))
            .bind(unix_timestamp())
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Stamp `last_seen` for a live session; re-asserts the online flag.
    pub async fn touch_last_seen(&self, id: &str) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE devices SET online = 1, last_seen = ? WHERE id = ?")
            .bind(unix_timestamp())
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Count all known devices.
    pub async fn device_count(&self) -> Result<i64, DatabaseError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM devices")
            .fetch_one(self.pool())
            .await?;

        Ok(count)
    }

    /// Count devices currently marked online.
    pub async fn online_device_count(&self) -> Result<i64, DatabaseError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM devices WHERE online = 1")
            .fetch_one(self.pool())
            .await?;

        Ok(count)
    }

    // ===== Telemetry queries =====

    /// Append one heartbeat sample to the device's telemetry history.
    pub async fn append_telemetry(
        &self,
        device_id: &str,
        report: &TelemetryReport,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO telemetry (device_id, cpu_usage, ram_usage, disk_usage, recorded_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(device_id)
        .bind(report.cpu_usage)
        .bind(report.ram_usage)
        .bind(report.disk_usage)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Fetch the newest telemetry samples for a device, newest first.
    pub async fn recent_telemetry(
        &self,
        device_id: &str,
        limit: u32,
    ) -> Result<Vec<TelemetryRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, TelemetryRow>(
            "SELECT * FROM telemetry WHERE device_id = ? \
             ORDER BY recorded_at DESC, id DESC LIMIT ?",
        )
        .bind(device_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }

    /// Delete telemetry samples recorded before the cutoff timestamp.
    ///
    /// Returns the number of rows removed.
    pub async fn prune_telemetry(&self, older_than: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM telemetry WHERE recorded_at < ?")
            .bind(older_than)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected())
    }
}
