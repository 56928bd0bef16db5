//! Host utilization metrics for heartbeat telemetry.

use sysinfo::{Disks, System};

/// Errors from reading a single host metric.
#[derive(Debug, thiserror::Error)]
pub enum MetricError {
    #[error("Metric unavailable: {0}")]
    Unavailable(String),
}

/// Source of host utilization percentages.
///
/// Each reading is independent: one metric failing must not prevent the
/// others from being sampled.
pub trait MetricSource: Send {
    fn cpu_usage(&mut self) -> Result<f64, MetricError>;
    fn ram_usage(&mut self) -> Result<f64, MetricError>;
    fn disk_usage(&mut self) -> Result<f64, MetricError>;
}

/// `MetricSource` backed by `sysinfo`.
pub struct SysinfoMetrics {
    system: System,
}

impl SysinfoMetrics {
    pub fn new() -> Self {
        let mut system = System::new();
        // Prime CPU counters; usage is computed between refreshes.
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self { system }
    }
}

impl Default for SysinfoMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for SysinfoMetrics {
    fn cpu_usage(&mut self) -> Result<f64, MetricError> {
        self.system.refresh_cpu_usage();
        let usage = f64::from(self.system.global_cpu_usage());
        if usage.is_finite() {
            Ok(usage.clamp(0.0, 100.0))
        } else {
            Err(MetricError::Unavailable(
                "CPU usage reading was not finite".into(),
            ))
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn ram_usage(&mut self) -> Result<f64, MetricError> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return Err(MetricError::Unavailable(
                "total memory reported as zero".into(),
            ));
        }
        let used = self.system.used_memory();
        Ok((used as f64 / total as f64 * 100.0).clamp(0.0, 100.0))
    }

    #[allow(clippy::cast_precision_loss)]
    fn disk_usage(&mut self) -> Result<f64, MetricError> {
        let disks = Disks::new_with_refreshed_list();
        let mut total: u64 = 0;
        let mut available: u64 = 0;
        for disk in disks.list() {
            total = total.saturating_add(disk.total_space());
            available = available.saturating_add(disk.available_space());
        }
        if total == 0 {
            return Err(MetricError::Unavailable(
                "no disks with reported capacity".into(),
            ));
        }
        let used = total.saturating_sub(available);
        Ok((used as f64 / total as f64 * 100.0).clamp(0.0, 100.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ram_usage_is_a_percentage() {
        let mut metrics = SysinfoMetrics::new();
        let ram = metrics.ram_usage().unwrap();
        assert!((0.0..=100.0).contains(&ram));
    }

    #[test]
    fn cpu_usage_is_a_percentage() {
        let mut metrics = SysinfoMetrics::new();
        let cpu = metrics.cpu_usage().unwrap();
        assert!((0.0..=100.0).contains(&cpu));
    }

    #[test]
    fn disk_usage_is_a_percentage_when_available() {
        let mut metrics = SysinfoMetrics::new();
        if let Ok(disk) = metrics.disk_usage() {
            assert!((0.0..=100.0).contains(&disk));
        }
    }
}
