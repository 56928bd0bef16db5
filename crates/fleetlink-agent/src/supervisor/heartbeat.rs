//! Heartbeat producer: periodic telemetry frames for the live session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use fleetlink_proto::{Envelope, TelemetryReport};

use super::error::AgentError;
use super::sink::{EnvelopeSink, SinkError};
use crate::metrics::{MetricError, MetricSource};

/// Emit one heartbeat per interval tick until the session ends.
///
/// The first tick fires immediately, so a fresh session reports without
/// waiting a full period. A closed transport ends the loop cleanly; any
/// other send failure is logged and returned so the supervisor tears the
/// session down.
pub(crate) async fn heartbeat_loop<M, S>(
    interval: Duration,
    metrics: Arc<Mutex<M>>,
    mut sink: S,
) -> Result<(), AgentError>
where
    M: MetricSource,
    S: EnvelopeSink,
{
    let mut timer = tokio::time::interval(interval);

    loop {
        timer.tick().await;

        let report = {
            let mut source = metrics.lock().await;
            sample_metrics(&mut *source)
        };

        match sink.send(Envelope::Heartbeat { data: report }).await {
            Ok(()) => {
                debug!(
                    cpu = report.cpu_usage,
                    ram = report.ram_usage,
                    disk = report.disk_usage,
                    "Heartbeat sent"
                );
            }
            Err(SinkError::Closed) => {
                info!("Transport closed; heartbeat loop ending");
                return Ok(());
            }
            Err(e) => {
                error!(error = %e, "Unexpected heartbeat send failure");
                return Err(AgentError::Session(e.to_string()));
            }
        }
    }
}

/// Sample all three metrics independently. A failed read is reported as
/// `0.0`; the beat itself is never suppressed.
pub(crate) fn sample_metrics<M: MetricSource>(metrics: &mut M) -> TelemetryReport {
    TelemetryReport {
        cpu_usage: read_or_zero("cpu_usage", metrics.cpu_usage()),
        ram_usage: read_or_zero("ram_usage", metrics.ram_usage()),
        disk_usage: read_or_zero("disk_usage", metrics.disk_usage()),
    }
}

fn read_or_zero(metric: &'static str, value: Result<f64, MetricError>) -> f64 {
    match value {
        Ok(v) => v,
        Err(e) => {
            warn!(metric, error = %e, "Metric read failed; reporting 0");
            0.0
        }
    }
}
