//! `FleetLink` Agent
//!
//! Device-resident daemon that connects out to the relay, identifies the
//! host, streams heartbeat telemetry, and executes remote commands.

use std::time::Duration;

use clap::Parser;
use tracing::info;

use fleetlink_agent::capture::UnsupportedCapture;
use fleetlink_agent::metrics::SysinfoMetrics;
use fleetlink_agent::session::SessionHandle;
use fleetlink_agent::supervisor::{AgentConfig, ReconnectPolicy, Supervisor};

#[derive(Parser, Debug)]
#[command(name = "fleetlink-agent")]
#[command(version, about = "FleetLink agent - device-side relay client")]
struct Args {
    /// Relay WebSocket URL
    #[arg(
        long,
        default_value = "ws://localhost:8000/ws/agent",
        env = "FLEETLINK_SERVER_URL"
    )]
    server: String,

    /// Seconds between heartbeat frames
    #[arg(long, default_value_t = 5, env = "FLEETLINK_HEARTBEAT_INTERVAL_SECS")]
    heartbeat_interval_secs: u64,

    /// Seconds between reconnect attempts
    #[arg(long, default_value_t = 5, env = "FLEETLINK_RECONNECT_DELAY_SECS")]
    reconnect_delay_secs: u64,

    /// Seconds before a remote command is killed
    #[arg(long, default_value_t = 30, env = "FLEETLINK_COMMAND_TIMEOUT_SECS")]
    command_timeout_secs: u64,

    /// Log level filter for the agent (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "FLEETLINK_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "FLEETLINK_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_filter = format!("fleetlink_agent={}", args.log_level);
    fleetlink_core::tracing_init::init_tracing(&log_filter, args.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        server = %args.server,
        heartbeat_interval_secs = args.heartbeat_interval_secs,
        "Starting fleetlink-agent"
    );

    let mut config = AgentConfig::new(args.server);
    config.heartbeat_interval = Duration::from_secs(args.heartbeat_interval_secs);
    config.command_timeout = Duration::from_secs(args.command_timeout_secs);
    config.reconnect = ReconnectPolicy::fixed(Duration::from_secs(args.reconnect_delay_secs));

    let session = SessionHandle::default();
    let supervisor = Supervisor::new(config, SysinfoMetrics::new(), UnsupportedCapture, session);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let supervisor_task = tokio::spawn(async move {
        supervisor.run(shutdown_rx).await;
    });

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = supervisor_task.await;

    info!("Agent stopped");
    Ok(())
}
