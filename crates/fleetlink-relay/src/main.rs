//! FleetLink Relay Server
//!
//! WebSocket relay that connects device agents with browser consoles and
//! keeps the device inventory in SQLite.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use fleetlink_core::db::unix_timestamp;
use fleetlink_relay::registry::DeviceGroups;
use fleetlink_relay::server::{app, AppState};
use fleetlink_relay::storage::RelayDatabase;

#[derive(Parser, Debug)]
#[command(name = "fleetlink-relay")]
#[command(
    version,
    about = "FleetLink relay server - WebSocket router for device fleets"
)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:8000", env = "FLEETLINK_RELAY_ADDR")]
    addr: SocketAddr,

    /// Path to SQLite database file.
    #[arg(long, env = "FLEETLINK_RELAY_DB")]
    db_path: Option<PathBuf>,

    /// Days of telemetry history to keep.
    #[arg(long, default_value_t = 30, env = "FLEETLINK_TELEMETRY_RETENTION_DAYS")]
    telemetry_retention_days: u32,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "FLEETLINK_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "FLEETLINK_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = format!("fleetlink_relay={}", args.log_level);
    fleetlink_core::tracing_init::init_tracing(&default_filter, args.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %args.addr,
        "Starting fleetlink-relay"
    );

    let db = match &args.db_path {
        Some(path) => {
            info!(path = %path.display(), "Opening relay database");
            RelayDatabase::open(path).await?
        }
        None => {
            let default_path = default_db_path()?;
            info!(path = %default_path.display(), "Opening relay database (default path)");
            RelayDatabase::open(&default_path).await?
        }
    };

    let state = AppState {
        db: db.clone(),
        groups: DeviceGroups::new(),
    };

    // Background task prunes old telemetry samples (hourly)
    let retention_days = i64::from(args.telemetry_retention_days);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            let cutoff = unix_timestamp().saturating_sub(retention_days * 86_400);
            match db.prune_telemetry(cutoff).await {
                Ok(removed) if removed > 0 => {
                    info!(removed, "Telemetry retention sweep completed");
                }
                Err(e) => {
                    warn!(error = %e, "Telemetry retention sweep failed");
                }
                _ => {}
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    info!(addr = %args.addr, "Relay server listening");

    tokio::select! {
        result = axum::serve(listener, app(state)).into_future() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Relay stopped");
    Ok(())
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".fleetlink").join("relay.db"))
}
