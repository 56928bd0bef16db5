//! Storage layer for the FleetLink relay.
//!
//! Persists the device inventory and telemetry history in SQLite. The
//! database handle is cheap to clone and shared across connection handlers.

pub mod db;
pub mod models;
pub mod queries;


pub use db::{DatabaseError, RelayDatabase};
pub use models::{Device, TelemetryRow};
