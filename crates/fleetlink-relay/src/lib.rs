//! FleetLink Relay Server Library
//!
//! Core functionality for the FleetLink relay:
//! - SQLite storage for the device inventory and telemetry history
//! - Per-device subscriber groups (one agent, any number of browsers)
//! - WebSocket routing between agents and browser consoles

pub mod registry;
pub mod router;
pub mod server;
pub mod storage;
