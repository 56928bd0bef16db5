//! `FleetLink` Core Library
//!
//! Shared functionality for `FleetLink` components:
//! - `SQLite` pool helpers and common database errors
//! - tracing/logging initialization

pub mod db;
pub mod tracing_init;
