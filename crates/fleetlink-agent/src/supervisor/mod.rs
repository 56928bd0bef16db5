//! Relay connection supervisor.
//!
//! Owns the WebSocket session lifecycle with automatic reconnection. While
//! a session is live, exactly two activities run under it: the heartbeat
//! producer and the inbound dispatcher. The first to finish wins and the
//! other is cancelled, then the session tears down and the retry schedule
//! takes over.

pub mod client;
pub mod config;
pub mod error;

mod dispatch;
mod heartbeat;
mod sink;


pub use client::Supervisor;
pub use config::{AgentConfig, ReconnectPolicy};
pub use error::AgentError;
