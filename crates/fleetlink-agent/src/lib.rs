//! `FleetLink` Agent
//!
//! Device-resident agent that keeps a persistent WebSocket session to the
//! relay: identity handshake, periodic heartbeat telemetry, and remote
//! command execution.

pub mod capture;
pub mod exec;
pub mod identity;
pub mod metrics;
pub mod session;
pub mod supervisor;

pub use session::{ConnectionStatus, SessionHandle};
pub use supervisor::{AgentConfig, ReconnectPolicy, Supervisor};
