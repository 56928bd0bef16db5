//! Supervisor error types.

/// Errors that can occur in the agent's relay session.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Handshake error: {0}")]
    Handshake(String),

    #[error("Session error: {0}")]
    Session(String),
}
