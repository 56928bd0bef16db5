//! Supervisor configuration.

use std::time::Duration;

/// Configuration for the agent's relay connection.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Relay WebSocket URL (e.g., "ws://relay.example.com:8000/ws/agent").
    pub server_url: String,

    /// Interval between heartbeat frames.
    pub heartbeat_interval: Duration,

    /// Wall-clock cap on a single remote command.
    pub command_timeout: Duration,

    /// Reconnection policy.
    pub reconnect: ReconnectPolicy,
}

/// Reconnection schedule.
///
/// The default is the protocol's fixed schedule: retry forever with a
/// constant delay. A multiplier above 1.0 turns it into capped exponential
/// backoff for deployments that want it.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Initial delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnect attempts.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub multiplier: f64,
    /// Maximum number of reconnect attempts (None = unlimited).
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}

impl ReconnectPolicy {
    /// Constant-delay schedule with unlimited attempts.
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            max_attempts: None,
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.multiplier.powi(attempt as i32);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// Whether another attempt should be made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt < max,
            None => true,
        }
    }
}

impl AgentConfig {
    /// Create a config with the protocol defaults for the given relay URL.
    pub fn new(server_url: String) -> Self {
        Self {
            server_url,
            heartbeat_interval: Duration::from_secs(5),
            command_timeout: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
        }
    }
}
