//! Outbound envelope sink feeding the session writer task.

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use fleetlink_proto::Envelope;

/// Errors from pushing an envelope toward the relay.
#[derive(Debug, thiserror::Error)]
pub(crate) enum SinkError {
    /// The transport is gone; a normal way for a session to end.
    #[error("transport closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Where the heartbeat producer and dispatcher push their frames.
pub(crate) trait EnvelopeSink {
    async fn send(&mut self, envelope: Envelope) -> Result<(), SinkError>;
}

/// Production sink: encodes onto the writer task's channel.
pub(crate) struct ChannelSink {
    tx: mpsc::Sender<Message>,
}

impl ChannelSink {
    pub(crate) const fn new(tx: mpsc::Sender<Message>) -> Self {
        Self { tx }
    }
}

impl EnvelopeSink for ChannelSink {
    async fn send(&mut self, envelope: Envelope) -> Result<(), SinkError> {
        let text = envelope
            .to_json()
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        self.tx
            .send(Message::Text(text))
            .await
            .map_err(|_| SinkError::Closed)
    }
}
