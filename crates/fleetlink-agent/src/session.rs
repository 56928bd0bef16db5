//! Shared handle onto the current relay session.
//!
//! The supervisor installs the outbound channel while a session is live;
//! other threads (a tray UI, a local control surface) observe status and
//! submit ticket reports through the same handle without touching the
//! connection itself.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use fleetlink_proto::{Envelope, TicketDraft};

/// Connection lifecycle as observed from outside the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    /// Transport is up; the handshake frame is on its way to the relay.
    Handshaking,
    Connected,
}

/// Errors from submitting a frame through the session.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Not connected to the relay")]
    NotConnected,

    #[error("Outbound queue is full")]
    QueueFull,

    #[error("Encoding error: {0}")]
    Encode(String),
}

#[derive(Default)]
struct SessionState {
    status: ConnectionStatus,
    device_id: Option<String>,
    outbound: Option<mpsc::Sender<Message>>,
}

/// Cheaply clonable, thread-safe handle to the live session.
#[derive(Clone, Default)]
pub struct SessionHandle {
    inner: Arc<Mutex<SessionState>>,
}

impl SessionHandle {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state().status
    }

    /// Device id assigned by the relay's handshake ack, if one arrived.
    pub fn device_id(&self) -> Option<String> {
        self.state().device_id.clone()
    }

    /// Queue a `create_ticket` report onto the live session.
    ///
    /// Callable from non-async contexts; the frame is dropped with an error
    /// when no session is connected.
    pub fn submit_ticket(&self, title: &str, description: &str) -> Result<(), SubmitError> {
        let state = self.state();
        if state.status != ConnectionStatus::Connected {
            return Err(SubmitError::NotConnected);
        }
        let tx = state.outbound.as_ref().ok_or(SubmitError::NotConnected)?;

        let envelope = Envelope::CreateTicket {
            data: TicketDraft {
                title: title.to_string(),
                description: description.to_string(),
            },
        };
        let text = envelope
            .to_json()
            .map_err(|e| SubmitError::Encode(e.to_string()))?;

        tx.try_send(Message::Text(text)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubmitError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SubmitError::NotConnected,
        })
    }

    pub(crate) fn set_status(&self, status: ConnectionStatus) {
        self.state().status = status;
    }

    pub(crate) fn set_device_id(&self, device_id: String) {
        self.state().device_id = Some(device_id);
    }

    /// Install the outbound channel of a freshly established session.
    pub(crate) fn install(&self, outbound: mpsc::Sender<Message>) {
        self.state().outbound = Some(outbound);
    }

    /// Tear down session state; a new session re-learns the device id.
    pub(crate) fn clear(&self) {
        let mut state = self.state();
        state.outbound = None;
        state.device_id = None;
        state.status = ConnectionStatus::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected_without_device_id() {
        let session = SessionHandle::default();
        assert_eq!(session.status(), ConnectionStatus::Disconnected);
        assert!(session.device_id().is_none());
    }

    #[test]
    fn submit_requires_a_connected_session() {
        let session = SessionHandle::default();
        assert!(matches!(
            session.submit_ticket("t", "d"),
            Err(SubmitError::NotConnected)
        ));

        // Installed channel but not yet marked connected: still rejected.
        let (tx, _rx) = mpsc::channel(8);
        session.install(tx);
        assert!(matches!(
            session.submit_ticket("t", "d"),
            Err(SubmitError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn submitted_ticket_lands_on_the_outbound_channel() {
        let session = SessionHandle::default();
        let (tx, mut rx) = mpsc::channel(8);
        session.install(tx);
        session.set_status(ConnectionStatus::Connected);

        session.submit_ticket("Printer on fire", "Third floor").unwrap();

        let message = rx.recv().await.unwrap();
        let envelope = Envelope::from_json(message.to_text().unwrap()).unwrap();
        match envelope {
            Envelope::CreateTicket { data } => {
                assert_eq!(data.title, "Printer on fire");
                assert_eq!(data.description, "Third floor");
            }
            other => panic!("expected create_ticket, got {other:?}"),
        }
    }

    #[test]
    fn full_queue_is_reported() {
        let session = SessionHandle::default();
        let (tx, _rx) = mpsc::channel(1);
        session.install(tx);
        session.set_status(ConnectionStatus::Connected);

        session.submit_ticket("first", "fills the queue").unwrap();
        assert!(matches!(
            session.submit_ticket("second", "no room"),
            Err(SubmitError::QueueFull)
        ));
    }

    #[test]
    fn clear_resets_device_id_and_status() {
        let session = SessionHandle::default();
        let (tx, _rx) = mpsc::channel(8);
        session.install(tx);
        session.set_status(ConnectionStatus::Connected);
        session.set_device_id("dev-1".into());

        session.clear();

        assert_eq!(session.status(), ConnectionStatus::Disconnected);
        assert!(session.device_id().is_none());
        assert!(matches!(
            session.submit_ticket("t", "d"),
            Err(SubmitError::NotConnected)
        ));
    }
}
