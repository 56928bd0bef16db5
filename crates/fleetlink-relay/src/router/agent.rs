//! Agent-facing WebSocket session handling.
//!
//! An agent must introduce itself with a handshake before any other frame is
//! honored. After that, heartbeats are persisted and republished to the
//! device's browser group, and command or screenshot results are republished
//! verbatim.

use std::ops::ControlFlow;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use fleetlink_proto::{Envelope, SystemDescriptor, TelemetryReport};

use crate::server::AppState;

/// Drive one agent connection from upgrade to disconnect.
pub async fn handle_agent_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(128);

    // Writer task owns the sink half for the life of the connection.
    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let is_close = matches!(message, Message::Close(_));
            if ws_sink.send(message).await.is_err() {
                break;
            }
            if is_close {
                break;
            }
        }
    });

    let mut session = AgentSession::new(state, out_tx);

    while let Some(frame) = ws_stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if session.handle_text(&text).await.is_break() {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                debug!("Agent sent close frame");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "Agent socket error");
                break;
            }
        }
    }

    session.finish().await;
    writer.abort();
}

/// Group membership earned by a successful handshake.
struct AgentAuth {
    device_id: String,
    member_id: Uuid,
}

/// Server-side state for one agent connection.
pub(crate) struct AgentSession {
    state: AppState,
    out: mpsc::Sender<Message>,
    auth: Option<AgentAuth>,
}

impl AgentSession {
    pub(crate) fn new(state: AppState, out: mpsc::Sender<Message>) -> Self {
        Self {
            state,
            out,
            auth: None,
        }
    }

    pub(crate) fn device_id(&self) -> Option<&str> {
        self.auth.as_ref().map(|auth| auth.device_id.as_str())
    }

    /// Handle one inbound text frame. `Break` ends the connection.
    pub(crate) async fn handle_text(&mut self, text: &str) -> ControlFlow<()> {
        let envelope = match Envelope::from_json(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Undecodable frame from agent; skipping");
                return ControlFlow::Continue(());
            }
        };

        match envelope {
            Envelope::Handshake { data } => self.handle_handshake(data).await,
            Envelope::Heartbeat { data } => {
                self.handle_heartbeat(&data, text).await;
                ControlFlow::Continue(())
            }
            Envelope::CommandResponse { .. }
            | Envelope::Screenshot { .. }
            | Envelope::ScreenshotResponse { .. } => {
                self.republish(envelope.tag(), text).await;
                ControlFlow::Continue(())
            }
            Envelope::CreateTicket { data } => {
                // Ticket persistence lives outside the relay; record the
                // hand-off and move on.
                match self.device_id() {
                    Some(device_id) => {
                        info!(device_id = %device_id, title = %data.title, "Device submitted a ticket report");
                    }
                    None => warn!("Ticket report before handshake; dropping"),
                }
                ControlFlow::Continue(())
            }
            other => {
                warn!(msg_type = other.tag(), "Ignoring unexpected agent frame");
                ControlFlow::Continue(())
            }
        }
    }

    async fn handle_handshake(&mut self, descriptor: SystemDescriptor) -> ControlFlow<()> {
        if descriptor.mac_address.trim().is_empty() {
            warn!(hostname = %descriptor.hostname, "Handshake without a MAC address; closing connection");
            let _ = self.out.try_send(Message::Close(None));
            return ControlFlow::Break(());
        }

        let device = match self.state.db.upsert_device(&descriptor).await {
            Ok(device) => device,
            Err(e) => {
                error!(error = %e, mac = %descriptor.mac_address, "Device upsert failed; closing connection");
                let _ = self.out.try_send(Message::Close(None));
                return ControlFlow::Break(());
            }
        };

        if let Some(auth) = &self.auth {
            // Repeat handshake on an authenticated session refreshes the
            // record but must not change which device the session speaks for.
            if device.id == auth.device_id {
                self.send_ack(&device.id);
                debug!(device_id = %device.id, "Handshake refreshed");
            } else {
                warn!(
                    device_id = %auth.device_id,
                    other = %device.id,
                    "Handshake for a different device on an authenticated session; ignoring"
                );
            }
            return ControlFlow::Continue(());
        }

        let member_id = self
            .state
            .groups
            .join_agent(&device.id, self.out.clone())
            .await;

        self.send_ack(&device.id);
        info!(
            device_id = %device.id,
            mac = %device.mac_address,
            hostname = %device.hostname,
            "Agent handshake complete"
        );
        self.auth = Some(AgentAuth {
            device_id: device.id,
            member_id,
        });
        ControlFlow::Continue(())
    }

    fn send_ack(&self, device_id: &str) {
        let ack = Envelope::HandshakeAck {
            status: "success".to_string(),
            device_id: device_id.to_string(),
        };
        match ack.to_json() {
            Ok(text) => {
                let _ = self.out.try_send(Message::Text(text));
            }
            Err(e) => error!(error = %e, "Failed to encode handshake ack"),
        }
    }

    /// Persist the sample, stamp the device, and republish the frame
    /// verbatim to the device's browser group. Storage failures are logged
    /// without ending the session.
    async fn handle_heartbeat(&self, report: &TelemetryReport, raw: &str) {
        let Some(auth) = &self.auth else {
            warn!("Heartbeat before handshake; dropping");
            return;
        };

        if let Err(e) = self.state.db.append_telemetry(&auth.device_id, report).await {
            error!(error = %e, device_id = %auth.device_id, "Failed to persist telemetry");
        }
        if let Err(e) = self.state.db.touch_last_seen(&auth.device_id).await {
            error!(error = %e, device_id = %auth.device_id, "Failed to stamp last-seen");
        }

        let delivered = self
            .state
            .groups
            .broadcast_to_browsers(&auth.device_id, Message::Text(raw.to_string()))
            .await;
        debug!(device_id = %auth.device_id, delivered, "Heartbeat republished");
    }

    /// Republish an agent frame verbatim to the device's browser group.
    async fn republish(&self, tag: &str, raw: &str) {
        let Some(auth) = &self.auth else {
            warn!(msg_type = tag, "Frame before handshake; dropping");
            return;
        };

        let delivered = self
            .state
            .groups
            .broadcast_to_browsers(&auth.device_id, Message::Text(raw.to_string()))
            .await;
        debug!(device_id = %auth.device_id, msg_type = tag, delivered, "Frame republished");
    }

    /// Tear down group membership on disconnect.
    ///
    /// Only the member that still holds the agent slot may mark the device
    /// offline; a superseded session's teardown leaves its replacement's
    /// state alone.
    pub(crate) async fn finish(&mut self) {
        let Some(auth) = self.auth.take() else {
            debug!("Agent disconnected before handshake");
            return;
        };

        let was_current = self
            .state
            .groups
            .leave_agent(&auth.device_id, auth.member_id)
            .await;
        if was_current {
            if let Err(e) = self.state.db.set_online(&auth.device_id, false).await {
                error!(error = %e, device_id = %auth.device_id, "Failed to mark device offline");
            }
            info!(device_id = %auth.device_id, "Agent disconnected; device now offline");
        } else {
            info!(device_id = %auth.device_id, "Superseded agent session closed");
        }
    }
}
