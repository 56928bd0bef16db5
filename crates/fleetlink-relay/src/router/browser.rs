//! Browser-facing WebSocket session handling.
//!
//! A browser subscribes to one device's group for the life of the
//! connection. Frames it receives are whatever the agent published;
//! frames it sends are control requests forwarded to the device's agent.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use fleetlink_proto::Envelope;

use crate::server::AppState;

/// Drive one browser subscription from upgrade to disconnect.
pub async fn handle_browser_socket(socket: WebSocket, state: AppState, device_id: String) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(128);

    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if ws_sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let member_id = state.groups.join_browser(&device_id, out_tx).await;
    info!(device_id = %device_id, member_id = %member_id, "Browser subscribed");

    while let Some(frame) = ws_stream.next().await {
        match frame {
            Ok(Message::Text(text)) => forward_to_agent(&state, &device_id, &text).await,
            Ok(Message::Close(_)) => {
                debug!(device_id = %device_id, "Browser sent close frame");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(device_id = %device_id, error = %e, "Browser socket error");
                break;
            }
        }
    }

    state.groups.leave_browser(&device_id, member_id).await;
    info!(device_id = %device_id, member_id = %member_id, "Browser unsubscribed");
    writer.abort();
}

/// Forward a control frame to the device's agent.
///
/// Only command and screenshot requests are honored; commands are
/// re-encoded in the flat shape before forwarding. Delivery is best effort,
/// frames for an agentless device are dropped.
pub(crate) async fn forward_to_agent(state: &AppState, device_id: &str, text: &str) {
    let envelope = match Envelope::from_json(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(device_id = %device_id, error = %e, "Undecodable frame from browser; skipping");
            return;
        }
    };

    let forwarded = match &envelope {
        Envelope::Command { .. } => {
            let Some(line) = envelope.command_line() else {
                warn!(device_id = %device_id, "Browser command without a command line; dropping");
                return;
            };
            debug!(device_id = %device_id, command = %line, "Forwarding command to agent");
            Envelope::Command {
                command: Some(line.to_string()),
                content: None,
            }
        }
        Envelope::GetScreenshot => {
            debug!(device_id = %device_id, "Forwarding screenshot request to agent");
            Envelope::GetScreenshot
        }
        other => {
            debug!(device_id = %device_id, msg_type = other.tag(), "Ignoring browser frame");
            return;
        }
    };

    match forwarded.to_json() {
        Ok(text) => {
            if !state
                .groups
                .send_to_agent(device_id, Message::Text(text))
                .await
            {
                debug!(device_id = %device_id, "No agent available; request dropped");
            }
        }
        Err(e) => warn!(device_id = %device_id, error = %e, "Failed to encode forwarded frame"),
    }
}
