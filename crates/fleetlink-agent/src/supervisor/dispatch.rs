//! Inbound dispatcher: decodes relay frames and performs the requested work.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures_util::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{error, info, warn};

use fleetlink_proto::{Envelope, ScreenshotImage, wire_timestamp};

use super::error::AgentError;
use super::sink::{EnvelopeSink, SinkError};
use crate::capture::CaptureProvider;
use crate::exec::CommandExecutor;
use crate::session::SessionHandle;

enum ReplyStatus {
    Sent,
    TransportClosed,
}

/// Consume the inbound frame stream until the session ends.
///
/// A frame that fails to decode is logged and skipped; it must never kill
/// the session. Commands execute serially so response ordering matches
/// request ordering.
pub(crate) async fn dispatch_loop<R, S, C>(
    mut inbound: R,
    mut sink: S,
    executor: CommandExecutor,
    capture: Arc<C>,
    session: SessionHandle,
) -> Result<(), AgentError>
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
    S: EnvelopeSink,
    C: CaptureProvider + ?Sized,
{
    while let Some(frame) = inbound.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                info!("Relay closed the connection");
                return Ok(());
            }
            // Pings are answered by the transport; binary frames are not
            // part of the protocol.
            Ok(_) => continue,
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                info!("Connection closed");
                return Ok(());
            }
            Err(e) => {
                error!(error = %e, "WebSocket receive failed");
                return Err(AgentError::Session(e.to_string()));
            }
        };

        let envelope = match Envelope::from_json(&text) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(error = %e, "Received invalid JSON frame; skipping");
                continue;
            }
        };

        match envelope {
            Envelope::HandshakeAck { status, device_id } => {
                info!(status = %status, device_id = %device_id, "Handshake acknowledged");
                session.set_device_id(device_id);
            }
            Envelope::Command { command, content } => {
                let Some(line) = command.or_else(|| content.and_then(|c| c.command)) else {
                    warn!("Command frame without a command line; skipping");
                    continue;
                };
                info!(command = %line, "Executing remote command");
                let outcome = executor.run(&line).await;
                info!(
                    command = %line,
                    exit_code = outcome.exit_code,
                    "Remote command finished"
                );
                let reply = Envelope::CommandResponse { data: outcome };
                if matches!(
                    send_reply(&mut sink, reply).await?,
                    ReplyStatus::TransportClosed
                ) {
                    return Ok(());
                }
            }
            Envelope::GetScreenshot => {
                let reply = match capture.capture() {
                    Ok(bytes) => {
                        info!(bytes = bytes.len(), "Screen captured");
                        Envelope::Screenshot {
                            data: ScreenshotImage {
                                image: STANDARD.encode(&bytes),
                                timestamp: wire_timestamp(),
                            },
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Screen capture failed");
                        Envelope::ScreenshotResponse {
                            error: e.to_string(),
                        }
                    }
                };
                if matches!(
                    send_reply(&mut sink, reply).await?,
                    ReplyStatus::TransportClosed
                ) {
                    return Ok(());
                }
            }
            other => {
                warn!(msg_type = other.tag(), "Ignoring unexpected message from relay");
            }
        }
    }

    info!("Inbound stream ended");
    Ok(())
}

async fn send_reply<S: EnvelopeSink>(
    sink: &mut S,
    envelope: Envelope,
) -> Result<ReplyStatus, AgentError> {
    match sink.send(envelope).await {
        Ok(()) => Ok(ReplyStatus::Sent),
        Err(SinkError::Closed) => {
            info!("Transport closed while sending a reply");
            Ok(ReplyStatus::TransportClosed)
        }
        Err(e) => {
            error!(error = %e, "Failed to send reply");
            Err(AgentError::Session(e.to_string()))
        }
    }
}
