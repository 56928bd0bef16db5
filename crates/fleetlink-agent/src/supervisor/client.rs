//! Connection supervisor that keeps the agent attached to a relay.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{error, info, warn};

use fleetlink_proto::{Envelope, SystemDescriptor};

use super::config::AgentConfig;
use super::dispatch::dispatch_loop;
use super::error::AgentError;
use super::heartbeat::heartbeat_loop;
use super::sink::ChannelSink;
use crate::capture::CaptureProvider;
use crate::exec::CommandExecutor;
use crate::identity;
use crate::metrics::MetricSource;
use crate::session::{ConnectionStatus, SessionHandle};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A connection that stayed up this long resets the retry counter.
const STABLE_CONNECTION: Duration = Duration::from_secs(60);

/// Supervises the relay session: connect, handshake, run the heartbeat
/// producer and inbound dispatcher, and reconnect on any session end.
pub struct Supervisor<M, C> {
    config: AgentConfig,
    descriptor: SystemDescriptor,
    metrics: Arc<Mutex<M>>,
    capture: Arc<C>,
    session: SessionHandle,
}

impl<M, C> Supervisor<M, C>
where
    M: MetricSource + Send + 'static,
    C: CaptureProvider + Send + Sync + 'static,
{
    pub fn new(config: AgentConfig, metrics: M, capture: C, session: SessionHandle) -> Self {
        let descriptor = identity::collect_descriptor();
        info!(
            mac = %descriptor.mac_address,
            hostname = %descriptor.hostname,
            "Collected device identity"
        );
        Self {
            config,
            descriptor,
            metrics: Arc::new(Mutex::new(metrics)),
            capture: Arc::new(capture),
            session,
        }
    }

    /// Run the supervisor with automatic reconnection.
    ///
    /// This is the main entry point. Each session attempt connects,
    /// handshakes, and runs until either activity finishes; the retry
    /// schedule then takes over. Only the shutdown signal ends the loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow() {
                info!("Agent supervisor shutting down");
                return;
            }

            let started = std::time::Instant::now();
            match self.connect_and_run(&mut shutdown).await {
                Ok(()) => {
                    info!("Session closed cleanly");
                    return;
                }
                Err(e) => {
                    // Reset the retry counter if the connection was up for a while
                    if started.elapsed() > STABLE_CONNECTION {
                        attempt = 0;
                    }

                    if !self.config.reconnect.should_retry(attempt) {
                        error!(error = %e, attempt, "Max reconnect attempts reached");
                        return;
                    }

                    let delay = self.config.reconnect.delay_for_attempt(attempt);
                    warn!(error = %e, attempt, delay_ms = delay.as_millis(), "Reconnecting");

                    tokio::select! {
                        () = sleep(delay) => {}
                        _ = shutdown.changed() => {
                            info!("Agent supervisor shutting down during reconnect wait");
                            return;
                        }
                    }

                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    /// Connect to the relay, handshake, and run one session to completion.
    ///
    /// Returns `Ok(())` only for a shutdown-initiated close; every other
    /// session end is an error so the caller's retry schedule applies.
    async fn connect_and_run(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), AgentError> {
        self.session.set_status(ConnectionStatus::Connecting);
        info!(url = %self.config.server_url, "Connecting to relay");

        let (ws, _response) = connect_async(self.config.server_url.as_str())
            .await
            .map_err(|e| AgentError::Connection(format!("{e}: {}", error_chain(&e))))?;

        let (ws_sink, ws_stream) = ws.split();
        let (out_tx, out_rx) = mpsc::channel::<Message>(128);
        let writer = spawn_writer(ws_sink, out_rx);

        // The handshake is the first frame of every session.
        self.session.set_status(ConnectionStatus::Handshaking);
        let handshake = Envelope::Handshake {
            data: self.descriptor.clone(),
        };
        let text = handshake
            .to_json()
            .map_err(|e| AgentError::Handshake(e.to_string()))?;
        if out_tx.send(Message::Text(text)).await.is_err() {
            writer.abort();
            return Err(AgentError::Handshake(
                "Failed to queue handshake frame".into(),
            ));
        }
        info!(mac = %self.descriptor.mac_address, "Handshake sent");

        self.session.install(out_tx.clone());
        self.session.set_status(ConnectionStatus::Connected);

        let mut heartbeat = tokio::spawn(heartbeat_loop(
            self.config.heartbeat_interval,
            Arc::clone(&self.metrics),
            ChannelSink::new(out_tx.clone()),
        ));
        let mut dispatch = tokio::spawn(dispatch_loop(
            ws_stream,
            ChannelSink::new(out_tx.clone()),
            CommandExecutor::new(self.config.command_timeout),
            Arc::clone(&self.capture),
            self.session.clone(),
        ));

        // First to finish wins; the loser is cancelled explicitly.
        let session_result = tokio::select! {
            joined = &mut heartbeat => {
                dispatch.abort();
                Err(session_end("Heartbeat loop", joined))
            }
            joined = &mut dispatch => {
                heartbeat.abort();
                Err(session_end("Inbound dispatcher", joined))
            }
            _ = shutdown.changed() => {
                info!("Shutdown requested; closing session");
                heartbeat.abort();
                dispatch.abort();
                let _ = out_tx.try_send(Message::Close(None));
                Ok(())
            }
        };

        drop(out_tx);
        writer.abort();
        self.session.clear();

        session_result
    }
}

/// Map a finished activity back to the session-ending error.
fn session_end(
    task: &str,
    joined: Result<Result<(), AgentError>, tokio::task::JoinError>,
) -> AgentError {
    match joined {
        Ok(Ok(())) => AgentError::Session(format!("{task} ended: transport closed")),
        Ok(Err(e)) => e,
        Err(e) => AgentError::Session(format!("{task} task failed: {e}")),
    }
}

/// Writer task: owns the WebSocket sink and drains the outbound channel.
fn spawn_writer(
    mut ws_sink: SplitSink<WsStream, Message>,
    mut rx: mpsc::Receiver<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let is_close = matches!(message, Message::Close(_));
            if let Err(e) = ws_sink.send(message).await {
                warn!(error = %e, "WebSocket send failed; writer ending");
                return;
            }
            if is_close {
                return;
            }
        }
    })
}

/// Walk the `source()` chain of an error and join into a single string.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut chain = Vec::new();
    let mut current = err.source();
    while let Some(e) = current {
        chain.push(e.to_string());
        current = e.source();
    }
    if chain.is_empty() {
        String::from("(no further details)")
    } else {
        chain.join(" -> ")
    }
}
