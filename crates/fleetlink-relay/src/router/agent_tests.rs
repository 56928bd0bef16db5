//! Tests for agent-facing session handling.

use axum::extract::ws::Message;
use tokio::sync::mpsc;

use fleetlink_proto::Envelope;

use super::agent::AgentSession;
use crate::registry::DeviceGroups;
use crate::server::AppState;
use crate::storage::RelayDatabase;

const HANDSHAKE: &str = r#"{"type":"handshake","data":{"hostname":"fl-01","os_info":"Linux 6.8","local_ip":"192.168.1.20","public_ip":"203.0.113.9","mac_address":"AA:BB:CC:DD:EE:FF","agent_version":"0.1.0"}}"#;
const HEARTBEAT: &str = r#"{"type":"heartbeat","data":{"cpu_usage":55.5,"ram_usage":41.0,"disk_usage":72.5}}"#;

async fn setup() -> (AgentSession, mpsc::Receiver<Message>, AppState) {
    let state = AppState {
        db: RelayDatabase::open_in_memory().await.unwrap(),
        groups: DeviceGroups::new(),
    };
    let (out_tx, out_rx) = mpsc::channel(16);
    let session = AgentSession::new(state.clone(), out_tx);
    (session, out_rx, state)
}

fn decode(message: &Message) -> Envelope {
    match message {
        Message::Text(text) => Envelope::from_json(text).unwrap(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

/// Feed the standard handshake and return the acked device id.
async fn complete_handshake(
    session: &mut AgentSession,
    out_rx: &mut mpsc::Receiver<Message>,
) -> String {
    assert!(session.handle_text(HANDSHAKE).await.is_continue());
    match decode(&out_rx.recv().await.unwrap()) {
        Envelope::HandshakeAck { status, device_id } => {
            assert_eq!(status, "success");
            device_id
        }
        other => panic!("expected handshake ack, got {other:?}"),
    }
}

#[tokio::test]
async fn handshake_upserts_device_and_acks() {
    let (mut session, mut out_rx, state) = setup().await;

    let device_id = complete_handshake(&mut session, &mut out_rx).await;

    assert_eq!(session.device_id(), Some(device_id.as_str()));
    let device = state.db.get_device_by_mac("AA:BB:CC:DD:EE:FF").await.unwrap();
    assert_eq!(device.id, device_id);
    assert_eq!(device.hostname, "fl-01");
    assert!(device.is_online());
    assert_eq!(state.groups.connected_agents().await, 1);
}

#[tokio::test]
async fn handshake_without_mac_closes_connection() {
    let (mut session, mut out_rx, state) = setup().await;
    let frame = r#"{"type":"handshake","data":{"hostname":"fl-01","mac_address":"  "}}"#;

    assert!(session.handle_text(frame).await.is_break());

    let reply = out_rx.recv().await.unwrap();
    assert!(matches!(reply, Message::Close(_)));
    assert_eq!(state.db.device_count().await.unwrap(), 0);
}

#[tokio::test]
async fn pre_handshake_heartbeat_is_dropped() {
    let (mut session, mut out_rx, state) = setup().await;

    assert!(session.handle_text(HEARTBEAT).await.is_continue());
    assert_eq!(state.db.device_count().await.unwrap(), 0);

    // The session survives and can still authenticate.
    let device_id = complete_handshake(&mut session, &mut out_rx).await;
    assert!(!device_id.is_empty());
}

#[tokio::test]
async fn heartbeat_persists_and_republishes_verbatim() {
    let (mut session, mut out_rx, state) = setup().await;
    let device_id = complete_handshake(&mut session, &mut out_rx).await;

    let (browser_tx, mut browser_rx) = mpsc::channel(16);
    state.groups.join_browser(&device_id, browser_tx).await;

    assert!(session.handle_text(HEARTBEAT).await.is_continue());

    assert_eq!(
        browser_rx.try_recv().unwrap(),
        Message::Text(HEARTBEAT.to_string())
    );
    let rows = state.db.recent_telemetry(&device_id, 10).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!((rows[0].cpu_usage - 55.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn command_response_republished_verbatim() {
    let (mut session, mut out_rx, state) = setup().await;
    let device_id = complete_handshake(&mut session, &mut out_rx).await;

    let (browser_tx, mut browser_rx) = mpsc::channel(16);
    state.groups.join_browser(&device_id, browser_tx).await;

    let frame = r#"{"type":"command_response","data":{"command":"uptime","output":"up 3 days","exit_code":0,"timestamp":"2026-08-26T10:00:00Z"}}"#;
    assert!(session.handle_text(frame).await.is_continue());

    assert_eq!(browser_rx.try_recv().unwrap(), Message::Text(frame.to_string()));
}

#[tokio::test]
async fn screenshot_error_republished_verbatim() {
    let (mut session, mut out_rx, state) = setup().await;
    let device_id = complete_handshake(&mut session, &mut out_rx).await;

    let (browser_tx, mut browser_rx) = mpsc::channel(16);
    state.groups.join_browser(&device_id, browser_tx).await;

    let frame = r#"{"type":"screenshot_response","error":"screen capture is not available on this host"}"#;
    assert!(session.handle_text(frame).await.is_continue());

    assert_eq!(browser_rx.try_recv().unwrap(), Message::Text(frame.to_string()));
}

#[tokio::test]
async fn ticket_reports_are_logged_not_republished() {
    let (mut session, mut out_rx, state) = setup().await;
    let device_id = complete_handshake(&mut session, &mut out_rx).await;

    let (browser_tx, mut browser_rx) = mpsc::channel(16);
    state.groups.join_browser(&device_id, browser_tx).await;

    let frame = r#"{"type":"create_ticket","data":{"title":"Printer on fire","description":"Third floor"}}"#;
    assert!(session.handle_text(frame).await.is_continue());

    assert!(browser_rx.try_recv().is_err());
}

#[tokio::test]
async fn undecodable_and_unknown_frames_are_skipped() {
    let (mut session, mut out_rx, _state) = setup().await;

    assert!(session.handle_text("not json at all").await.is_continue());
    assert!(session.handle_text(r#"{"type":"mystery"}"#).await.is_continue());

    // The session is still usable afterwards.
    let device_id = complete_handshake(&mut session, &mut out_rx).await;
    assert!(!device_id.is_empty());
}

#[tokio::test]
async fn repeat_handshake_refreshes_without_rejoining() {
    let (mut session, mut out_rx, state) = setup().await;
    let device_id = complete_handshake(&mut session, &mut out_rx).await;

    let refreshed = complete_handshake(&mut session, &mut out_rx).await;

    assert_eq!(refreshed, device_id);
    assert_eq!(state.groups.connected_agents().await, 1);
    // The session did not supersede itself; its queue holds no close frame.
    assert!(out_rx.try_recv().is_err());
}

#[tokio::test]
async fn finish_marks_device_offline() {
    let (mut session, mut out_rx, state) = setup().await;
    let device_id = complete_handshake(&mut session, &mut out_rx).await;

    session.finish().await;

    let device = state.db.get_device(&device_id).await.unwrap();
    assert!(!device.is_online());
    assert_eq!(state.groups.connected_agents().await, 0);
}

#[tokio::test]
async fn superseded_session_cannot_mark_replacement_offline() {
    let (mut first, mut first_rx, state) = setup().await;
    let device_id = complete_handshake(&mut first, &mut first_rx).await;

    let (out_tx, mut second_rx) = mpsc::channel(16);
    let mut second = AgentSession::new(state.clone(), out_tx);
    let second_id = complete_handshake(&mut second, &mut second_rx).await;
    assert_eq!(second_id, device_id);

    // The first session was asked to close when the second took the slot.
    assert!(matches!(first_rx.recv().await.unwrap(), Message::Close(_)));

    first.finish().await;
    let device = state.db.get_device(&device_id).await.unwrap();
    assert!(device.is_online());
    assert_eq!(state.groups.connected_agents().await, 1);

    second.finish().await;
    let device = state.db.get_device(&device_id).await.unwrap();
    assert!(!device.is_online());
    assert_eq!(state.groups.connected_agents().await, 0);
}
