//! Wire protocol shared by the FleetLink agent and relay.
//!
//! Every WebSocket text frame carries exactly one JSON [`Envelope`]. The
//! envelope is a closed tagged union: the `type` field selects the variant,
//! and tags this crate does not know decode as [`Envelope::Unknown`] so a
//! dispatcher can skip them instead of tearing the session down.

use serde::{Deserialize, Serialize};

/// A single protocol message, tagged by its `type` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Agent → relay. First frame of a session; carries the device identity.
    Handshake { data: SystemDescriptor },

    /// Relay → agent. Confirms the handshake and assigns the device id.
    HandshakeAck { status: String, device_id: String },

    /// Agent → relay, republished to browsers. Periodic host metrics.
    Heartbeat { data: TelemetryReport },

    /// Browser → relay → agent. Requests execution of a shell command.
    ///
    /// Two payload shapes exist on the wire: a flat `command` field and a
    /// nested `content.command`. [`Envelope::command_line`] resolves either.
    Command {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<CommandRequest>,
    },

    /// Agent → relay, republished to browsers. Result of a command run.
    CommandResponse { data: CommandOutcome },

    /// Browser → relay → agent. Requests a screen capture.
    GetScreenshot,

    /// Agent → relay, republished to browsers. A successful capture.
    Screenshot { data: ScreenshotImage },

    /// Agent → relay, republished to browsers. Capture failure detail.
    ScreenshotResponse { error: String },

    /// Agent → relay. A user-submitted issue report from the device.
    CreateTicket { data: TicketDraft },

    /// Catch-all for tags introduced by newer peers. Never serialized.
    #[serde(other)]
    Unknown,
}

impl Envelope {
    /// Serialize to a single-line JSON string suitable for a text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a text frame. Unrecognized `type` tags yield [`Envelope::Unknown`];
    /// anything that is not a JSON object with a string `type` is an error.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// The wire tag, for log fields.
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Handshake { .. } => "handshake",
            Self::HandshakeAck { .. } => "handshake_ack",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Command { .. } => "command",
            Self::CommandResponse { .. } => "command_response",
            Self::GetScreenshot => "get_screenshot",
            Self::Screenshot { .. } => "screenshot",
            Self::ScreenshotResponse { .. } => "screenshot_response",
            Self::CreateTicket { .. } => "create_ticket",
            Self::Unknown => "unknown",
        }
    }

    /// The command line of a [`Envelope::Command`], from whichever payload
    /// shape the sender used. `None` for other variants or an empty request.
    pub fn command_line(&self) -> Option<&str> {
        match self {
            Self::Command { command, content } => command
                .as_deref()
                .or_else(|| content.as_ref().and_then(|c| c.command.as_deref())),
            _ => None,
        }
    }
}

/// Device identity and host facts sent in the handshake.
///
/// `mac_address` is the device's natural key (uppercase, colon-separated)
/// and is the only field the relay requires to be non-empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SystemDescriptor {
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub os_info: String,
    #[serde(default)]
    pub local_ip: String,
    #[serde(default)]
    pub public_ip: String,
    #[serde(default)]
    pub mac_address: String,
    #[serde(default)]
    pub agent_version: String,
}

/// Host utilization percentages in `[0, 100]`.
///
/// A metric the agent could not read is reported as `0.0`, and a field
/// missing on the wire decodes as `0.0`; the beat itself is never skipped.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct TelemetryReport {
    #[serde(default)]
    pub cpu_usage: f64,
    #[serde(default)]
    pub ram_usage: f64,
    #[serde(default)]
    pub disk_usage: f64,
}

/// Nested command payload shape (`content.command`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CommandRequest {
    #[serde(default)]
    pub command: Option<String>,
}

/// Outcome of a shell command run on the device.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CommandOutcome {
    pub command: String,
    pub output: String,
    pub exit_code: i32,
    pub timestamp: String,
}

/// A captured screen image, base64-encoded PNG.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScreenshotImage {
    pub image: String,
    pub timestamp: String,
}

/// User-submitted issue report relayed from the device.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TicketDraft {
    pub title: String,
    pub description: String,
}

/// Current time as an RFC 3339 string, the timestamp format used on the wire.
pub fn wire_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_roundtrip_keeps_tag_and_metrics() {
        let env = Envelope::Heartbeat {
            data: TelemetryReport {
                cpu_usage: 12.5,
                ram_usage: 40.0,
                disk_usage: 73.2,
            },
        };
        let json = env.to_json().unwrap();
        assert!(json.contains("\"type\":\"heartbeat\""));

        let back = Envelope::from_json(&json).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn heartbeat_missing_metrics_default_to_zero() {
        let env = Envelope::from_json(r#"{"type":"heartbeat","data":{"cpu_usage":55.0}}"#).unwrap();
        match env {
            Envelope::Heartbeat { data } => {
                assert!((data.cpu_usage - 55.0).abs() < f64::EPSILON);
                assert!(data.ram_usage.abs() < f64::EPSILON);
                assert!(data.disk_usage.abs() < f64::EPSILON);
            }
            other => panic!("expected heartbeat, got {other:?}"),
        }
    }

    #[test]
    fn unknown_tag_decodes_as_unknown() {
        let env = Envelope::from_json(r#"{"type":"firmware_update","data":{"x":1}}"#).unwrap();
        assert_eq!(env, Envelope::Unknown);
    }

    #[test]
    fn missing_type_is_an_error() {
        assert!(Envelope::from_json(r#"{"data":{}}"#).is_err());
        assert!(Envelope::from_json("not json at all").is_err());
    }

    #[test]
    fn command_line_resolves_both_shapes() {
        let flat = Envelope::from_json(r#"{"type":"command","command":"uptime"}"#).unwrap();
        assert_eq!(flat.command_line(), Some("uptime"));

        let nested =
            Envelope::from_json(r#"{"type":"command","content":{"command":"whoami"}}"#).unwrap();
        assert_eq!(nested.command_line(), Some("whoami"));

        let flat_wins = Envelope::from_json(
            r#"{"type":"command","command":"uptime","content":{"command":"whoami"}}"#,
        )
        .unwrap();
        assert_eq!(flat_wins.command_line(), Some("uptime"));

        let empty = Envelope::from_json(r#"{"type":"command"}"#).unwrap();
        assert_eq!(empty.command_line(), None);

        let not_a_command = Envelope::GetScreenshot;
        assert_eq!(not_a_command.command_line(), None);
    }

    #[test]
    fn get_screenshot_serializes_as_bare_tag() {
        let json = Envelope::GetScreenshot.to_json().unwrap();
        assert_eq!(json, r#"{"type":"get_screenshot"}"#);
    }

    #[test]
    fn handshake_tolerates_partial_descriptor() {
        let env =
            Envelope::from_json(r#"{"type":"handshake","data":{"hostname":"fl-test"}}"#).unwrap();
        match env {
            Envelope::Handshake { data } => {
                assert_eq!(data.hostname, "fl-test");
                assert!(data.mac_address.is_empty());
            }
            other => panic!("expected handshake, got {other:?}"),
        }
    }

    #[test]
    fn handshake_ack_roundtrip() {
        let json = r#"{"type":"handshake_ack","status":"success","device_id":"abc-123"}"#;
        let env = Envelope::from_json(json).unwrap();
        assert_eq!(
            env,
            Envelope::HandshakeAck {
                status: "success".into(),
                device_id: "abc-123".into(),
            }
        );
    }

    #[test]
    fn wire_timestamp_is_rfc3339() {
        let ts = wire_timestamp();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
