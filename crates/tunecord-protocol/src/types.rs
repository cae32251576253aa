//! Handshake, command and dispatch payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::PROTOCOL_VERSION;

/// Opcode-0 payload sent right after the socket opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub v: u32,
    pub client_id: String,
}

impl Handshake {
    /// Creates a handshake for the current protocol version.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            client_id: client_id.into(),
        }
    }
}

/// Command names carried in the `cmd` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Peer-initiated event notification.
    Dispatch,
    /// Set or clear the rich presence activity.
    SetActivity,
    /// Any command this client does not interpret.
    #[serde(other)]
    Unknown,
}

/// Outbound opcode-1 payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope<A> {
    pub cmd: Command,
    pub args: A,
    pub nonce: String,
}

impl<A> CommandEnvelope<A> {
    /// Wraps `args` with a fresh random nonce.
    pub fn new(cmd: Command, args: A) -> Self {
        Self {
            cmd,
            args,
            nonce: Uuid::new_v4().to_string(),
        }
    }
}

/// Event names carried in the `evt` field of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    Ready,
    Error,
    #[serde(other)]
    Other,
}

/// Inbound opcode-1 payload: a dispatch event or a command response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundMessage {
    pub cmd: Command,
    #[serde(default)]
    pub evt: Option<Event>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub nonce: Option<String>,
}

impl InboundMessage {
    /// Returns true for the `DISPATCH`/`READY` event.
    pub fn is_ready(&self) -> bool {
        self.cmd == Command::Dispatch && self.evt == Some(Event::Ready)
    }

    /// Returns true for an `ERROR` event, whether dispatched or a response.
    pub fn is_error(&self) -> bool {
        self.evt == Some(Event::Error)
    }

    /// Parses the `READY` payload. Missing or odd fields yield defaults.
    pub fn ready_info(&self) -> ReadyInfo {
        self.data
            .as_ref()
            .and_then(|data| serde_json::from_value(data.clone()).ok())
            .unwrap_or_default()
    }

    /// Parses the `ERROR` payload, if present and well formed.
    pub fn error_data(&self) -> Option<ErrorData> {
        self.data
            .as_ref()
            .and_then(|data| serde_json::from_value(data.clone()).ok())
    }
}

/// Data carried by the `READY` dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReadyInfo {
    #[serde(default)]
    pub v: Option<u32>,
    #[serde(default)]
    pub user: Option<PeerUser>,
}

/// The chat user the peer is logged in as.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PeerUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
}

impl PeerUser {
    /// Returns the name shown to other users.
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }
}

/// Data carried by an `ERROR` event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorData {
    pub code: i64,
    pub message: String,
}

/// Opcode-5 payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CloseReason {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn handshake_wire_shape() {
        insta::assert_json_snapshot!(Handshake::new("1234567890"), @r#"
        {
          "v": 1,
          "client_id": "1234567890"
        }
        "#);
    }

    #[test]
    fn ready_dispatch_is_recognized() {
        let msg: InboundMessage = serde_json::from_value(json!({
            "cmd": "DISPATCH",
            "evt": "READY",
            "data": {
                "v": 1,
                "user": {"id": "80351110224678912", "username": "nelly", "global_name": "Nelly"},
                "config": {"api_endpoint": "//discord.com/api"}
            },
            "nonce": null
        }))
        .unwrap();

        assert!(msg.is_ready());
        let info = msg.ready_info();
        assert_eq!(info.v, Some(1));
        assert_eq!(info.user.unwrap().display_name(), "Nelly");
    }

    #[test]
    fn unknown_commands_and_events_parse() {
        let msg: InboundMessage = serde_json::from_value(json!({
            "cmd": "SUBSCRIBE",
            "evt": "ACTIVITY_JOIN",
            "data": {}
        }))
        .unwrap();

        assert_eq!(msg.cmd, Command::Unknown);
        assert_eq!(msg.evt, Some(Event::Other));
        assert!(!msg.is_ready());
    }

    #[test]
    fn command_response_is_not_ready() {
        let msg: InboundMessage = serde_json::from_value(json!({
            "cmd": "SET_ACTIVITY",
            "evt": null,
            "data": {"name": "tunecord"},
            "nonce": "abc"
        }))
        .unwrap();

        assert_eq!(msg.cmd, Command::SetActivity);
        assert!(msg.evt.is_none());
        assert!(!msg.is_ready());
        assert_eq!(msg.nonce.as_deref(), Some("abc"));
    }

    #[test]
    fn error_event_exposes_code() {
        let msg: InboundMessage = serde_json::from_value(json!({
            "cmd": "SET_ACTIVITY",
            "evt": "ERROR",
            "data": {"code": 4000, "message": "child \"activity\" fails"}
        }))
        .unwrap();

        assert!(msg.is_error());
        assert_eq!(msg.error_data().unwrap().code, 4000);
    }

    #[test]
    fn close_reason_tolerates_missing_fields() {
        let reason: CloseReason = serde_json::from_value(json!({"code": 4000})).unwrap();
        assert_eq!(reason.code, Some(4000));
        assert!(reason.message.is_none());
    }
}
