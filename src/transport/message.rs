//! Message envelope and socket wire frames.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Target marker addressing every listening agent.
pub const BROADCAST_TARGET: &str = "broadcast";

/// Protocol marker stamped on envelopes built by this crate.
pub const PROTOCOL_MARKER: &str = "a2a-v1";

/// Well-known message type names. The wire type is an open string; these
/// are the names agents conventionally register handlers for.
pub mod message_type {
    pub const QUERY: &str = "query";
    pub const RESPONSE: &str = "response";
    pub const INITIATION: &str = "initiation";
    pub const TASK_REQUEST: &str = "task_request";
    pub const TASK_RESULT: &str = "task_result";
    pub const NOTIFICATION: &str = "notification";
    pub const ERROR: &str = "error";
    pub const HEARTBEAT: &str = "heartbeat";
}

/// The immutable envelope exchanged over every transport.
///
/// Built once by a send operation and never mutated afterwards; responses
/// are new envelopes correlated through `metadata.conversation_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Unique message id (ULID), generated at send time.
    pub id: String,
    /// ISO-8601 creation timestamp.
    pub timestamp: String,
    /// Sending agent id.
    pub source: String,
    /// Recipient agent id, or [`BROADCAST_TARGET`].
    pub target: String,
    /// Opaque, protocol-shaped payload.
    pub content: Value,
    pub metadata: MessageMetadata,
}

/// Envelope metadata, serialized camelCase to match the wire format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(rename = "type")]
    pub message_type: String,
    /// Threads a causally related exchange. Auto-generated when absent.
    pub conversation_id: String,
    pub protocol: String,
}

impl Message {
    /// Build a new envelope. A fresh `conversationId` is generated when the
    /// caller does not supply one.
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        content: Value,
        message_type: impl Into<String>,
        conversation_id: Option<String>,
    ) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            timestamp: now_iso(),
            source: source.into(),
            target: target.into(),
            content,
            metadata: MessageMetadata {
                message_type: message_type.into(),
                conversation_id: conversation_id
                    .unwrap_or_else(|| format!("conv_{}", uuid::Uuid::new_v4())),
                protocol: PROTOCOL_MARKER.to_string(),
            },
        }
    }

    /// Whether this envelope is addressed to `agent_id`, directly or via
    /// the broadcast marker.
    pub fn is_for(&self, agent_id: &str) -> bool {
        self.target == agent_id || self.target == BROADCAST_TARGET
    }
}

/// Current time as an ISO-8601 string with millisecond precision.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// System frame subtypes the server may push.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SystemSubtype {
    Welcome,
    Error,
    Notification,
}

/// Socket-only control frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    Ping {
        source: String,
        timestamp: String,
    },
    Pong {
        source: String,
        timestamp: String,
    },
    System {
        subtype: SystemSubtype,
        #[serde(default)]
        content: Value,
    },
    /// Client handshake announcing the local agent id on open.
    Register {
        source: String,
        timestamp: String,
    },
}

/// Closed decode of everything that can arrive on the socket: a control
/// frame or a message envelope, nothing shapeless.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InboundFrame {
    Control(ControlFrame),
    Message(Message),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_creation() {
        let msg = Message::new("agent-a", "agent-b", json!({"text": "hi"}), "text", None);

        assert!(!msg.id.is_empty());
        assert_eq!(msg.source, "agent-a");
        assert_eq!(msg.target, "agent-b");
        assert_eq!(msg.metadata.message_type, "text");
        assert!(msg.metadata.conversation_id.starts_with("conv_"));
        assert_eq!(msg.metadata.protocol, PROTOCOL_MARKER);
    }

    #[test]
    fn test_supplied_conversation_id_is_kept() {
        let msg = Message::new(
            "a",
            "b",
            json!({}),
            "query",
            Some("conv_existing".to_string()),
        );
        assert_eq!(msg.metadata.conversation_id, "conv_existing");
    }

    #[test]
    fn test_wire_field_names() {
        let msg = Message::new("a", "b", json!({"k": 1}), "query", None);
        let wire = serde_json::to_value(&msg).unwrap();

        assert!(wire["metadata"]["type"].is_string());
        assert!(wire["metadata"]["conversationId"].is_string());
        assert!(wire["metadata"]["protocol"].is_string());
        // Round-trip through the wire form.
        let back: Message = serde_json::from_value(wire).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_broadcast_addressing() {
        let msg = Message::new("a", BROADCAST_TARGET, json!({}), "notice", None);
        assert!(msg.is_for("anyone"));

        let direct = Message::new("a", "b", json!({}), "notice", None);
        assert!(direct.is_for("b"));
        assert!(!direct.is_for("c"));
    }

    #[test]
    fn test_inbound_frame_decodes_control() {
        let frame: InboundFrame =
            serde_json::from_str(r#"{"type":"pong","source":"server","timestamp":"t"}"#).unwrap();
        assert!(matches!(
            frame,
            InboundFrame::Control(ControlFrame::Pong { .. })
        ));

        let frame: InboundFrame = serde_json::from_str(
            r#"{"type":"system","subtype":"welcome","content":"hello"}"#,
        )
        .unwrap();
        match frame {
            InboundFrame::Control(ControlFrame::System { subtype, .. }) => {
                assert_eq!(subtype, SystemSubtype::Welcome)
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_inbound_frame_decodes_message() {
        let msg = Message::new("a", "b", json!({"text": "hi"}), "text", None);
        let raw = serde_json::to_string(&msg).unwrap();

        let frame: InboundFrame = serde_json::from_str(&raw).unwrap();
        match frame {
            InboundFrame::Message(m) => assert_eq!(m.id, msg.id),
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}
