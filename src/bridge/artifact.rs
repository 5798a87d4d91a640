//! Closed decode of translation payloads.
//!
//! Payloads entering or leaving the bridge are classified into a closed
//! set of shapes instead of flowing through the pipeline as arbitrary
//! JSON: a message (any object), a capability (`name` plus qualifiers), a
//! tool definition (`name` plus parameters/returns), or raw unknown data.

use serde::Deserialize;
use serde_json::{Map, Value};

/// What kind of artifact a translate operation is working on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Message,
    Capability,
    Tool,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Message => "message",
            ArtifactKind::Capability => "capability",
            ArtifactKind::Tool => "tool",
        }
    }
}

/// Invariant shape of a capability: a name plus qualifier-like fields.
#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityShape {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Invariant shape of a tool definition: a name plus parameter/return
/// fields.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolShape {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A classified payload.
#[derive(Debug, Clone)]
pub enum Artifact {
    Message(Value),
    Capability(CapabilityShape),
    Tool(ToolShape),
    RawUnknown(Value),
}

impl Artifact {
    /// Classify `value` as the expected kind, falling back to
    /// [`Artifact::RawUnknown`] when the invariant shape does not hold.
    pub fn decode(kind: ArtifactKind, value: &Value) -> Artifact {
        match kind {
            ArtifactKind::Message => {
                if value.is_object() {
                    Artifact::Message(value.clone())
                } else {
                    Artifact::RawUnknown(value.clone())
                }
            }
            ArtifactKind::Capability => match CapabilityShape::deserialize(value) {
                Ok(shape) => Artifact::Capability(shape),
                Err(_) => Artifact::RawUnknown(value.clone()),
            },
            ArtifactKind::Tool => match ToolShape::deserialize(value) {
                Ok(shape) => Artifact::Tool(shape),
                Err(_) => Artifact::RawUnknown(value.clone()),
            },
        }
    }

    /// Whether the payload matched the expected shape.
    pub fn is_well_formed(&self) -> bool {
        !matches!(self, Artifact::RawUnknown(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_accepts_any_object() {
        let artifact = Artifact::decode(ArtifactKind::Message, &json!({"anything": true}));
        assert!(artifact.is_well_formed());

        let artifact = Artifact::decode(ArtifactKind::Message, &json!("bare string"));
        assert!(!artifact.is_well_formed());
    }

    #[test]
    fn test_capability_requires_name() {
        let ok = Artifact::decode(
            ArtifactKind::Capability,
            &json!({"name": "search", "qualifiers": ["web"]}),
        );
        assert!(ok.is_well_formed());
        if let Artifact::Capability(shape) = ok {
            assert_eq!(shape.name, "search");
            assert!(shape.extra.contains_key("qualifiers"));
        }

        let missing = Artifact::decode(ArtifactKind::Capability, &json!({"qualifiers": ["web"]}));
        assert!(!missing.is_well_formed());
    }

    #[test]
    fn test_tool_requires_name() {
        let ok = Artifact::decode(
            ArtifactKind::Tool,
            &json!({"name": "fetch", "parameters": {"url": "string"}}),
        );
        assert!(ok.is_well_formed());

        let missing = Artifact::decode(ArtifactKind::Tool, &json!({"parameters": {}}));
        assert!(!missing.is_well_formed());
    }
}
