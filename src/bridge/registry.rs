//! Protocol registry: built-in dialects plus protocols learned at runtime.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::artifact::ArtifactKind;

/// Built-in protocol dialects with canonical descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinProtocol {
    A2a,
    Mcp,
    LangChain,
    AutoGen,
}

impl BuiltinProtocol {
    pub const ALL: [BuiltinProtocol; 4] = [
        BuiltinProtocol::A2a,
        BuiltinProtocol::Mcp,
        BuiltinProtocol::LangChain,
        BuiltinProtocol::AutoGen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuiltinProtocol::A2a => "A2A",
            BuiltinProtocol::Mcp => "MCP",
            BuiltinProtocol::LangChain => "LANGCHAIN",
            BuiltinProtocol::AutoGen => "AUTOGEN",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(name))
    }
}

/// Where a descriptor came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolOrigin {
    Builtin,
    Learned,
}

/// A protocol's name, description, and example shapes per artifact kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub message_examples: Vec<Value>,
    #[serde(default)]
    pub capability_examples: Vec<Value>,
    #[serde(default)]
    pub tool_examples: Vec<Value>,
    pub origin: ProtocolOrigin,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl ProtocolDescriptor {
    pub fn examples_for(&self, kind: ArtifactKind) -> &[Value] {
        match kind {
            ArtifactKind::Message => &self.message_examples,
            ArtifactKind::Capability => &self.capability_examples,
            ArtifactKind::Tool => &self.tool_examples,
        }
    }

    pub fn has_any_examples(&self) -> bool {
        !self.message_examples.is_empty()
            || !self.capability_examples.is_empty()
            || !self.tool_examples.is_empty()
    }
}

/// Example sets handed to `learn_custom_protocol`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProtocolExamples {
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(default)]
    pub capabilities: Vec<Value>,
    #[serde(default)]
    pub tools: Vec<Value>,
}

impl ProtocolExamples {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.capabilities.is_empty() && self.tools.is_empty()
    }
}

/// Registry of every protocol the bridge can name.
#[derive(Debug)]
pub struct ProtocolRegistry {
    protocols: HashMap<String, ProtocolDescriptor>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            protocols: HashMap::new(),
        };
        for descriptor in builtin_descriptors() {
            registry
                .protocols
                .insert(descriptor.name.to_uppercase(), descriptor);
        }
        registry
    }

    pub fn resolve(&self, name: &str) -> Option<&ProtocolDescriptor> {
        self.protocols.get(&name.to_uppercase())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.protocols.values().map(|d| d.name.clone()).collect();
        names.sort();
        names
    }

    /// Register or extend a learned protocol. Example categories merge
    /// additively: re-teaching a name never discards what was taught
    /// before.
    pub fn learn(&mut self, name: &str, examples: ProtocolExamples) {
        let descriptor = self
            .protocols
            .entry(name.to_uppercase())
            .or_insert_with(|| ProtocolDescriptor {
                name: name.to_string(),
                description: format!("Custom protocol '{}' taught from examples", name),
                message_examples: Vec::new(),
                capability_examples: Vec::new(),
                tool_examples: Vec::new(),
                origin: ProtocolOrigin::Learned,
                last_updated: None,
            });

        descriptor.message_examples.extend(examples.messages);
        descriptor.capability_examples.extend(examples.capabilities);
        descriptor.tool_examples.extend(examples.tools);
        descriptor.last_updated = Some(now_iso());
    }

    /// Merge refreshed information into a built-in descriptor. Fields the
    /// refresh does not carry are retained from the previous descriptor.
    pub fn apply_update(&mut self, protocol: BuiltinProtocol, info: &Value) {
        let Some(descriptor) = self.protocols.get_mut(protocol.as_str()) else {
            return;
        };

        if let Some(description) = info.get("description").and_then(Value::as_str) {
            descriptor.description = description.to_string();
        }
        if let Some(examples) = info.get("message_examples").and_then(Value::as_array) {
            descriptor.message_examples = examples.clone();
        }
        if let Some(examples) = info.get("capability_examples").and_then(Value::as_array) {
            descriptor.capability_examples = examples.clone();
        }
        if let Some(examples) = info.get("tool_examples").and_then(Value::as_array) {
            descriptor.tool_examples = examples.clone();
        }
        descriptor.last_updated = Some(now_iso());
    }
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn builtin_descriptors() -> Vec<ProtocolDescriptor> {
    vec![
        ProtocolDescriptor {
            name: "A2A".to_string(),
            description: "Agent-to-agent dialect: chat turns carry a role and content; \
                          capabilities are named with qualifier lists; tools declare \
                          parameters and returns."
                .to_string(),
            message_examples: vec![
                json!({"role": "user", "content": "hello"}),
                json!({"role": "assistant", "content": "hi, how can I help?"}),
            ],
            capability_examples: vec![json!({"name": "search", "qualifiers": ["web", "news"]})],
            tool_examples: vec![json!({
                "name": "fetch_url",
                "parameters": {"url": "string"},
                "returns": {"body": "string"}
            })],
            origin: ProtocolOrigin::Builtin,
            last_updated: None,
        },
        ProtocolDescriptor {
            name: "MCP".to_string(),
            description: "Model Context Protocol dialect: typed messages with text \
                          bodies; capabilities expose action lists; tools declare \
                          input and output schemas."
                .to_string(),
            message_examples: vec![
                json!({"type": "user_message", "text": "hello"}),
                json!({"type": "assistant_message", "text": "hi, how can I help?"}),
            ],
            capability_examples: vec![json!({"name": "search", "actions": ["web", "news"]})],
            tool_examples: vec![json!({
                "name": "fetch_url",
                "input_schema": {"url": "string"},
                "output_schema": {"body": "string"}
            })],
            origin: ProtocolOrigin::Builtin,
            last_updated: None,
        },
        ProtocolDescriptor {
            name: "LANGCHAIN".to_string(),
            description: "LangChain dialect: messages carry a type (human, ai, \
                          system, function), content, and additional kwargs; tools \
                          declare an args schema."
                .to_string(),
            message_examples: vec![json!({
                "type": "human",
                "content": "hello",
                "additional_kwargs": {}
            })],
            capability_examples: Vec::new(),
            tool_examples: vec![json!({
                "name": "calculator",
                "description": "Evaluate arithmetic expressions",
                "args_schema": {"expression": "string"}
            })],
            origin: ProtocolOrigin::Builtin,
            last_updated: None,
        },
        ProtocolDescriptor {
            name: "AUTOGEN".to_string(),
            description: "AutoGen dialect: messages carry content, a role, and the \
                          sender name; tools are named functions with JSON-schema \
                          parameters."
                .to_string(),
            message_examples: vec![json!({
                "content": "hello",
                "role": "user",
                "name": "user_proxy"
            })],
            capability_examples: Vec::new(),
            tool_examples: vec![json!({
                "name": "run_code",
                "description": "Execute a code snippet",
                "parameters": {"language": "string", "code": "string"}
            })],
            origin: ProtocolOrigin::Builtin,
            last_updated: None,
        },
    ]
}
