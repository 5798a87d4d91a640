//! The protocol translation bridge.
//!
//! Uniform algorithm for every translate operation: same-protocol
//! short-circuit, registry resolution, fingerprint-keyed cache lookup,
//! deterministic mapping table, and only then the model-mediated path with
//! structural validation of the result. Most traffic between two agents
//! repeats a small number of message shapes even as values vary, so the
//! shape-keyed cache turns one model call per message into one model call
//! per distinct shape pair.

use std::collections::BTreeSet;
use std::sync::Mutex;

use serde::Deserialize;
use serde_json::Value;

use super::artifact::{Artifact, ArtifactKind};
use super::cache::{CacheStats, TranslationCache};
use super::fingerprint::structural_fingerprint;
use super::mapping::MappingTable;
use super::model::ModelClient;
use super::registry::{BuiltinProtocol, ProtocolDescriptor, ProtocolExamples, ProtocolRegistry};
use crate::config::ModelConfig;
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};

/// Caller-supplied description of a protocol known only at call time.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolInfo {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub examples: Vec<Value>,
}

/// Translates messages, capabilities, and tool definitions between
/// protocol dialects.
pub struct ProtocolBridge {
    registry: Mutex<ProtocolRegistry>,
    mappings: MappingTable,
    cache: Mutex<TranslationCache>,
    model: ModelClient,
    events: EventBus,
}

impl ProtocolBridge {
    /// Build a bridge. Always succeeds: a missing model credential only
    /// fails the model-mediated calls, table-driven pairs keep working.
    pub fn new(model_config: &ModelConfig) -> Self {
        Self {
            registry: Mutex::new(ProtocolRegistry::new()),
            mappings: MappingTable::builtin(),
            cache: Mutex::new(TranslationCache::new(model_config.cache_capacity)),
            model: ModelClient::new(model_config),
            events: EventBus::default(),
        }
    }

    /// The event bus owned by this instance.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Every protocol name the bridge currently knows.
    pub fn protocol_names(&self) -> Vec<String> {
        self.registry.lock().unwrap().names()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().unwrap().stats()
    }

    pub async fn translate_message(&self, source: &Value, from: &str, to: &str) -> Result<Value> {
        self.translate(source, from, to, ArtifactKind::Message).await
    }

    pub async fn translate_capability(
        &self,
        source: &Value,
        from: &str,
        to: &str,
    ) -> Result<Value> {
        self.translate(source, from, to, ArtifactKind::Capability)
            .await
    }

    pub async fn translate_tool(&self, source: &Value, from: &str, to: &str) -> Result<Value> {
        self.translate(source, from, to, ArtifactKind::Tool).await
    }

    async fn translate(
        &self,
        source: &Value,
        from: &str,
        to: &str,
        kind: ArtifactKind,
    ) -> Result<Value> {
        if from.eq_ignore_ascii_case(to) {
            return Ok(source.clone());
        }

        let (source_desc, target_desc) = {
            let registry = self.registry.lock().unwrap();
            let source_desc = registry
                .resolve(from)
                .cloned()
                .ok_or_else(|| unsupported(from, from, to))?;
            let target_desc = registry
                .resolve(to)
                .cloned()
                .ok_or_else(|| unsupported(to, from, to))?;
            (source_desc, target_desc)
        };

        let fingerprint = structural_fingerprint(source);
        let key = TranslationCache::key(
            &from.to_uppercase(),
            &to.to_uppercase(),
            kind.as_str(),
            &fingerprint,
        );

        if let Some(hit) = self.cache.lock().unwrap().get(&key) {
            tracing::debug!("Cache hit for {} -> {} {}", from, to, kind.as_str());
            self.emit_translated(kind, from, to);
            return Ok(hit);
        }

        let output = match self.mappings.apply(from, to, kind, source) {
            Some(mapped) => {
                tracing::debug!("Table-driven {} -> {} {}", from, to, kind.as_str());
                mapped
            }
            None => {
                let prompt = translation_prompt(&source_desc, &target_desc, kind);
                let raw = match self.model.translate(source, &prompt).await {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(
                            "Translation {} -> {} ({}) failed: {}",
                            from,
                            to,
                            kind.as_str(),
                            e
                        );
                        return Err(e);
                    }
                };
                validate_output(kind, &raw, target_desc.examples_for(kind), from, to)?;
                raw
            }
        };

        self.cache.lock().unwrap().insert(key, output.clone());
        self.emit_translated(kind, from, to);
        Ok(output)
    }

    /// Teach a protocol from example shapes. Fails when every category is
    /// empty; otherwise merges additively with anything taught before.
    pub fn learn_custom_protocol(&self, name: &str, examples: ProtocolExamples) -> Result<()> {
        if examples.is_empty() {
            return Err(Error::InsufficientExamples(format!(
                "protocol '{}' needs at least one message, capability, or tool example",
                name
            )));
        }

        self.registry.lock().unwrap().learn(name, examples);
        self.events.emit(Event::ProtocolLearned {
            name: name.to_string(),
        });
        tracing::info!("Learned custom protocol '{}'", name);
        Ok(())
    }

    /// Refresh a built-in protocol's descriptor from the model's current
    /// knowledge. On failure the previous descriptor is retained and the
    /// error surfaced.
    pub async fn update_protocol_information(&self, protocol: BuiltinProtocol) -> Result<()> {
        let info = match self.model.protocol_information(protocol.as_str()).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(
                    "Protocol information refresh for {} failed, keeping previous descriptor: {}",
                    protocol.as_str(),
                    e
                );
                return Err(e);
            }
        };

        self.registry.lock().unwrap().apply_update(protocol, &info);
        self.events.emit(Event::ProtocolUpdated {
            name: protocol.as_str().to_string(),
        });
        tracing::info!("Updated protocol information for {}", protocol.as_str());
        Ok(())
    }

    /// Translate between two protocols described only by the caller.
    /// Nothing is persisted to the registry; the cache still applies.
    pub async fn dynamic_translate(
        &self,
        source: &Value,
        source_info: &ProtocolInfo,
        target_info: &ProtocolInfo,
    ) -> Result<Value> {
        let fingerprint = structural_fingerprint(source);
        let key = TranslationCache::key(
            &source_info.name.to_uppercase(),
            &target_info.name.to_uppercase(),
            "dynamic",
            &fingerprint,
        );

        if let Some(hit) = self.cache.lock().unwrap().get(&key) {
            tracing::debug!(
                "Cache hit for dynamic {} -> {}",
                source_info.name,
                target_info.name
            );
            self.emit_dynamic(source_info, target_info);
            return Ok(hit);
        }

        let prompt = dynamic_prompt(source_info, target_info);
        let output = match self.model.translate(source, &prompt).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    "Dynamic translation {} -> {} failed: {}",
                    source_info.name,
                    target_info.name,
                    e
                );
                return Err(e);
            }
        };

        if !output.is_object() {
            return Err(Error::TranslationValidation(format!(
                "{} -> {} result is not a JSON object",
                source_info.name, target_info.name
            )));
        }
        check_required_keys(&output, &target_info.examples, &source_info.name, &target_info.name)?;

        self.cache.lock().unwrap().insert(key, output.clone());
        self.emit_dynamic(source_info, target_info);
        Ok(output)
    }

    fn emit_translated(&self, kind: ArtifactKind, from: &str, to: &str) {
        let event = match kind {
            ArtifactKind::Message => Event::MessageTranslated {
                source: from.to_string(),
                target: to.to_string(),
            },
            ArtifactKind::Capability => Event::CapabilityTranslated {
                source: from.to_string(),
                target: to.to_string(),
            },
            ArtifactKind::Tool => Event::ToolTranslated {
                source: from.to_string(),
                target: to.to_string(),
            },
        };
        self.events.emit(event);
    }

    fn emit_dynamic(&self, source_info: &ProtocolInfo, target_info: &ProtocolInfo) {
        self.events.emit(Event::DynamicTranslation {
            source: source_info.name.clone(),
            target: target_info.name.clone(),
        });
    }
}

fn unsupported(name: &str, from: &str, to: &str) -> Error {
    Error::UnsupportedProtocol(format!(
        "'{}' is neither built-in nor learned (pair {} -> {})",
        name, from, to
    ))
}

/// Structural validation of a model-produced result: it must be an object,
/// carry the invariant fields of its artifact kind, and contain every key
/// common to all of the target protocol's examples of that kind.
fn validate_output(
    kind: ArtifactKind,
    output: &Value,
    target_examples: &[Value],
    from: &str,
    to: &str,
) -> Result<()> {
    if !output.is_object() {
        return Err(Error::TranslationValidation(format!(
            "{} -> {} {} result is not a JSON object",
            from,
            to,
            kind.as_str()
        )));
    }

    if !Artifact::decode(kind, output).is_well_formed() {
        return Err(Error::TranslationValidation(format!(
            "{} -> {} {} result is missing its invariant fields",
            from,
            to,
            kind.as_str()
        )));
    }

    check_required_keys(output, target_examples, from, to)
}

fn check_required_keys(output: &Value, examples: &[Value], from: &str, to: &str) -> Result<()> {
    for key in required_keys(examples) {
        if output.get(&key).is_none() {
            return Err(Error::TranslationValidation(format!(
                "{} -> {} result lacks expected key '{}'",
                from, to, key
            )));
        }
    }
    Ok(())
}

/// Keys present in every object example.
fn required_keys(examples: &[Value]) -> Vec<String> {
    let mut sets = examples
        .iter()
        .filter_map(Value::as_object)
        .map(|o| o.keys().cloned().collect::<BTreeSet<_>>());

    let Some(first) = sets.next() else {
        return Vec::new();
    };
    sets.fold(first, |acc, set| acc.intersection(&set).cloned().collect())
        .into_iter()
        .collect()
}

fn translation_prompt(
    source: &ProtocolDescriptor,
    target: &ProtocolDescriptor,
    kind: ArtifactKind,
) -> String {
    let mut prompt = format!(
        "Translate the following {} {} to the {} format.\n\n\
         Source format ({}):\n{}\n",
        source.name,
        kind.as_str(),
        target.name,
        source.name,
        source.description
    );

    append_examples(&mut prompt, "Source", kind, source.examples_for(kind));

    prompt.push_str(&format!(
        "\nTarget format ({}):\n{}\n",
        target.name, target.description
    ));
    append_examples(&mut prompt, "Target", kind, target.examples_for(kind));

    prompt.push_str(&format!(
        "\nMake sure the translated {} is valid according to the target protocol \
         format. Return only the translated {} as valid JSON without any \
         explanations.",
        kind.as_str(),
        kind.as_str()
    ));
    prompt
}

fn dynamic_prompt(source_info: &ProtocolInfo, target_info: &ProtocolInfo) -> String {
    let mut prompt = format!(
        "Translate the following data from {} format to {} format.\n\n\
         Source format ({}):\n{}\n",
        source_info.name, target_info.name, source_info.name, source_info.description
    );

    if !source_info.examples.is_empty() {
        prompt.push_str(&format!(
            "\nSource format examples:\n{}\n",
            serde_json::to_string_pretty(&source_info.examples).unwrap_or_default()
        ));
    }

    prompt.push_str(&format!(
        "\nTarget format ({}):\n{}\n",
        target_info.name, target_info.description
    ));

    if !target_info.examples.is_empty() {
        prompt.push_str(&format!(
            "\nTarget format examples:\n{}\n",
            serde_json::to_string_pretty(&target_info.examples).unwrap_or_default()
        ));
    }

    prompt.push_str(
        "\nAnalyze the source data structure and convert it to match the target \
         format. Return only the translated data as valid JSON without any \
         explanations.",
    );
    prompt
}

fn append_examples(prompt: &mut String, label: &str, kind: ArtifactKind, examples: &[Value]) {
    if examples.is_empty() {
        return;
    }
    prompt.push_str(&format!(
        "{} {} examples:\n{}\n",
        label,
        kind.as_str(),
        serde_json::to_string_pretty(examples).unwrap_or_default()
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// A bridge whose model endpoint is unreachable: table-driven paths
    /// must work, model-mediated paths must fail fast.
    fn offline_bridge() -> ProtocolBridge {
        let config = ModelConfig {
            api_key: Some("test-key".to_string()),
            organization: None,
            base_url: "http://127.0.0.1:9".to_string(),
            model: "gpt-4o".to_string(),
            cache_capacity: 16,
        };
        ProtocolBridge::new(&config)
    }

    #[tokio::test]
    async fn test_same_protocol_is_identity() {
        let bridge = offline_bridge();
        let source = json!({"role": "user", "content": "hello"});

        let out = bridge
            .translate_message(&source, "A2A", "a2a")
            .await
            .unwrap();
        assert_eq!(out, source);
    }

    #[tokio::test]
    async fn test_unknown_protocol_is_unsupported() {
        let bridge = offline_bridge();

        let err = bridge
            .translate_message(&json!({"role": "user"}), "A2A", "nonsense")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedProtocol(_)));

        let err = bridge
            .translate_message(&json!({"role": "user"}), "nonsense", "MCP")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedProtocol(_)));
    }

    #[tokio::test]
    async fn test_table_driven_pair_does_not_touch_model() {
        // The model endpoint is unreachable, so any model call would error.
        let bridge = offline_bridge();

        let out = bridge
            .translate_message(&json!({"role": "user", "content": "hello"}), "A2A", "MCP")
            .await
            .unwrap();
        assert_eq!(out, json!({"type": "user_message", "text": "hello"}));
    }

    #[tokio::test]
    async fn test_table_driven_round_trip() {
        let bridge = offline_bridge();
        let original = json!({"role": "assistant", "content": "hi there"});

        let forward = bridge
            .translate_message(&original, "A2A", "MCP")
            .await
            .unwrap();
        let back = bridge
            .translate_message(&forward, "MCP", "A2A")
            .await
            .unwrap();
        assert_eq!(back, original);
    }

    #[tokio::test]
    async fn test_cache_idempotence() {
        let bridge = offline_bridge();
        let source = json!({"role": "user", "content": "hello"});

        let first = bridge
            .translate_message(&source, "A2A", "MCP")
            .await
            .unwrap();
        let second = bridge
            .translate_message(&source, "A2A", "MCP")
            .await
            .unwrap();

        assert_eq!(first, second);
        let stats = bridge.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn test_cache_is_shape_keyed_not_value_keyed() {
        let bridge = offline_bridge();

        let first = bridge
            .translate_message(&json!({"role": "user", "content": "hello"}), "A2A", "MCP")
            .await
            .unwrap();
        // Structurally identical input with different values hits the
        // cache and returns the stored result unchanged.
        let second = bridge
            .translate_message(&json!({"role": "user", "content": "goodbye"}), "A2A", "MCP")
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(bridge.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn test_capability_and_tool_translation() {
        let bridge = offline_bridge();

        let capability = bridge
            .translate_capability(
                &json!({"name": "search", "qualifiers": ["web"]}),
                "A2A",
                "MCP",
            )
            .await
            .unwrap();
        assert_eq!(capability, json!({"name": "search", "actions": ["web"]}));

        let tool = bridge
            .translate_tool(
                &json!({"name": "fetch", "parameters": {"url": "string"}, "returns": {}}),
                "A2A",
                "MCP",
            )
            .await
            .unwrap();
        assert_eq!(tool["input_schema"], json!({"url": "string"}));
    }

    #[tokio::test]
    async fn test_learn_requires_examples() {
        let bridge = offline_bridge();

        let err = bridge
            .learn_custom_protocol("robotspeak", ProtocolExamples::default())
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientExamples(_)));
    }

    #[tokio::test]
    async fn test_learned_protocol_is_no_longer_unsupported() {
        let bridge = offline_bridge();

        let err = bridge
            .translate_message(&json!({"verb": "say"}), "robotspeak", "MCP")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedProtocol(_)));

        bridge
            .learn_custom_protocol(
                "robotspeak",
                ProtocolExamples {
                    messages: vec![json!({"verb": "say", "payload": "hello"})],
                    ..Default::default()
                },
            )
            .unwrap();

        // The pair now resolves; with the model endpoint down the failure
        // is a model error, not an unknown protocol.
        let err = bridge
            .translate_message(&json!({"verb": "say"}), "robotspeak", "MCP")
            .await
            .unwrap_err();
        assert!(!matches!(err, Error::UnsupportedProtocol(_)));
    }

    #[tokio::test]
    async fn test_update_failure_keeps_descriptor() {
        let bridge = offline_bridge();
        let before = {
            let registry = bridge.registry.lock().unwrap();
            registry.resolve("MCP").unwrap().description.clone()
        };

        let result = bridge
            .update_protocol_information(BuiltinProtocol::Mcp)
            .await;
        assert!(result.is_err());

        let after = {
            let registry = bridge.registry.lock().unwrap();
            registry.resolve("MCP").unwrap().description.clone()
        };
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_dynamic_translate_needs_model() {
        let bridge = offline_bridge();

        let source_info = ProtocolInfo {
            name: "wire-a".to_string(),
            description: "verb/payload pairs".to_string(),
            examples: vec![json!({"verb": "say", "payload": "hello"})],
        };
        let target_info = ProtocolInfo {
            name: "wire-b".to_string(),
            description: "op/body pairs".to_string(),
            examples: vec![json!({"op": "say", "body": "hello"})],
        };

        // No persistence: the ad-hoc names never enter the registry.
        let result = bridge
            .dynamic_translate(&json!({"verb": "say"}), &source_info, &target_info)
            .await;
        assert!(result.is_err());
        assert!(!bridge.protocol_names().iter().any(|n| n == "wire-a"));
    }

    #[test]
    fn test_validate_output_rules() {
        let examples = vec![
            json!({"type": "user_message", "text": "a"}),
            json!({"type": "assistant_message", "text": "b"}),
        ];

        // Valid object with all required keys.
        assert!(validate_output(
            ArtifactKind::Message,
            &json!({"type": "user_message", "text": "hi"}),
            &examples,
            "A2A",
            "MCP",
        )
        .is_ok());

        // Not an object.
        assert!(matches!(
            validate_output(ArtifactKind::Message, &json!("hi"), &examples, "A2A", "MCP"),
            Err(Error::TranslationValidation(_))
        ));

        // Missing a key common to every example.
        assert!(matches!(
            validate_output(
                ArtifactKind::Message,
                &json!({"type": "user_message"}),
                &examples,
                "A2A",
                "MCP",
            ),
            Err(Error::TranslationValidation(_))
        ));

        // A tool result without its invariant name field.
        assert!(matches!(
            validate_output(
                ArtifactKind::Tool,
                &json!({"parameters": {}}),
                &[],
                "A2A",
                "MCP",
            ),
            Err(Error::TranslationValidation(_))
        ));
    }

    #[test]
    fn test_required_keys_is_example_intersection() {
        let examples = vec![
            json!({"a": 1, "b": 2, "c": 3}),
            json!({"a": 1, "b": 2}),
            json!({"b": 2, "a": 1, "d": 4}),
        ];
        let keys = required_keys(&examples);
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_translation_events_name_pair_only() {
        let bridge = offline_bridge();
        let mut events = bridge.events().subscribe();

        bridge
            .translate_message(&json!({"role": "user", "content": "secret"}), "A2A", "MCP")
            .await
            .unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            Event::MessageTranslated {
                source: "A2A".to_string(),
                target: "MCP".to_string(),
            }
        );
    }
}
