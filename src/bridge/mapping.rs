//! Table-driven field mappings between built-in protocol pairs.
//!
//! The deterministic mappings are versioned configuration data, not
//! inferred logic: `builtin_mappings.json` declares directional pairs with
//! per-artifact-kind rename rules and optional value maps. Adding a pair
//! means adding data, never touching the bridge's control flow.
//!
//! Fields not named by any rule pass through unchanged, so a mapped pair
//! round-trips exactly when its value maps are bijective.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::artifact::ArtifactKind;

const BUILTIN_MAPPINGS: &str = include_str!("builtin_mappings.json");

/// Versioned mapping configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MappingTable {
    pub version: u32,
    pub pairs: Vec<PairMapping>,
}

/// All mappings for one directional protocol pair.
#[derive(Debug, Clone, Deserialize)]
pub struct PairMapping {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub message: Option<FieldMap>,
    #[serde(default)]
    pub capability: Option<FieldMap>,
    #[serde(default)]
    pub tool: Option<FieldMap>,
}

/// Rename rules for one artifact kind.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FieldMap {
    pub fields: Vec<FieldRule>,
}

/// One field rename, with an optional value map applied to string values.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldRule {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub values: Option<HashMap<String, String>>,
}

impl MappingTable {
    /// The mappings shipped with the crate.
    pub fn builtin() -> Self {
        serde_json::from_str(BUILTIN_MAPPINGS).expect("embedded mapping table is valid JSON")
    }

    /// The field map for a pair and kind, if the pair is table-driven.
    pub fn lookup(&self, source: &str, target: &str, kind: ArtifactKind) -> Option<&FieldMap> {
        let pair = self.pairs.iter().find(|p| {
            p.source.eq_ignore_ascii_case(source) && p.target.eq_ignore_ascii_case(target)
        })?;
        match kind {
            ArtifactKind::Message => pair.message.as_ref(),
            ArtifactKind::Capability => pair.capability.as_ref(),
            ArtifactKind::Tool => pair.tool.as_ref(),
        }
    }

    /// Apply the table to `input`. Returns `None` when the pair/kind is not
    /// table-driven or the input is not an object.
    pub fn apply(
        &self,
        source: &str,
        target: &str,
        kind: ArtifactKind,
        input: &Value,
    ) -> Option<Value> {
        let field_map = self.lookup(source, target, kind)?;
        let obj = input.as_object()?;

        let mut remaining = obj.clone();
        let mut output = Map::new();

        for rule in &field_map.fields {
            if let Some(value) = remaining.remove(&rule.from) {
                output.insert(rule.to.clone(), map_value(&rule.values, value));
            }
        }

        // Unmapped fields carry over verbatim.
        for (key, value) in remaining {
            output.entry(key).or_insert(value);
        }

        Some(Value::Object(output))
    }
}

fn map_value(values: &Option<HashMap<String, String>>, value: Value) -> Value {
    if let (Some(values), Value::String(s)) = (values, &value) {
        if let Some(mapped) = values.get(s) {
            return Value::String(mapped.clone());
        }
    }
    value
}
