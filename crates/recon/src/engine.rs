use std::sync::Arc;

use serde_json::Value;

use crate::alias::build_alias_table;
use crate::config::ReconConfig;
use crate::design::{normalize_design, DesignContext};
use crate::error::ReconError;
use crate::evidence::compute_statistics;
use crate::extract::{first_of, members, path, scalar_text};
use crate::field::{normalize_field, pole_nodes, FieldContext};
use crate::matcher::match_records;
use crate::model::{
    CanonicalRecord, Connection, DesignInput, FieldInput, FieldNode, ReconInput, ReconMeta,
    ReconResult,
};

// ---------------------------------------------------------------------------
// Document loaders
// ---------------------------------------------------------------------------

/// Parse the text of one source document.
pub fn load_document(what: &str, text: &str) -> Result<Value, ReconError> {
    serde_json::from_str(text).map_err(|e| ReconError::Io(format!("{what} document: {e}")))
}

fn require_object<'v>(doc: &'v Value, what: &str) -> Result<&'v serde_json::Map<String, Value>, ReconError> {
    doc.as_object()
        .ok_or_else(|| ReconError::InvalidInput(format!("{what} document is not a JSON object")))
}

/// Array elements of an optional nested container. Wrong shapes are
/// logged and skipped.
fn nested_list<'v>(value: Option<&'v Value>, what: &str) -> Vec<&'v Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => {
            log::warn!("{what}: expected a list, found {}; skipped", kind(other));
            Vec::new()
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

impl DesignInput {
    /// Pull locations and pole-type definitions out of a whole design
    /// document. Locations under `leads[]` come first, then any top-level
    /// `locations[]`.
    pub fn from_value(doc: &Value) -> Result<Self, ReconError> {
        let root = require_object(doc, "design")?;

        if let Some(top) = root.get("locations") {
            if !top.is_array() && !top.is_null() {
                return Err(ReconError::InvalidInput(format!(
                    "design `locations` must be a list, found {}",
                    kind(top)
                )));
            }
        }

        let mut locations = Vec::new();
        for (i, lead) in nested_list(root.get("leads"), "design leads").into_iter().enumerate() {
            let what = format!("design leads[{i}].locations");
            locations.extend(
                nested_list(lead.get("locations"), &what)
                    .into_iter()
                    .map(|l| Arc::new(l.clone())),
            );
        }
        locations.extend(
            nested_list(root.get("locations"), "design locations")
                .into_iter()
                .map(|l| Arc::new(l.clone())),
        );

        let pole_types = nested_list(path(doc, &["clientData", "poles"]), "design clientData.poles")
            .into_iter()
            .cloned()
            .collect();

        Ok(Self {
            locations,
            pole_types,
        })
    }
}

impl FieldInput {
    /// Pull every node and the span graph out of a whole field document.
    pub fn from_value(doc: &Value) -> Result<Self, ReconError> {
        let root = require_object(doc, "field")?;

        let nodes = match root.get("nodes") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(key, node)| FieldNode {
                    key: key.clone(),
                    value: Arc::new(node.clone()),
                })
                .collect(),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, node)| FieldNode {
                    key: node_key(node).unwrap_or_else(|| i.to_string()),
                    value: Arc::new(node.clone()),
                })
                .collect(),
            Some(other) => {
                return Err(ReconError::InvalidInput(format!(
                    "field `nodes` must be an object or a list, found {}",
                    kind(other)
                )))
            }
        };

        let connections = match root.get("connections") {
            None | Some(Value::Null) => None,
            Some(value @ (Value::Object(_) | Value::Array(_))) => {
                Some(members(value).into_iter().filter_map(connection).collect())
            }
            Some(other) => {
                log::warn!("field connections: found {}; treated as absent", kind(other));
                None
            }
        };

        Ok(Self { nodes, connections })
    }
}

impl ReconInput {
    pub fn from_values(design: &Value, field: &Value) -> Result<Self, ReconError> {
        Ok(Self {
            design: DesignInput::from_value(design)?,
            field: FieldInput::from_value(field)?,
        })
    }
}

fn node_key(node: &Value) -> Option<String> {
    first_of(
        node,
        &[
            &|n: &Value| n.get("_key").and_then(scalar_text),
            &|n: &Value| n.get("id").and_then(scalar_text),
        ],
    )
}

fn connection(value: &Value) -> Option<Connection> {
    let node_a = value.get("node_id_1").and_then(scalar_text)?;
    let node_b = value.get("node_id_2").and_then(scalar_text)?;
    let section_ids = match value.get("sections") {
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        Some(Value::Array(items)) => items.iter().filter_map(node_key).collect(),
        _ => Vec::new(),
    };
    Some(Connection {
        node_a,
        node_b,
        section_ids,
    })
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Canonical records for both sides, in source order.
pub fn normalize_inputs(
    config: &ReconConfig,
    input: &ReconInput,
) -> (Vec<CanonicalRecord>, Vec<CanonicalRecord>) {
    let aliases = build_alias_table(&input.design.pole_types, &config.units);
    let design_ctx = DesignContext {
        aliases: &aliases,
        config,
    };
    let design = input
        .design
        .locations
        .iter()
        .enumerate()
        .map(|(i, loc)| normalize_design(i, loc, &design_ctx))
        .collect();

    let field_ctx = FieldContext::new(&input.field, config);
    let field = pole_nodes(&input.field)
        .into_iter()
        .enumerate()
        .map(|(i, node)| normalize_field(i, node, &field_ctx))
        .collect();

    (design, field)
}

/// Normalize, match and summarize one pair of inputs.
pub fn run(config: &ReconConfig, input: &ReconInput) -> Result<ReconResult, ReconError> {
    config.validate()?;

    let (design, field) = normalize_inputs(config, input);
    let entities = match_records(&design, &field, config);
    let statistics = compute_statistics(design.len(), field.len(), &entities);

    log::info!(
        "{}: {} design / {} field records, {} matched ({}), {} unmatched field, {} unmatched design",
        config.name,
        statistics.design_total,
        statistics.field_total,
        statistics.total_matches,
        statistics.success_rate,
        statistics.unmatched_field,
        statistics.unmatched_design,
    );

    Ok(ReconResult {
        meta: ReconMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        statistics,
        entities,
    })
}
