//! Field-survey nodes to canonical records.
//!
//! Survey attributes are keyed by attribute name, and most values are
//! wrapped in per-entry objects. Facts about a pole can live on other
//! nodes: birthmarks may be recorded once and referenced, and comm drops
//! are recorded on the service-location node at the far end of a span.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use crate::config::{CommDropConfig, ReconConfig, UnitHeuristic};
use crate::extract::{
    attribute, attribute_entry_field, attribute_scalar, first_of, lat_lon, members, path, point,
    scalar_eq, scalar_text, truthy, unwrap_scalar,
};
use crate::model::{CanonicalRecord, Connection, Coordinate, FieldInput, FieldNode, Source};
use crate::normalize::{normalize_count, normalize_identifier, normalize_number};
use crate::spec::{compose_spec, normalize_spec};

const BIRTHMARK_ATTRIBUTE: &str = "birthmark_brand";
const POLE_TYPE: &str = "pole";
const SERVICE_LOCATION_TYPE: &str = "service location";

// ---------------------------------------------------------------------------
// Node classification
// ---------------------------------------------------------------------------

fn node_type(node: &Value) -> Option<String> {
    attribute_scalar(node, "node_type").and_then(scalar_text)
}

/// Pole nodes in document order. With no typed node in the document every
/// node counts as a pole.
pub fn pole_nodes(input: &FieldInput) -> Vec<&FieldNode> {
    let any_typed = input.nodes.iter().any(|n| node_type(&n.value).is_some());
    input
        .nodes
        .iter()
        .filter(|n| {
            !any_typed
                || attribute_scalar(&n.value, "node_type")
                    .map(|t| scalar_eq(t, POLE_TYPE))
                    .unwrap_or(false)
        })
        .collect()
}

fn is_carrier_service(node: &Value, carrier: &CommDropConfig) -> bool {
    let is_service = attribute_scalar(node, "node_type")
        .map(|t| scalar_eq(t, SERVICE_LOCATION_TYPE))
        .unwrap_or(false);
    let is_carrier = attribute_scalar(node, "node_sub_type")
        .and_then(scalar_text)
        .map(|s| carrier.is_carrier(&s))
        .unwrap_or(false);
    is_service && is_carrier
}

fn structure_ref_id(node: &Value) -> Option<String> {
    first_of(
        node,
        &[
            &|n: &Value| attribute_scalar(n, "structure_ref_id").and_then(scalar_text),
            &|n: &Value| n.get("_structure_ref_id").and_then(unwrap_scalar).and_then(scalar_text),
        ],
    )
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Birthmarks
// ---------------------------------------------------------------------------

/// Birthmark bundles from every node, keyed for indirect lookup.
#[derive(Debug, Clone, Default)]
pub struct BirthmarkTable {
    entries: HashMap<String, Value>,
}

impl BirthmarkTable {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key.trim())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Scan all nodes once. A bundle is keyed by its own `birthmark_id`/`id`,
/// else by the node key, else by the node's structure reference id.
/// First writer wins.
pub fn collect_birthmarks(nodes: &[FieldNode]) -> BirthmarkTable {
    let mut table = BirthmarkTable::default();

    for node in nodes {
        let Some(bundles) = attribute(&node.value, BIRTHMARK_ATTRIBUTE) else {
            continue;
        };
        for bundle in members(bundles).into_iter().filter(|b| b.is_object()) {
            let own_id = first_of(
                bundle,
                &[
                    &|b: &Value| b.get("birthmark_id").and_then(scalar_text),
                    &|b: &Value| b.get("id").and_then(scalar_text),
                ],
            );
            let key = own_id
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .or_else(|| (!node.key.is_empty()).then(|| node.key.clone()))
                .or_else(|| structure_ref_id(&node.value));
            if let Some(key) = key {
                table.entries.entry(key).or_insert_with(|| bundle.clone());
            }
        }
    }

    log::debug!("birthmark table: {} bundles", table.len());
    table
}

fn bundle_field<'v>(bundle: &'v Value, name: &str) -> Option<&'v Value> {
    bundle.get(name).and_then(unwrap_scalar)
}

/// Spec composed from one birthmark bundle.
pub fn birthmark_spec(bundle: &Value, units: &UnitHeuristic) -> Option<String> {
    let species = bundle_field(bundle, "pole_species").or_else(|| bundle_field(bundle, "pole_species*"));
    compose_spec(
        bundle_field(bundle, "pole_height"),
        bundle_field(bundle, "pole_class"),
        species,
        units,
    )
}

// ---------------------------------------------------------------------------
// Comm drops
// ---------------------------------------------------------------------------

/// Poles with an unbuilt carrier drop, derived once per document.
#[derive(Debug, Clone, Default)]
pub struct CommDropIndex {
    /// `false` when the document has no span data at all.
    evaluable: bool,
    proposed: HashSet<String>,
}

impl CommDropIndex {
    pub fn build(input: &FieldInput, carrier: &CommDropConfig) -> Self {
        let Some(connections) = input.connections.as_ref() else {
            return Self::default();
        };

        let mut by_node: HashMap<&str, Vec<&Connection>> = HashMap::new();
        for connection in connections {
            by_node.entry(connection.node_a.as_str()).or_default().push(connection);
            by_node.entry(connection.node_b.as_str()).or_default().push(connection);
        }

        let mut proposed = HashSet::new();
        for service in input.nodes.iter().filter(|n| is_carrier_service(&n.value, carrier)) {
            let Some(measured) = attribute(&service.value, "measured_attachments") else {
                continue;
            };
            for connection in by_node.get(service.key.as_str()).into_iter().flatten() {
                let unbuilt = connection
                    .section_ids
                    .iter()
                    .any(|sid| measured.get(sid).and_then(measured_flag) == Some(false));
                if !unbuilt {
                    continue;
                }
                let other = if connection.node_a == service.key {
                    &connection.node_b
                } else {
                    &connection.node_a
                };
                if other != &service.key {
                    proposed.insert(other.clone());
                }
            }
        }

        log::debug!("comm drop index: {} poles with proposed drops", proposed.len());
        Self {
            evaluable: true,
            proposed,
        }
    }

    pub fn lookup(&self, pole_key: &str) -> Option<bool> {
        self.evaluable.then(|| self.proposed.contains(pole_key))
    }
}

fn measured_flag(entry: &Value) -> Option<bool> {
    first_of(
        entry,
        &[
            &truthy,
            &|e: &Value| e.get("measured").and_then(unwrap_scalar).and_then(truthy),
            &|e: &Value| {
                members(e)
                    .into_iter()
                    .find_map(|inner| inner.get("measured").and_then(unwrap_scalar).and_then(truthy))
            },
        ],
    )
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Document-wide state shared by every pole of one field document.
pub struct FieldContext<'a> {
    pub birthmarks: BirthmarkTable,
    pub comm_drops: CommDropIndex,
    pub config: &'a ReconConfig,
}

impl<'a> FieldContext<'a> {
    pub fn new(input: &FieldInput, config: &'a ReconConfig) -> Self {
        Self {
            birthmarks: collect_birthmarks(&input.nodes),
            comm_drops: CommDropIndex::build(input, &config.comm_drop),
            config,
        }
    }
}

/// Normalize one pole node. Missing fields become `None`.
pub fn normalize_field(index: usize, node: &FieldNode, ctx: &FieldContext<'_>) -> CanonicalRecord {
    let value = node.value.as_ref();
    let mut record = CanonicalRecord::empty(index, Source::Field, Arc::clone(&node.value));

    record.key = (!node.key.is_empty()).then(|| node.key.clone());
    record.scid = field_scid(value);
    record.pole_number = field_pole_number(value);
    record.coordinate = field_coordinate(value);
    record.spec = field_spec(value, ctx);
    record.existing_percent = first_of(
        value,
        &[
            &|n: &Value| attribute_scalar(n, "existing_capacity_%").and_then(normalize_number),
            &|n: &Value| n.get("Existing Capacity %").and_then(normalize_number),
        ],
    );
    record.final_percent =
        attribute_scalar(value, "final_passing_capacity_%").and_then(normalize_number);
    record.comm_drop = ctx.comm_drops.lookup(&node.key);

    record
}

fn field_scid(node: &Value) -> Option<String> {
    first_of(
        node,
        &[
            &|n: &Value| attribute_scalar(n, "scid").and_then(normalize_identifier),
            &|n: &Value| attribute_scalar(n, "structure_ref_id").and_then(normalize_identifier),
            &|n: &Value| {
                n.get("_structure_ref_id")
                    .and_then(unwrap_scalar)
                    .and_then(normalize_identifier)
            },
        ],
    )
}

fn field_pole_number(node: &Value) -> Option<String> {
    first_of(
        node,
        &[
            &|n: &Value| attribute_scalar(n, "pole_number").and_then(normalize_count),
            &|n: &Value| attribute_scalar(n, "PoleNumber").and_then(normalize_count),
            &|n: &Value| attribute_entry_field(n, "pole_tag", "tagtext").and_then(normalize_count),
            &|n: &Value| {
                attribute_entry_field(n, "electric_pole_tag", "assessment").and_then(normalize_count)
            },
            &|n: &Value| attribute_scalar(n, "DLOC_number").and_then(normalize_count),
        ],
    )
}

fn field_coordinate(node: &Value) -> Option<Coordinate> {
    lat_lon(node).or_else(|| path(node, &["geometry"]).and_then(point))
}

fn field_spec(node: &Value, ctx: &FieldContext<'_>) -> Option<String> {
    let units = &ctx.config.units;
    first_of(
        node,
        &[
            &|n: &Value| {
                attribute_scalar(n, "pole_spec")
                    .and_then(scalar_text)
                    .and_then(|s| normalize_spec(&s))
            },
            &|n: &Value| n.get("Pole Specs").and_then(scalar_text).and_then(|s| normalize_spec(&s)),
            &|n: &Value| {
                let bundles = attribute(n, BIRTHMARK_ATTRIBUTE)?;
                members(bundles)
                    .into_iter()
                    .find_map(|bundle| birthmark_spec(bundle, units))
            },
            &|n: &Value| {
                let reference = first_of(
                    n,
                    &[
                        &|n: &Value| attribute_scalar(n, "birthmark_ref_id").and_then(scalar_text),
                        &|n: &Value| attribute_scalar(n, "birthmark_id").and_then(scalar_text),
                    ],
                )?;
                ctx.birthmarks
                    .get(&reference)
                    .and_then(|bundle| birthmark_spec(bundle, units))
            },
            &|n: &Value| {
                compose_spec(
                    attribute_scalar(n, "pole_height"),
                    attribute_scalar(n, "pole_class"),
                    attribute_scalar(n, "pole_species"),
                    units,
                )
            },
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(key: &str, value: Value) -> FieldNode {
        FieldNode {
            key: key.into(),
            value: Arc::new(value),
        }
    }

    fn normalize_single(n: FieldNode, connections: Option<Vec<Connection>>) -> CanonicalRecord {
        let config = ReconConfig::default();
        let input = FieldInput {
            nodes: vec![n.clone()],
            connections,
        };
        let ctx = FieldContext::new(&input, &config);
        normalize_field(0, &n, &ctx)
    }

    #[test]
    fn scid_shapes_and_fallback() {
        let rec = normalize_single(node("n1", json!({"attributes": {"scid": {"auto_button": " 12 "}}})), None);
        assert_eq!(rec.scid.as_deref(), Some("12"));

        let rec = normalize_single(
            node("n1", json!({"attributes": {"scid": {"-x": "A1"}, "structure_ref_id": {"-y": "88"}}})),
            None,
        );
        assert_eq!(rec.scid.as_deref(), Some("88"));
    }

    #[test]
    fn pole_number_priority() {
        let rec = normalize_single(
            node("n1", json!({"attributes": {
                "PoleNumber": {"-a": "G-0200"},
                "pole_tag": {"-b": {"tagtext": "PL 300"}},
            }})),
            None,
        );
        assert_eq!(rec.pole_number.as_deref(), Some("200"));

        let rec = normalize_single(
            node("n1", json!({"attributes": {
                "electric_pole_tag": {"-c": {"assessment": "T-55"}},
                "DLOC_number": "D9",
            }})),
            None,
        );
        assert_eq!(rec.pole_number.as_deref(), Some("55"));

        let rec = normalize_single(node("n1", json!({"attributes": {"DLOC_number": "D9"}})), None);
        assert_eq!(rec.pole_number.as_deref(), Some("9"));
    }

    #[test]
    fn coordinate_sources() {
        let rec = normalize_single(node("n1", json!({"latitude": 30.0, "longitude": -95.0})), None);
        assert_eq!(rec.coordinate, Some(Coordinate::new(30.0, -95.0)));
        let rec = normalize_single(
            node("n1", json!({"geometry": {"type": "Point", "coordinates": [-95.5, 30.5]}})),
            None,
        );
        assert_eq!(rec.coordinate, Some(Coordinate::new(30.5, -95.5)));
    }

    #[test]
    fn spec_sources_in_order() {
        let rec = normalize_single(
            node("n1", json!({
                "attributes": {"pole_spec": {"-a": "45-3 sp"}, "pole_height": {"-b": "40"}},
                "Pole Specs": "50-2",
            })),
            None,
        );
        assert_eq!(rec.spec.as_deref(), Some("45-3 SP"));

        let rec = normalize_single(node("n1", json!({"Pole Specs": "50 ft class 2"})), None);
        assert_eq!(rec.spec.as_deref(), Some("50-2"));

        let rec = normalize_single(
            node("n1", json!({"attributes": {"birthmark_brand": {"-bm": {
                "pole_height": "40", "pole_class": "4", "pole_species*": "SPC*",
            }}}})),
            None,
        );
        assert_eq!(rec.spec.as_deref(), Some("40-4 SPC"));

        let rec = normalize_single(
            node("n1", json!({"attributes": {
                "pole_height": {"-a": "35"}, "pole_class": {"-b": "5"}, "pole_species": {"-c": "WRC"},
            }})),
            None,
        );
        assert_eq!(rec.spec.as_deref(), Some("35-5 WRC"));
    }

    #[test]
    fn birthmark_reference_lookup() {
        let config = ReconConfig::default();
        let input = FieldInput {
            nodes: vec![
                node("photo", json!({"attributes": {"birthmark_brand": {"-bm": {
                    "birthmark_id": "BM-1", "pole_height": "45", "pole_class": "2",
                }}}})),
                node("pole", json!({"attributes": {"node_type": "pole", "birthmark_ref_id": {"-r": "BM-1"}}})),
            ],
            connections: None,
        };
        let ctx = FieldContext::new(&input, &config);
        assert_eq!(ctx.birthmarks.len(), 1);
        let rec = normalize_field(0, &input.nodes[1], &ctx);
        assert_eq!(rec.spec.as_deref(), Some("45-2"));
    }

    #[test]
    fn birthmark_keyed_by_node_without_id() {
        let nodes = vec![node("n7", json!({"attributes": {"birthmark_brand": {"-a": {"pole_height": "40"}}}}))];
        let table = collect_birthmarks(&nodes);
        assert!(table.get("n7").is_some());
    }

    #[test]
    fn percentages() {
        let rec = normalize_single(
            node("n1", json!({"attributes": {
                "existing_capacity_%": {"-a": "55.5"},
                "final_passing_capacity_%": {"-b": "71.25%"},
            }})),
            None,
        );
        assert_eq!(rec.existing_percent, Some(55.5));
        assert_eq!(rec.final_percent, Some(71.25));

        let rec = normalize_single(node("n1", json!({"Existing Capacity %": "40%"})), None);
        assert_eq!(rec.existing_percent, Some(40.0));
        assert_eq!(rec.final_percent, None);
    }

    fn drop_input(measured: bool, sub_type: &str) -> FieldInput {
        FieldInput {
            nodes: vec![
                node("p1", json!({"attributes": {"node_type": {"-a": "pole"}}})),
                node("p2", json!({"attributes": {"node_type": {"-a": "pole"}}})),
                node("s1", json!({"attributes": {
                    "node_type": {"-a": "service location"},
                    "node_sub_type": {"-b": sub_type},
                    "measured_attachments": {"sec1": {"measured": measured}},
                }})),
            ],
            connections: Some(vec![Connection {
                node_a: "p1".into(),
                node_b: "s1".into(),
                section_ids: vec!["sec1".into()],
            }]),
        }
    }

    #[test]
    fn comm_drop_from_service_location() {
        let config = ReconConfig::default();

        let input = drop_input(false, "Charter");
        let index = CommDropIndex::build(&input, &config.comm_drop);
        assert_eq!(index.lookup("p1"), Some(true));
        assert_eq!(index.lookup("p2"), Some(false));

        let built = drop_input(true, "Charter");
        let index = CommDropIndex::build(&built, &config.comm_drop);
        assert_eq!(index.lookup("p1"), Some(false));

        let other = drop_input(false, "Comcast");
        let index = CommDropIndex::build(&other, &config.comm_drop);
        assert_eq!(index.lookup("p1"), Some(false));
    }

    #[test]
    fn comm_drop_unknown_without_connections() {
        let mut input = drop_input(false, "Charter");
        input.connections = None;
        let index = CommDropIndex::build(&input, &ReconConfig::default().comm_drop);
        assert_eq!(index.lookup("p1"), None);
    }

    #[test]
    fn pole_filter() {
        let input = drop_input(false, "Charter");
        let poles: Vec<&str> = pole_nodes(&input).iter().map(|n| n.key.as_str()).collect();
        assert_eq!(poles, vec!["p1", "p2"]);

        let untyped = FieldInput {
            nodes: vec![node("a", json!({})), node("b", json!({}))],
            connections: None,
        };
        assert_eq!(pole_nodes(&untyped).len(), 2);
    }

    #[test]
    fn measured_flag_shapes() {
        assert_eq!(measured_flag(&json!(false)), Some(false));
        assert_eq!(measured_flag(&json!({"measured": "false"})), Some(false));
        assert_eq!(measured_flag(&json!({"-a": {"measured": true}})), Some(true));
        assert_eq!(measured_flag(&json!({})), None);
    }
}
