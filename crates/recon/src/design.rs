//! Design-source (engineering design) records to canonical records.
//!
//! A location carries several design layers; the measured layer describes
//! the pole as it stands and the recommended layer the proposed state.

use std::sync::Arc;

use serde_json::Value;

use crate::alias::AliasTable;
use crate::config::ReconConfig;
use crate::extract::{first_of, located, members, path, scalar_eq, scalar_text};
use crate::model::{CanonicalRecord, Coordinate, Source};
use crate::normalize::{
    normalize_count, normalize_count_str, normalize_identifier, normalize_identifier_str,
    normalize_number,
};
use crate::spec::compose_spec;

const ATTACHMENT_LISTS: [&str; 3] = ["wires", "equipments", "attachments"];

pub struct DesignContext<'a> {
    pub aliases: &'a AliasTable,
    pub config: &'a ReconConfig,
}

/// Normalize one design location. Missing fields become `None`.
pub fn normalize_design(index: usize, location: &Arc<Value>, ctx: &DesignContext<'_>) -> CanonicalRecord {
    let loc = location.as_ref();
    let mut record = CanonicalRecord::empty(index, Source::Design, Arc::clone(location));

    record.key = first_of(
        loc,
        &[
            &|l: &Value| l.get("id").and_then(scalar_text),
            &|l: &Value| l.get("label").and_then(scalar_text),
        ],
    );
    record.scid = design_scid(loc);
    record.pole_number = design_pole_number(loc);
    record.coordinate = design_coordinate(loc);
    record.spec = design_spec(loc, ctx);

    let measured = measured_design(loc);
    let recommended = recommended_design(loc);
    record.existing_percent = measured.and_then(pole_load_percent);
    record.final_percent = recommended.and_then(pole_load_percent);
    record.comm_drop = recommended.and_then(|d| design_comm_drop(d, &ctx.config.comm_drop.carrier));

    record
}

/// Label with a leading `<number>-` prefix removed (`"12-PL410"` -> `"PL410"`).
pub fn strip_label_prefix(label: &str) -> &str {
    let trimmed = label.trim();
    match trimmed.split_once('-') {
        Some((head, rest))
            if !head.trim().is_empty() && head.trim().bytes().all(|b| b.is_ascii_digit()) =>
        {
            rest.trim()
        }
        _ => trimmed,
    }
}

fn stripped_label(loc: &Value) -> Option<String> {
    loc.get("label")
        .and_then(scalar_text)
        .map(|l| strip_label_prefix(&l).to_string())
}

fn design_scid(loc: &Value) -> Option<String> {
    first_of(
        loc,
        &[
            &|l: &Value| l.get("id").and_then(normalize_identifier),
            &|l: &Value| l.get("externalId").and_then(normalize_identifier),
            &|l: &Value| stripped_label(l).and_then(|s| normalize_identifier_str(&s)),
        ],
    )
}

fn design_pole_number(loc: &Value) -> Option<String> {
    first_of(
        loc,
        &[
            &|l: &Value| l.get("poleNumber").and_then(normalize_count),
            &|l: &Value| stripped_label(l).and_then(|s| normalize_count_str(&s)),
        ],
    )
}

// ---------------------------------------------------------------------------
// Design layers
// ---------------------------------------------------------------------------

fn designs(loc: &Value) -> Vec<&Value> {
    loc.get("designs").map(members).unwrap_or_default()
}

fn design_is(design: &Value, kind: &str) -> bool {
    ["layerType", "label"].iter().any(|k| {
        design
            .get(*k)
            .and_then(Value::as_str)
            .map(|s| s.to_ascii_lowercase().contains(kind))
            .unwrap_or(false)
    })
}

pub fn measured_design(loc: &Value) -> Option<&Value> {
    path(loc, &["measuredDesign"])
        .or_else(|| designs(loc).into_iter().find(|d| design_is(d, "measured")))
}

pub fn recommended_design(loc: &Value) -> Option<&Value> {
    path(loc, &["recommendedDesign"])
        .or_else(|| designs(loc).into_iter().find(|d| design_is(d, "recommended")))
}

/// Measured, then recommended, then the remaining layers in document order.
fn designs_by_priority(loc: &Value) -> Vec<&Value> {
    let mut ordered: Vec<&Value> = Vec::new();
    let candidates = [measured_design(loc), recommended_design(loc)]
        .into_iter()
        .flatten()
        .chain(designs(loc));
    for design in candidates {
        if !ordered.iter().any(|seen| std::ptr::eq(*seen, design)) {
            ordered.push(design);
        }
    }
    ordered
}

// ---------------------------------------------------------------------------
// Coordinate
// ---------------------------------------------------------------------------

fn design_coordinate(loc: &Value) -> Option<Coordinate> {
    located(loc)
        .or_else(|| {
            designs(loc).into_iter().find_map(|d| {
                located(d).or_else(|| d.get("structure").and_then(located))
            })
        })
        .or_else(|| path(loc, &["recommendedDesign"]).and_then(located))
        .or_else(|| path(loc, &["measuredDesign"]).and_then(located))
}

// ---------------------------------------------------------------------------
// Specification
// ---------------------------------------------------------------------------

fn pole_class_field(obj: &Value) -> Option<&Value> {
    obj.get("classOfPole").or_else(|| obj.get("class"))
}

fn design_spec(loc: &Value, ctx: &DesignContext<'_>) -> Option<String> {
    let units = &ctx.config.units;
    designs_by_priority(loc).into_iter().find_map(|design| {
        let pole = path(design, &["structure", "pole"])?;
        first_of(
            pole,
            &[
                &|p: &Value| compose_spec(p.get("height"), pole_class_field(p), p.get("species"), units),
                &|p: &Value| {
                    let alias = p
                        .get("clientItemAlias")
                        .or_else(|| path(p, &["clientItem", "alias"]))
                        .and_then(scalar_text)?;
                    ctx.aliases.get(&alias).map(str::to_string)
                },
                &|p: &Value| {
                    let item = path(p, &["clientItem"])?;
                    compose_spec(item.get("height"), pole_class_field(item), item.get("species"), units)
                },
            ],
        )
    })
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// `actual` of the first analysis result for the `Pole` component.
pub fn pole_load_percent(design: &Value) -> Option<f64> {
    let analysis = design.get("analysis")?;
    let groups = if analysis.get("results").is_some() {
        vec![analysis]
    } else {
        members(analysis)
    };

    groups
        .into_iter()
        .flat_map(|group| match group.get("results") {
            Some(results) => members(results),
            None => vec![group],
        })
        .find(|result| result.get("component").map(|c| scalar_eq(c, "Pole")).unwrap_or(false))
        .and_then(|result| result.get("actual"))
        .and_then(normalize_number)
}

// ---------------------------------------------------------------------------
// Comm drop
// ---------------------------------------------------------------------------

fn is_carrier_drop(attachment: &Value, carrier: &str) -> bool {
    let industry_ok = path(attachment, &["owner", "industry"])
        .map(|i| scalar_eq(i, "communication"))
        .unwrap_or(false);
    let owner_ok = path(attachment, &["owner", "id"])
        .map(|o| scalar_eq(o, carrier))
        .unwrap_or(false);
    let item_type = first_of(
        attachment,
        &[
            &|a: &Value| path(a, &["clientItem", "type"]).and_then(scalar_text),
            &|a: &Value| a.get("type").and_then(scalar_text),
            &|a: &Value| path(a, &["clientItem", "size"]).and_then(scalar_text),
        ],
    );
    let is_drop = item_type
        .map(|t| t.trim().to_ascii_lowercase().ends_with("drop"))
        .unwrap_or(false);

    industry_ok && owner_ok && is_drop
}

/// `Some(true)` when the design carries a carrier comm drop, `None` when the
/// design has no attachment list at all.
pub fn design_comm_drop(design: &Value, carrier: &str) -> Option<bool> {
    let structure = design.get("structure").unwrap_or(design);
    let lists: Vec<&Value> = ATTACHMENT_LISTS
        .iter()
        .filter_map(|key| path(structure, &[*key]))
        .collect();
    if lists.is_empty() {
        return None;
    }
    Some(
        lists
            .into_iter()
            .flat_map(members)
            .any(|attachment| is_carrier_drop(attachment, carrier)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::build_alias_table;
    use serde_json::json;

    fn run(loc: Value, aliases: &AliasTable) -> CanonicalRecord {
        let config = ReconConfig::default();
        let ctx = DesignContext { aliases, config: &config };
        normalize_design(0, &Arc::new(loc), &ctx)
    }

    fn drop_wire(owner: &str, kind: &str) -> Value {
        json!({
            "owner": {"industry": "COMMUNICATION", "id": owner},
            "clientItem": {"type": kind},
        })
    }

    #[test]
    fn label_prefix() {
        assert_eq!(strip_label_prefix("12-PL410"), "PL410");
        assert_eq!(strip_label_prefix(" 7 "), "7");
        assert_eq!(strip_label_prefix("A-7"), "A-7");
        assert_eq!(strip_label_prefix("-7"), "-7");
    }

    #[test]
    fn identifiers() {
        let rec = run(json!({"id": "Pole-3", "externalId": "0042", "label": "3-PL1187"}), &AliasTable::default());
        assert_eq!(rec.scid.as_deref(), Some("0042"));
        assert_eq!(rec.pole_number.as_deref(), Some("1187"));
        assert_eq!(rec.key.as_deref(), Some("Pole-3"));

        let rec = run(json!({"label": "7", "poleNumber": "PN-009"}), &AliasTable::default());
        assert_eq!(rec.scid.as_deref(), Some("7"));
        assert_eq!(rec.pole_number.as_deref(), Some("9"));
    }

    #[test]
    fn coordinate_fallbacks() {
        let rec = run(
            json!({"designs": [{"structure": {"latitude": 30.1, "longitude": -95.1}}]}),
            &AliasTable::default(),
        );
        assert_eq!(rec.coordinate, Some(Coordinate::new(30.1, -95.1)));

        let rec = run(
            json!({"measuredDesign": {"mapLocation": {"coordinates": [-95.2, 30.2]}}}),
            &AliasTable::default(),
        );
        assert_eq!(rec.coordinate, Some(Coordinate::new(30.2, -95.2)));

        let rec = run(json!({}), &AliasTable::default());
        assert_eq!(rec.coordinate, None);
    }

    #[test]
    fn spec_from_client_item() {
        let loc = json!({"designs": [{
            "layerType": "Measured",
            "structure": {"pole": {"clientItem": {
                "height": {"unit": "METRE", "value": 13.716},
                "classOfPole": "3",
                "species": "Southern Pine",
            }}},
        }]});
        let rec = run(loc, &AliasTable::default());
        assert_eq!(rec.spec.as_deref(), Some("45-3 SOUTHERN PINE"));
    }

    #[test]
    fn spec_alias_beats_client_item() {
        let aliases = build_alias_table(
            &[json!({"aliases": ["40-4"], "height": 40, "classOfPole": "4", "species": "DF"})],
            &Default::default(),
        );
        let loc = json!({"designs": [{
            "layerType": "Measured",
            "structure": {"pole": {
                "clientItemAlias": "40-4",
                "clientItem": {"height": 45, "classOfPole": "2"},
            }},
        }]});
        let rec = run(loc, &aliases);
        assert_eq!(rec.spec.as_deref(), Some("40-4 DF"));
    }

    #[test]
    fn measured_spec_preferred() {
        let loc = json!({"designs": [
            {"layerType": "Recommended", "structure": {"pole": {"clientItem": {"height": 50, "classOfPole": "2"}}}},
            {"layerType": "Measured", "structure": {"pole": {"clientItem": {"height": 45, "classOfPole": "3"}}}},
        ]});
        let rec = run(loc, &AliasTable::default());
        assert_eq!(rec.spec.as_deref(), Some("45-3"));
    }

    #[test]
    fn load_percentages() {
        let loc = json!({"designs": [
            {"layerType": "Measured", "analysis": [
                {"id": "NESC", "results": [
                    {"component": "Anchor", "actual": 10.0},
                    {"component": "Pole", "actual": 61.2},
                ]},
            ]},
            {"label": "Recommended Design", "analysis": {"results": [
                {"component": "POLE", "actual": "78.5%"},
            ]}},
        ]});
        let rec = run(loc, &AliasTable::default());
        assert_eq!(rec.existing_percent, Some(61.2));
        assert_eq!(rec.final_percent, Some(78.5));
    }

    #[test]
    fn comm_drop_states() {
        let with_drop = json!({"recommendedDesign": {"structure": {
            "wires": [drop_wire("Charter", "CATV Service Drop")],
        }}});
        assert_eq!(run(with_drop, &AliasTable::default()).comm_drop, Some(true));

        let other_carrier = json!({"recommendedDesign": {"structure": {
            "wires": [drop_wire("Comcast", "CATV Service Drop")],
        }}});
        assert_eq!(run(other_carrier, &AliasTable::default()).comm_drop, Some(false));

        let not_drop = json!({"recommendedDesign": {"structure": {
            "wires": [drop_wire("Charter", "Fiber Mainline")],
        }}});
        assert_eq!(run(not_drop, &AliasTable::default()).comm_drop, Some(false));

        let empty = json!({"recommendedDesign": {"structure": {"wires": []}}});
        assert_eq!(run(empty, &AliasTable::default()).comm_drop, Some(false));

        let no_list = json!({"recommendedDesign": {"structure": {}}});
        assert_eq!(run(no_list, &AliasTable::default()).comm_drop, None);

        assert_eq!(run(json!({}), &AliasTable::default()).comm_drop, None);
    }

    #[test]
    fn garbage_degrades_to_none() {
        let rec = run(json!(["not", "a", "location"]), &AliasTable::default());
        assert_eq!(rec.scid, None);
        assert_eq!(rec.spec, None);
        assert_eq!(rec.existing_percent, None);
        assert_eq!(rec.comm_drop, None);
    }
}
