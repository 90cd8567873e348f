//! Primitive normalizers: raw JSON scalars to canonical identifiers, counts,
//! percentages and heights in feet.
//!
//! Every function here is total: input that cannot be interpreted yields
//! `None`, never an error.

use serde_json::Value;

use crate::config::UnitHeuristic;

pub const METERS_PER_FOOT: f64 = 0.3048;

/// Trimmed value if it is a non-empty run of ASCII digits.
pub fn normalize_identifier_str(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        Some(trimmed.to_string())
    } else {
        None
    }
}

/// Identifier-A normalization. Non-negative JSON integers are accepted as-is.
pub fn normalize_identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => normalize_identifier_str(s),
        Value::Number(n) => n.as_u64().map(|n| n.to_string()),
        _ => None,
    }
}

/// Keeps only the digits and drops leading zeros (`"PL-0042"` -> `"42"`).
pub fn normalize_count_str(text: &str) -> Option<String> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let trimmed = digits.trim_start_matches('0');
    Some(if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() })
}

pub fn normalize_count(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => normalize_count_str(s),
        Value::Number(n) => normalize_count_str(&n.to_string()),
        _ => None,
    }
}

/// Parses `"42.5"`, `"42.5 %"`, `"1,234"` or `42.5`. Commas are thousands
/// separators.
pub fn normalize_number_str(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    let digits: String = trimmed.chars().filter(|c| *c != ',').collect();
    digits.parse::<f64>().ok().filter(|n| n.is_finite())
}

pub fn normalize_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|n| n.is_finite()),
        Value::String(s) => normalize_number_str(s),
        _ => None,
    }
}

fn meters_to_feet(meters: f64) -> f64 {
    (meters / METERS_PER_FOOT).round()
}

/// Height in whole feet from a `{unit, value}` object, a bare number, or a
/// string such as `"12.2m"`, `"40'"`, `"40 ft"` or `"40"`.
pub fn to_feet(raw: &Value, units: &UnitHeuristic) -> Option<f64> {
    let feet = match raw {
        Value::Object(obj) => {
            let value = obj.get("value").and_then(normalize_number)?;
            let is_meters = obj
                .get("unit")
                .and_then(Value::as_str)
                .map(|u| u.trim().to_ascii_lowercase().starts_with('m'))
                .unwrap_or(false);
            if is_meters {
                meters_to_feet(value)
            } else {
                value.round()
            }
        }
        Value::Number(n) => bare_height(n.as_f64()?, units),
        Value::String(s) => return to_feet_str(s, units),
        _ => return None,
    };
    feet.is_finite().then_some(feet)
}

pub fn to_feet_str(text: &str, units: &UnitHeuristic) -> Option<f64> {
    let lower = text.trim().to_ascii_lowercase();
    if lower.is_empty() {
        return None;
    }

    let feet = if let Some(rest) = strip_any_suffix(&lower, &["feet", "ft", "'"]) {
        rest.trim().parse::<f64>().ok()?.round()
    } else if let Some(rest) = strip_any_suffix(&lower, &["meters", "metres", "meter", "metre", "m"]) {
        meters_to_feet(rest.trim().parse::<f64>().ok()?)
    } else {
        let value = lower.parse::<f64>().ok()?;
        if lower.contains('.') {
            meters_to_feet(value)
        } else {
            bare_height(value, units)
        }
    };
    feet.is_finite().then_some(feet)
}

/// Heights with the default meters-vs-feet range.
pub fn to_feet_default(raw: &Value) -> Option<f64> {
    to_feet(raw, &UnitHeuristic::default())
}

fn bare_height(value: f64, units: &UnitHeuristic) -> f64 {
    if units.looks_like_meters(value) {
        meters_to_feet(value)
    } else {
        value.round()
    }
}

fn strip_any_suffix<'a>(text: &'a str, suffixes: &[&str]) -> Option<&'a str> {
    suffixes.iter().find_map(|s| text.strip_suffix(s))
}
