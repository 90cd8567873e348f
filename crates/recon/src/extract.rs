//! Tolerant readers over raw JSON records.
//!
//! Both source formats store the same fact in several places and shapes.
//! Readers here return `None` for anything absent or unusable, and
//! [`first_of`] tries an ordered list of them.

use serde_json::Value;

use crate::model::Coordinate;
use crate::normalize::normalize_number;

/// Preferred keys when an attribute value is an object of scalars.
const PREFERRED_VALUE_KEYS: [&str; 4] = ["-Imported", "auto_button", "value", "button_added"];

/// Maximum nesting followed when unwrapping attribute values.
const MAX_UNWRAP_DEPTH: usize = 3;

pub type Extractor<'a, I, T> = &'a dyn Fn(&I) -> Option<T>;

/// Runs `extractors` in order and returns the first `Some`.
pub fn first_of<I: ?Sized, T>(input: &I, extractors: &[Extractor<'_, I, T>]) -> Option<T> {
    extractors.iter().find_map(|extract| extract(input))
}

/// Follows object keys, treating `null` as absent.
pub fn path<'v>(value: &'v Value, keys: &[&str]) -> Option<&'v Value> {
    keys.iter()
        .try_fold(value, |current, key| current.get(key))
        .filter(|v| !v.is_null())
}

/// `node.attributes.<name>`.
pub fn attribute<'v>(node: &'v Value, name: &str) -> Option<&'v Value> {
    path(node, &["attributes", name])
}

/// Array elements or object values, in document order; empty otherwise.
pub fn members(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => map.values().collect(),
        _ => Vec::new(),
    }
}

fn is_usable_scalar(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.trim().is_empty(),
        Value::Number(_) | Value::Bool(_) => true,
        _ => false,
    }
}

/// First usable scalar inside an attribute value.
///
/// Accepts a bare scalar, an object keyed by entry id (preferring the
/// well-known keys), or an array.
pub fn unwrap_scalar(value: &Value) -> Option<&Value> {
    unwrap_at_depth(value, 0)
}

fn unwrap_at_depth(value: &Value, depth: usize) -> Option<&Value> {
    if is_usable_scalar(value) {
        return Some(value);
    }
    if depth >= MAX_UNWRAP_DEPTH {
        return None;
    }
    match value {
        Value::Object(map) => PREFERRED_VALUE_KEYS
            .iter()
            .filter_map(|k| map.get(*k))
            .chain(map.values())
            .find_map(|v| unwrap_at_depth(v, depth + 1)),
        Value::Array(items) => items.iter().find_map(|v| unwrap_at_depth(v, depth + 1)),
        _ => None,
    }
}

/// Scalar rendered as text. Strings are returned untrimmed.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `attributes.<name>` unwrapped to a scalar.
pub fn attribute_scalar<'v>(node: &'v Value, name: &str) -> Option<&'v Value> {
    attribute(node, name).and_then(unwrap_scalar)
}

/// `attributes.<name>.<entry>.<field>` for the first entry that has it.
pub fn attribute_entry_field<'v>(node: &'v Value, name: &str, field: &str) -> Option<&'v Value> {
    let attr = attribute(node, name)?;
    members(attr)
        .into_iter()
        .find_map(|entry| entry.get(field).and_then(unwrap_scalar))
}

/// Boolean from `true`/`false`, `"true"`/`"false"`, `"yes"`/`"no"`, or 1/0.
pub fn truthy(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Case-insensitive text comparison of a scalar against `expected`.
pub fn scalar_eq(value: &Value, expected: &str) -> bool {
    scalar_text(value)
        .map(|s| s.trim().eq_ignore_ascii_case(expected.trim()))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

/// GeoJSON Point (`coordinates: [lon, lat]`) or a `{lat, lon}` object.
pub fn point(value: &Value) -> Option<Coordinate> {
    if let Some(coords) = value.get("coordinates").and_then(Value::as_array) {
        let lon = coords.first().and_then(normalize_number)?;
        let lat = coords.get(1).and_then(normalize_number)?;
        return Coordinate::checked(lat, lon);
    }
    lat_lon(value)
}

/// Flat `latitude`/`longitude` or `lat`/`lon` fields.
pub fn lat_lon(value: &Value) -> Option<Coordinate> {
    let read = |keys: [&str; 2]| {
        let lat = value.get(keys[0]).and_then(normalize_number)?;
        let lon = value.get(keys[1]).and_then(normalize_number)?;
        Coordinate::checked(lat, lon)
    };
    read(["latitude", "longitude"]).or_else(|| read(["lat", "lon"]))
}

/// Coordinate fields of one design-source object, in priority order.
pub fn located(value: &Value) -> Option<Coordinate> {
    first_of(
        value,
        &[
            &|v: &Value| v.get("geographicCoordinate").and_then(point),
            &|v: &Value| v.get("mapLocation").and_then(point),
            &lat_lon,
        ],
    )
}
