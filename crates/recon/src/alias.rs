use std::collections::HashMap;

use serde_json::Value;

use crate::config::UnitHeuristic;
use crate::extract::{first_of, members, path, scalar_text};
use crate::spec::compose_spec;

/// Pole-type alias (or definition id) to canonical spec string.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: HashMap<String, String>,
}

impl AliasTable {
    pub fn get(&self, alias: &str) -> Option<&str> {
        self.entries.get(alias.trim()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First writer wins.
    fn insert(&mut self, alias: String, spec: &str) {
        self.entries.entry(alias).or_insert_with(|| spec.to_string());
    }
}

fn alias_id(alias: &Value) -> Option<String> {
    first_of(
        alias,
        &[&scalar_text, &|a: &Value| path(a, &["id"]).and_then(scalar_text)],
    )
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
}

/// Canonical spec of one pole-type definition.
pub fn definition_spec(definition: &Value, units: &UnitHeuristic) -> Option<String> {
    let class = definition
        .get("classOfPole")
        .or_else(|| definition.get("class"));
    compose_spec(definition.get("height"), class, definition.get("species"), units)
}

/// Build the alias table from pole-type definitions.
///
/// Definitions without aliases are keyed by their own `id`. Definitions
/// whose spec cannot be composed contribute nothing.
pub fn build_alias_table(definitions: &[Value], units: &UnitHeuristic) -> AliasTable {
    let mut table = AliasTable::default();

    for definition in definitions {
        let Some(spec) = definition_spec(definition, units) else {
            continue;
        };

        let aliases: Vec<String> = definition
            .get("aliases")
            .map(members)
            .unwrap_or_default()
            .into_iter()
            .filter_map(alias_id)
            .collect();

        if aliases.is_empty() {
            if let Some(id) = definition.get("id").and_then(alias_id) {
                table.insert(id, &spec);
            }
        } else {
            for alias in aliases {
                table.insert(alias, &spec);
            }
        }
    }

    log::debug!("alias table: {} entries from {} definitions", table.len(), definitions.len());
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn units() -> UnitHeuristic {
        UnitHeuristic::default()
    }

    #[test]
    fn aliases_map_to_spec() {
        let defs = vec![json!({
            "id": "pole-40-4",
            "aliases": [{"id": "40-4 SP"}, "40/4"],
            "height": {"unit": "METRE", "value": 12.192},
            "classOfPole": "4",
            "species": "Southern Pine",
        })];
        let table = build_alias_table(&defs, &units());
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("40-4 SP"), Some("40-4 SOUTHERN PINE"));
        assert_eq!(table.get(" 40/4 "), Some("40-4 SOUTHERN PINE"));
        assert_eq!(table.get("pole-40-4"), None);
    }

    #[test]
    fn id_used_without_aliases() {
        let defs = vec![json!({"id": "P45", "height": 45, "classOfPole": "3"})];
        let table = build_alias_table(&defs, &units());
        assert_eq!(table.get("P45"), Some("45-3"));
    }

    #[test]
    fn first_writer_wins() {
        let defs = vec![
            json!({"aliases": ["A"], "height": 40, "classOfPole": "4"}),
            json!({"aliases": ["A"], "height": 45, "classOfPole": "2"}),
        ];
        let table = build_alias_table(&defs, &units());
        assert_eq!(table.get("A"), Some("40-4"));
    }

    #[test]
    fn unusable_definitions_skipped() {
        let defs = vec![json!({"aliases": ["X"]}), json!("not an object"), json!({"height": "tall"})];
        let table = build_alias_table(&defs, &units());
        assert!(table.is_empty());
    }
}
