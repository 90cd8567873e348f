use std::collections::BTreeMap;

use crate::model::{MatchStatistics, MatchTier, MatchedEntity};

pub const NO_DESIGN_RECORDS: &str = "N/A";

/// Summary statistics over one matching run.
pub fn compute_statistics(
    design_total: usize,
    field_total: usize,
    entities: &[MatchedEntity],
) -> MatchStatistics {
    let mut tier_counts: BTreeMap<String, usize> =
        MatchTier::ALL.iter().map(|t| (t.key().to_string(), 0)).collect();
    let mut mismatched_pairs = 0;

    for entity in entities {
        *tier_counts.entry(entity.tier.key().to_string()).or_insert(0) += 1;
        if entity.is_paired() && entity.flags.any() {
            mismatched_pairs += 1;
        }
    }

    let count = |tier: MatchTier| tier_counts.get(tier.key()).copied().unwrap_or(0);
    let total_matches: usize = MatchTier::ALL
        .iter()
        .filter(|t| t.is_match())
        .map(|t| count(*t))
        .sum();

    MatchStatistics {
        design_total,
        field_total,
        scid_matches: count(MatchTier::ScidExact),
        pole_number_matches: count(MatchTier::PoleNumber),
        coordinate_direct: count(MatchTier::CoordinateDirect),
        coordinate_spec_verified: count(MatchTier::CoordinateSpecVerified),
        unmatched_field: count(MatchTier::UnmatchedField),
        unmatched_design: count(MatchTier::UnmatchedDesign),
        total_matches,
        mismatched_pairs,
        success_rate: success_rate(total_matches, design_total),
        tier_counts,
    }
}

/// `matches / design_total` as a one-decimal percentage.
pub fn success_rate(matches: usize, design_total: usize) -> String {
    if design_total == 0 {
        return NO_DESIGN_RECORDS.to_string();
    }
    format!("{:.1}%", matches as f64 * 100.0 / design_total as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CanonicalRecord, DesignMirror, EntityId, MismatchFlags, Source};
    use serde_json::Value;
    use std::sync::Arc;

    fn entity(tier: MatchTier, flagged: bool) -> MatchedEntity {
        let record = |source| CanonicalRecord::empty(0, source, Arc::new(Value::Null));
        MatchedEntity {
            id: EntityId(1),
            tier,
            design: (tier != MatchTier::UnmatchedField).then(|| record(Source::Design)),
            field: (tier != MatchTier::UnmatchedDesign).then(|| record(Source::Field)),
            mirror: DesignMirror::default(),
            flags: MismatchFlags {
                spec: flagged,
                ..Default::default()
            },
            coordinate: None,
            edited: false,
            distance_m: None,
        }
    }

    #[test]
    fn counts_per_tier() {
        let entities = vec![
            entity(MatchTier::ScidExact, false),
            entity(MatchTier::ScidExact, true),
            entity(MatchTier::PoleNumber, false),
            entity(MatchTier::CoordinateSpecVerified, true),
            entity(MatchTier::UnmatchedField, false),
            entity(MatchTier::UnmatchedDesign, false),
        ];
        let stats = compute_statistics(5, 5, &entities);
        assert_eq!(stats.scid_matches, 2);
        assert_eq!(stats.pole_number_matches, 1);
        assert_eq!(stats.coordinate_direct, 0);
        assert_eq!(stats.coordinate_spec_verified, 1);
        assert_eq!(stats.total_matches, 4);
        assert_eq!(stats.unmatched_field, 1);
        assert_eq!(stats.unmatched_design, 1);
        assert_eq!(stats.mismatched_pairs, 2);
        assert_eq!(stats.success_rate, "80.0%");
        assert_eq!(stats.tier_counts.len(), 6);
        assert_eq!(stats.tier_counts["coordinate_direct"], 0);
    }

    #[test]
    fn empty_run_uses_sentinel() {
        let stats = compute_statistics(0, 0, &[]);
        assert_eq!(stats.total_matches, 0);
        assert_eq!(stats.mismatched_pairs, 0);
        assert_eq!(stats.success_rate, NO_DESIGN_RECORDS);
        assert!(stats.tier_counts.values().all(|&n| n == 0));
    }

    #[test]
    fn rate_rounding() {
        assert_eq!(success_rate(1, 3), "33.3%");
        assert_eq!(success_rate(2, 3), "66.7%");
        assert_eq!(success_rate(0, 4), "0.0%");
    }
}
