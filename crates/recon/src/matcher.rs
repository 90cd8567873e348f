//! Multi-pass greedy pairing of design and field records.
//!
//! Passes run in fixed order (scid, pole number, coordinate) and each
//! considers only records neither side has claimed yet. A pairing claims
//! both records immediately; there is no backtracking.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::config::ReconConfig;
use crate::geo::haversine_m;
use crate::model::{
    CanonicalRecord, DesignMirror, EntityId, EntitySequence, MatchTier, MatchedEntity, MismatchFlags,
};
use crate::recompute::compare_values;
use crate::spec::specs_match;

/// Which records each side has already given away.
struct Claims {
    design: Vec<bool>,
    field: Vec<bool>,
}

impl Claims {
    fn new(design: usize, field: usize) -> Self {
        Self {
            design: vec![false; design],
            field: vec![false; field],
        }
    }

    fn claim(&mut self, d: usize, f: usize) {
        self.design[d] = true;
        self.field[f] = true;
    }
}

/// Pair `design` against `field` and return every entity, sorted by tier
/// then numeric scid. Each record appears in exactly one entity.
pub fn match_records(
    design: &[CanonicalRecord],
    field: &[CanonicalRecord],
    config: &ReconConfig,
) -> Vec<MatchedEntity> {
    let mut claims = Claims::new(design.len(), field.len());
    let mut ids = EntitySequence::new();
    let mut entities = Vec::new();

    let scid = identifier_pass(
        MatchTier::ScidExact,
        |r| r.scid.as_deref(),
        design,
        field,
        &mut claims,
        &mut ids,
        config,
        &mut entities,
    );
    log::debug!("scid pass: {scid} pairs");

    let pole_number = identifier_pass(
        MatchTier::PoleNumber,
        |r| r.pole_number.as_deref(),
        design,
        field,
        &mut claims,
        &mut ids,
        config,
        &mut entities,
    );
    log::debug!("pole number pass: {pole_number} pairs");

    let coordinate = coordinate_pass(design, field, &mut claims, &mut ids, config, &mut entities);
    log::debug!("coordinate pass: {coordinate} pairs");

    let mut orphans = 0;
    for (f, record) in field.iter().enumerate().filter(|(f, _)| !claims.field[*f]) {
        log::trace!("field record {f} unmatched");
        entities.push(orphan(ids.next_id(), MatchTier::UnmatchedField, record));
        orphans += 1;
    }
    for (d, record) in design.iter().enumerate().filter(|(d, _)| !claims.design[*d]) {
        log::trace!("design record {d} unmatched");
        entities.push(orphan(ids.next_id(), MatchTier::UnmatchedDesign, record));
        orphans += 1;
    }
    log::debug!("orphans: {orphans}; {} entities issued", ids.issued());

    entities.sort_by(|a, b| a.tier.cmp(&b.tier).then_with(|| scid_order(a.scid(), b.scid())));
    entities
}

/// Exact-key pass: the first unclaimed field record with an equal key
/// wins, in field order.
#[allow(clippy::too_many_arguments)]
fn identifier_pass<'r>(
    tier: MatchTier,
    key: impl Fn(&'r CanonicalRecord) -> Option<&'r str>,
    design: &'r [CanonicalRecord],
    field: &'r [CanonicalRecord],
    claims: &mut Claims,
    ids: &mut EntitySequence,
    config: &ReconConfig,
    out: &mut Vec<MatchedEntity>,
) -> usize {
    let mut by_key: HashMap<&str, Vec<usize>> = HashMap::new();
    for (f, record) in field.iter().enumerate() {
        if let Some(k) = key(record) {
            by_key.entry(k).or_default().push(f);
        }
    }

    let mut pairs = 0;
    for (d, record) in design.iter().enumerate() {
        if claims.design[d] {
            continue;
        }
        let Some(k) = key(record) else { continue };
        let Some(&f) = by_key
            .get(k)
            .and_then(|candidates| candidates.iter().find(|&&f| !claims.field[f]))
        else {
            continue;
        };

        claims.claim(d, f);
        log::trace!("{tier}: design {d} <-> field {f} on {k}");
        out.push(paired(ids.next_id(), tier, record, &field[f], None, config));
        pairs += 1;
    }
    pairs
}

/// Nearest-neighbour pass. Only the nearest unclaimed candidate is
/// considered; between the two thresholds it needs agreeing specs.
fn coordinate_pass(
    design: &[CanonicalRecord],
    field: &[CanonicalRecord],
    claims: &mut Claims,
    ids: &mut EntitySequence,
    config: &ReconConfig,
    out: &mut Vec<MatchedEntity>,
) -> usize {
    let thresholds = &config.thresholds;
    let mut pairs = 0;

    for (d, record) in design.iter().enumerate() {
        if claims.design[d] {
            continue;
        }
        let Some(origin) = record.coordinate else { continue };

        let mut best: Option<(usize, f64)> = None;
        for (f, candidate) in field.iter().enumerate() {
            if claims.field[f] {
                continue;
            }
            let Some(target) = candidate.coordinate else { continue };
            let distance = haversine_m(&origin, &target);
            if best.map_or(true, |(_, nearest)| distance < nearest) {
                best = Some((f, distance));
            }
        }

        let Some((f, distance)) = best else { continue };
        if distance > thresholds.verified_m {
            continue;
        }

        let verified = specs_match(record.spec.as_deref(), field[f].spec.as_deref(), &config.spec);
        let tier = match (distance < thresholds.direct_m, verified) {
            (_, true) => MatchTier::CoordinateSpecVerified,
            (true, false) => MatchTier::CoordinateDirect,
            (false, false) => {
                log::trace!("design {d} near field {f} ({distance:.2} m) but specs disagree");
                continue;
            }
        };

        claims.claim(d, f);
        log::trace!("{tier}: design {d} <-> field {f} at {distance:.2} m");
        out.push(paired(ids.next_id(), tier, record, &field[f], Some(distance), config));
        pairs += 1;
    }
    pairs
}

/// `distance_m` is the pairing distance, set only by the coordinate pass.
fn paired(
    id: EntityId,
    tier: MatchTier,
    design: &CanonicalRecord,
    field: &CanonicalRecord,
    distance_m: Option<f64>,
    config: &ReconConfig,
) -> MatchedEntity {
    let mirror = DesignMirror::from_record(design);
    let flags = MismatchFlags {
        scid: identifier_mismatch(
            design.scid.as_deref(),
            field.scid.as_deref(),
            tier == MatchTier::ScidExact,
        ),
        pole_number: identifier_mismatch(
            design.pole_number.as_deref(),
            field.pole_number.as_deref(),
            tier == MatchTier::PoleNumber,
        ),
        ..compare_values(&mirror, field, &config.spec)
    };
    MatchedEntity {
        id,
        tier,
        design: Some(design.clone()),
        field: Some(field.clone()),
        mirror,
        flags,
        coordinate: design.coordinate.or(field.coordinate),
        edited: false,
        distance_m,
    }
}

fn orphan(id: EntityId, tier: MatchTier, record: &CanonicalRecord) -> MatchedEntity {
    let is_design = tier == MatchTier::UnmatchedDesign;
    MatchedEntity {
        id,
        tier,
        design: is_design.then(|| record.clone()),
        field: (!is_design).then(|| record.clone()),
        mirror: if is_design {
            DesignMirror::from_record(record)
        } else {
            DesignMirror::default()
        },
        flags: MismatchFlags::default(),
        coordinate: record.coordinate,
        edited: false,
        distance_m: None,
    }
}

/// Identifiers disagree only when both are known and the tier did not
/// already pair on them.
fn identifier_mismatch(design: Option<&str>, field: Option<&str>, is_key: bool) -> bool {
    !is_key && matches!((design, field), (Some(a), Some(b)) if a != b)
}

/// Numeric order over digit strings; entities without a scid go last.
fn scid_order(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => {
            let (a, b) = (a.trim_start_matches('0'), b.trim_start_matches('0'));
            a.len().cmp(&b.len()).then_with(|| a.cmp(b))
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Coordinate, Source};
    use serde_json::Value;
    use std::sync::Arc;

    #[derive(Default)]
    struct Rec<'a> {
        scid: Option<&'a str>,
        pole: Option<&'a str>,
        at: Option<(f64, f64)>,
        spec: Option<&'a str>,
    }

    fn build(index: usize, source: Source, r: Rec<'_>) -> CanonicalRecord {
        let mut rec = CanonicalRecord::empty(index, source, Arc::new(Value::Null));
        rec.scid = r.scid.map(String::from);
        rec.pole_number = r.pole.map(String::from);
        rec.coordinate = r.at.map(|(lat, lon)| Coordinate::new(lat, lon));
        rec.spec = r.spec.map(String::from);
        rec
    }

    fn design(recs: Vec<Rec<'_>>) -> Vec<CanonicalRecord> {
        recs.into_iter().enumerate().map(|(i, r)| build(i, Source::Design, r)).collect()
    }

    fn field(recs: Vec<Rec<'_>>) -> Vec<CanonicalRecord> {
        recs.into_iter().enumerate().map(|(i, r)| build(i, Source::Field, r)).collect()
    }

    fn run(d: &[CanonicalRecord], f: &[CanonicalRecord]) -> Vec<MatchedEntity> {
        match_records(d, f, &ReconConfig::default())
    }

    #[test]
    fn scid_pair_flags_spec_class() {
        let d = design(vec![Rec { scid: Some("7"), spec: Some("45-3 SP"), ..Default::default() }]);
        let f = field(vec![Rec { scid: Some("7"), spec: Some("45-2 SP"), ..Default::default() }]);
        let out = run(&d, &f);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].tier, MatchTier::ScidExact);
        assert!(out[0].flags.spec);
        assert!(!out[0].flags.scid);
        assert_eq!(out[0].id.0, 1);
    }

    #[test]
    fn first_field_record_wins() {
        let d = design(vec![Rec { scid: Some("5"), ..Default::default() }]);
        let f = field(vec![
            Rec { pole: Some("1"), ..Default::default() },
            Rec { scid: Some("5"), pole: Some("10"), ..Default::default() },
            Rec { scid: Some("5"), pole: Some("20"), ..Default::default() },
        ]);
        let out = run(&d, &f);
        let pair = out.iter().find(|e| e.is_paired()).unwrap();
        assert_eq!(pair.field.as_ref().unwrap().index, 1);
        assert_eq!(out.iter().filter(|e| e.tier == MatchTier::UnmatchedField).count(), 2);
    }

    #[test]
    fn pole_number_after_scid() {
        let d = design(vec![
            Rec { scid: Some("1"), pole: Some("100"), ..Default::default() },
            Rec { scid: Some("2"), pole: Some("200"), ..Default::default() },
        ]);
        let f = field(vec![
            Rec { scid: Some("9"), pole: Some("200"), ..Default::default() },
            Rec { scid: Some("1"), pole: Some("300"), ..Default::default() },
        ]);
        let out = run(&d, &f);
        assert_eq!(out[0].tier, MatchTier::ScidExact);
        assert!(out[0].flags.pole_number);
        assert_eq!(out[1].tier, MatchTier::PoleNumber);
        assert!(out[1].flags.scid);
        assert!(!out[1].flags.pole_number);
    }

    #[test]
    fn coordinate_direct_or_verified() {
        let d = design(vec![Rec { at: Some((30.0, -95.0)), spec: Some("40-4"), ..Default::default() }]);
        let f = field(vec![Rec { at: Some((30.0, -95.00001)), spec: Some("45-2"), ..Default::default() }]);
        let out = run(&d, &f);
        assert_eq!(out[0].tier, MatchTier::CoordinateDirect);
        assert!(out[0].distance_m.unwrap() < 1.0);

        let f = field(vec![Rec { at: Some((30.0, -95.00001)), spec: Some("40-4 SP"), ..Default::default() }]);
        let out = run(&d, &f);
        assert_eq!(out[0].tier, MatchTier::CoordinateSpecVerified);
    }

    #[test]
    fn mid_distance_needs_spec_agreement() {
        // ~3.3 m apart.
        let d = design(vec![Rec { at: Some((30.0, -95.0)), spec: Some("40-4"), ..Default::default() }]);
        let f = field(vec![Rec { at: Some((30.00003, -95.0)), spec: Some("45-2"), ..Default::default() }]);
        let out = run(&d, &f);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].tier, MatchTier::UnmatchedField);
        assert_eq!(out[1].tier, MatchTier::UnmatchedDesign);

        let f = field(vec![Rec { at: Some((30.00003, -95.0)), spec: Some("40-4"), ..Default::default() }]);
        let out = run(&d, &f);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].tier, MatchTier::CoordinateSpecVerified);
    }

    #[test]
    fn beyond_verified_bound_unmatched() {
        let d = design(vec![Rec { at: Some((30.0, -95.0)), ..Default::default() }]);
        let f = field(vec![Rec { at: Some((30.001, -95.0)), ..Default::default() }]);
        let out = run(&d, &f);
        assert!(out.iter().all(|e| !e.tier.is_match()));
        assert!(out.iter().all(|e| !e.flags.any()));
    }

    #[test]
    fn scid_beats_coordinate() {
        let d = design(vec![Rec { scid: Some("3"), at: Some((30.0, -95.0)), ..Default::default() }]);
        let f = field(vec![Rec { scid: Some("3"), at: Some((30.0, -95.0)), ..Default::default() }]);
        let out = run(&d, &f);
        assert_eq!(out[0].tier, MatchTier::ScidExact);
        assert_eq!(out[0].distance_m, None);
    }

    #[test]
    fn nearest_candidate_chosen() {
        let d = design(vec![Rec { at: Some((30.0, -95.0)), ..Default::default() }]);
        let f = field(vec![
            Rec { at: Some((30.0, -95.000005)), ..Default::default() },
            Rec { at: Some((30.0, -95.000001)), ..Default::default() },
        ]);
        let out = run(&d, &f);
        let pair = out.iter().find(|e| e.is_paired()).unwrap();
        assert_eq!(pair.field.as_ref().unwrap().index, 1);
    }

    #[test]
    fn orphan_order_and_ids() {
        let d = design(vec![Rec { scid: Some("20"), ..Default::default() }]);
        let f = field(vec![Rec { scid: Some("30"), ..Default::default() }]);
        let out = run(&d, &f);
        assert_eq!(out[0].tier, MatchTier::UnmatchedField);
        assert_eq!(out[0].id.0, 1);
        assert_eq!(out[1].tier, MatchTier::UnmatchedDesign);
        assert_eq!(out[1].id.0, 2);
        assert_eq!(out[1].mirror.spec, None);
    }

    #[test]
    fn sorted_by_numeric_scid_within_tier() {
        let d = design(vec![
            Rec { scid: Some("100"), ..Default::default() },
            Rec { ..Default::default() },
            Rec { scid: Some("9"), ..Default::default() },
            Rec { scid: Some("010"), ..Default::default() },
        ]);
        let out = run(&d, &[]);
        let order: Vec<Option<&str>> = out.iter().map(|e| e.scid()).collect();
        assert_eq!(order, vec![Some("9"), Some("010"), Some("100"), None]);
    }

    #[test]
    fn empty_inputs() {
        assert!(run(&[], &[]).is_empty());
    }

    #[test]
    fn each_record_used_once() {
        let d = design(vec![
            Rec { scid: Some("1"), at: Some((30.0, -95.0)), ..Default::default() },
            Rec { at: Some((30.0, -95.0)), ..Default::default() },
        ]);
        let f = field(vec![Rec { scid: Some("1"), at: Some((30.0, -95.0)), ..Default::default() }]);
        let out = run(&d, &f);
        let field_uses = out.iter().filter(|e| e.field.is_some()).count();
        let design_uses = out.iter().filter(|e| e.design.is_some()).count();
        assert_eq!(field_uses, 1);
        assert_eq!(design_uses, 2);
    }
}
