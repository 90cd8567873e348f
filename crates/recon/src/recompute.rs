use crate::config::{ReconConfig, SpecTolerance};
use crate::error::ReconError;
use crate::model::{CanonicalRecord, DesignMirror, MatchedEntity, MismatchFlags};
use crate::spec::{normalize_spec, specs_match};

/// A user edit to one design-side value of an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum EditableField {
    Spec(Option<String>),
    ExistingPercent(Option<f64>),
    FinalPercent(Option<f64>),
    CommDrop(Option<bool>),
}

/// A present non-zero value against an absent one is a mismatch.
pub fn percent_mismatch(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => x != y,
        (Some(v), None) | (None, Some(v)) => v != 0.0,
        (None, None) => false,
    }
}

/// Unknown on exactly one side counts as a mismatch.
pub fn comm_drop_mismatch(a: Option<bool>, b: Option<bool>) -> bool {
    a != b
}

/// Value flags (everything except the identifiers) of a mirror against
/// the field record it was paired with.
pub fn compare_values(
    mirror: &DesignMirror,
    field: &CanonicalRecord,
    tolerance: &SpecTolerance,
) -> MismatchFlags {
    MismatchFlags {
        scid: false,
        pole_number: false,
        spec: !specs_match(mirror.spec.as_deref(), field.spec.as_deref(), tolerance),
        existing_percent: percent_mismatch(mirror.existing_percent, field.existing_percent),
        final_percent: percent_mismatch(mirror.final_percent, field.final_percent),
        comm_drop: comm_drop_mismatch(mirror.comm_drop, field.comm_drop),
    }
}

/// Recompute the flags of `entity` from its current mirror.
///
/// Identifier flags are kept as matched. A design-only orphan has nothing
/// to disagree with and gets all-false flags.
pub fn recompute_mismatches(
    entity: &MatchedEntity,
    config: &ReconConfig,
) -> Result<MismatchFlags, ReconError> {
    let Some(field) = entity.field.as_ref() else {
        return Err(ReconError::NotPaired { entity: entity.id });
    };
    if entity.design.is_none() {
        return Ok(MismatchFlags::default());
    }

    let values = compare_values(&entity.mirror, field, &config.spec);
    Ok(MismatchFlags {
        scid: entity.flags.scid,
        pole_number: entity.flags.pole_number,
        ..values
    })
}

/// Apply `edit` to the entity's mirror and refresh its flags.
///
/// The design record itself is left untouched. Orphans accept the edit
/// without any flag change.
pub fn apply_edit(
    entity: &mut MatchedEntity,
    edit: EditableField,
    config: &ReconConfig,
) -> Result<(), ReconError> {
    match edit {
        EditableField::Spec(spec) => {
            entity.mirror.spec = spec.as_deref().and_then(normalize_spec);
        }
        EditableField::ExistingPercent(v) => entity.mirror.existing_percent = v.filter(|x| x.is_finite()),
        EditableField::FinalPercent(v) => entity.mirror.final_percent = v.filter(|x| x.is_finite()),
        EditableField::CommDrop(v) => entity.mirror.comm_drop = v,
    }
    entity.edited = true;

    if entity.is_paired() {
        entity.flags = recompute_mismatches(entity, config)?;
        log::trace!("entity {} edited, flags now {:?}", entity.id, entity.flags);
    }
    Ok(())
}
