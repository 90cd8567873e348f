use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One node of the field-survey document, keyed the way the document keys it.
#[derive(Debug, Clone)]
pub struct FieldNode {
    pub key: String,
    pub value: Arc<Value>,
}

/// A span between two field nodes, with the ids of its sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub node_a: String,
    pub node_b: String,
    pub section_ids: Vec<String>,
}

impl Connection {
    pub fn joins(&self, a: &str, b: &str) -> bool {
        (self.node_a == a && self.node_b == b) || (self.node_a == b && self.node_b == a)
    }
}

/// Design-source records plus the pole-type definitions used for alias lookup.
#[derive(Debug, Clone, Default)]
pub struct DesignInput {
    pub locations: Vec<Arc<Value>>,
    pub pole_types: Vec<Value>,
}

/// Every field node (poles and service locations alike) and the span graph.
///
/// `connections` is `None` when the document carries no span data at all,
/// which makes comm-drop detection undecidable rather than negative.
#[derive(Debug, Clone, Default)]
pub struct FieldInput {
    pub nodes: Vec<FieldNode>,
    pub connections: Option<Vec<Connection>>,
}

/// Pre-loaded records for both sources.
#[derive(Debug, Clone, Default)]
pub struct ReconInput {
    pub design: DesignInput,
    pub field: FieldInput,
}

// ---------------------------------------------------------------------------
// Canonical records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Rejects NaN/infinite and out-of-range values.
    pub fn checked(lat: f64, lon: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lon.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lon);
        valid.then_some(Self { lat, lon })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Design,
    Field,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Design => write!(f, "design"),
            Self::Field => write!(f, "field"),
        }
    }
}

/// Source-agnostic view of one pole record. Never mutated after normalization.
#[derive(Debug, Clone, Serialize)]
pub struct CanonicalRecord {
    /// Position in its source's record list.
    pub index: usize,
    pub source: Source,
    /// Location id or node key, for display.
    pub key: Option<String>,
    /// Digits only.
    pub scid: Option<String>,
    /// Digits only, leading zeros removed.
    pub pole_number: Option<String>,
    pub coordinate: Option<Coordinate>,
    pub spec: Option<String>,
    pub existing_percent: Option<f64>,
    pub final_percent: Option<f64>,
    pub comm_drop: Option<bool>,
    #[serde(skip)]
    pub raw: Arc<Value>,
}

impl CanonicalRecord {
    pub fn empty(index: usize, source: Source, raw: Arc<Value>) -> Self {
        Self {
            index,
            source,
            key: None,
            scid: None,
            pole_number: None,
            coordinate: None,
            spec: None,
            existing_percent: None,
            final_percent: None,
            comm_drop: None,
            raw,
        }
    }
}

// ---------------------------------------------------------------------------
// Matching output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out entity ids for a single matching run, starting at 1.
#[derive(Debug, Default)]
pub struct EntitySequence {
    issued: u32,
}

impl EntitySequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> EntityId {
        self.issued += 1;
        EntityId(self.issued)
    }

    pub fn issued(&self) -> u32 {
        self.issued
    }
}

/// Confidence tier, declared in output priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    ScidExact,
    PoleNumber,
    CoordinateDirect,
    CoordinateSpecVerified,
    UnmatchedField,
    UnmatchedDesign,
}

impl MatchTier {
    pub const ALL: [MatchTier; 6] = [
        Self::ScidExact,
        Self::PoleNumber,
        Self::CoordinateDirect,
        Self::CoordinateSpecVerified,
        Self::UnmatchedField,
        Self::UnmatchedDesign,
    ];

    pub fn is_match(self) -> bool {
        !matches!(self, Self::UnmatchedField | Self::UnmatchedDesign)
    }

    pub fn is_coordinate(self) -> bool {
        matches!(self, Self::CoordinateDirect | Self::CoordinateSpecVerified)
    }

    /// snake_case key used in statistics maps.
    pub fn key(self) -> &'static str {
        match self {
            Self::ScidExact => "scid_exact",
            Self::PoleNumber => "pole_number",
            Self::CoordinateDirect => "coordinate_direct",
            Self::CoordinateSpecVerified => "coordinate_spec_verified",
            Self::UnmatchedField => "unmatched_field",
            Self::UnmatchedDesign => "unmatched_design",
        }
    }
}

impl std::fmt::Display for MatchTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ScidExact => write!(f, "SCID Exact Match"),
            Self::PoleNumber => write!(f, "Pole Number Match"),
            Self::CoordinateDirect => write!(f, "Coordinate Direct Match"),
            Self::CoordinateSpecVerified => write!(f, "Coordinate+Specification Verified"),
            Self::UnmatchedField => write!(f, "Unmatched Field"),
            Self::UnmatchedDesign => write!(f, "Unmatched Design"),
        }
    }
}

/// One flag per compared field; `true` means the two sides disagree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MismatchFlags {
    pub scid: bool,
    pub pole_number: bool,
    pub spec: bool,
    pub existing_percent: bool,
    pub final_percent: bool,
    pub comm_drop: bool,
}

impl MismatchFlags {
    pub fn any(&self) -> bool {
        self.scid
            || self.pole_number
            || self.spec
            || self.existing_percent
            || self.final_percent
            || self.comm_drop
    }
}

/// User-editable copy of the design-side values of an entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DesignMirror {
    pub spec: Option<String>,
    pub existing_percent: Option<f64>,
    pub final_percent: Option<f64>,
    pub comm_drop: Option<bool>,
}

impl DesignMirror {
    pub fn from_record(record: &CanonicalRecord) -> Self {
        Self {
            spec: record.spec.clone(),
            existing_percent: record.existing_percent,
            final_percent: record.final_percent,
            comm_drop: record.comm_drop,
        }
    }
}

/// Reconciliation result for one pairing or one orphan.
#[derive(Debug, Clone, Serialize)]
pub struct MatchedEntity {
    pub id: EntityId,
    pub tier: MatchTier,
    pub design: Option<CanonicalRecord>,
    pub field: Option<CanonicalRecord>,
    pub mirror: DesignMirror,
    pub flags: MismatchFlags,
    pub coordinate: Option<Coordinate>,
    pub edited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
}

impl MatchedEntity {
    /// Identifier-A shown for the entity: design side first.
    pub fn scid(&self) -> Option<&str> {
        self.design
            .as_ref()
            .and_then(|r| r.scid.as_deref())
            .or_else(|| self.field.as_ref().and_then(|r| r.scid.as_deref()))
    }

    pub fn is_paired(&self) -> bool {
        self.design.is_some() && self.field.is_some()
    }
}

// ---------------------------------------------------------------------------
// Statistics + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct MatchStatistics {
    pub design_total: usize,
    pub field_total: usize,
    pub scid_matches: usize,
    pub pole_number_matches: usize,
    pub coordinate_direct: usize,
    pub coordinate_spec_verified: usize,
    pub unmatched_field: usize,
    pub unmatched_design: usize,
    pub total_matches: usize,
    /// Paired entities carrying at least one mismatch flag.
    pub mismatched_pairs: usize,
    /// `matches / design_total` as `"NN.N%"`, or `"N/A"` with no design records.
    pub success_rate: String,
    pub tier_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub meta: ReconMeta,
    pub statistics: MatchStatistics,
    pub entities: Vec<MatchedEntity>,
}
