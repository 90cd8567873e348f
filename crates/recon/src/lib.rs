//! `polematch-recon`: utility-pole design/field reconciliation engine.
//!
//! Pure engine crate: receives pre-loaded JSON documents, returns matched
//! entities and statistics. No CLI or file IO dependencies.

pub mod alias;
pub mod config;
pub mod design;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod extract;
pub mod field;
pub mod geo;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod recompute;
pub mod spec;

pub use config::ReconConfig;
pub use engine::{load_document, normalize_inputs, run};
pub use error::ReconError;
pub use model::{
    CanonicalRecord, DesignInput, EntityId, FieldInput, MatchStatistics, MatchTier, MatchedEntity,
    MismatchFlags, ReconInput, ReconResult,
};
pub use recompute::{apply_edit, recompute_mismatches, EditableField};
