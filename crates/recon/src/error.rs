use std::fmt;

use crate::model::EntityId;

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (inverted thresholds, empty carrier, etc.).
    ConfigValidation(String),
    /// A source document does not have the shape the loader requires.
    InvalidInput(String),
    /// Mismatch recomputation was asked for an entity with no field-survey side.
    NotPaired { entity: EntityId },
    /// IO error (file read, etc.).
    Io(String),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::NotPaired { entity } => {
                write!(f, "entity {entity} has no field record to compare against")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}
