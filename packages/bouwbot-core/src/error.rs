// Error types for the query engine.

use crate::gazetteer::ResolveError;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Engine errors.
///
/// Load-time variants (`DataUnavailable`, `EmptyCatalog`) are fatal to the engine
/// instance. Per-call variants (`InvalidCoordinate`, `InvalidRadius`,
/// `InvalidHeight`, `OutOfServiceArea`, `UnknownPlace`, `InvalidRequest`) are
/// caller-correctable.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// Catalog or boundary source missing, unreadable or malformed.
    #[error("data unavailable ({path}): {reason}")]
    DataUnavailable { path: PathBuf, reason: String },

    /// A single footprint failed validation and could not be repaired.
    #[error("invalid geometry for building {id}: {reason}")]
    InvalidGeometry { id: String, reason: String },

    /// The source held no valid building records.
    #[error("catalog is empty: {read} records read, {dropped} dropped")]
    EmptyCatalog { read: usize, dropped: usize },

    /// Longitude/latitude (or projected coordinate) out of range or not finite.
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),

    /// Radius outside `(0, max]`.
    #[error("radius_m must be greater than 0 and at most {max} meters (got {radius})")]
    InvalidRadius { radius: f64, max: f64 },

    /// Height threshold not finite.
    #[error("min_height_m must be a finite number (got {0})")]
    InvalidHeight(f64),

    /// Query point lies outside the supported region.
    #[error("location is outside the {area} service area")]
    OutOfServiceArea { area: String },

    /// Export artifact could not be written.
    #[error("failed to write artifact {path}: {source}")]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A place name the gazetteer does not know.
    #[error(transparent)]
    UnknownPlace(#[from] ResolveError),

    /// Request could not be parsed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Stable machine-readable code so callers can pick their own wording.
    pub fn reason(&self) -> &'static str {
        match self {
            EngineError::DataUnavailable { .. } => "data_unavailable",
            EngineError::InvalidGeometry { .. } => "invalid_geometry",
            EngineError::EmptyCatalog { .. } => "empty_catalog",
            EngineError::InvalidCoordinate(_) => "invalid_coordinate",
            EngineError::InvalidRadius { .. } => "invalid_radius",
            EngineError::InvalidHeight(_) => "invalid_height",
            EngineError::OutOfServiceArea { .. } => "out_of_service_area",
            EngineError::ArtifactWrite { .. } => "artifact_write",
            EngineError::UnknownPlace(_) => "unknown_place",
            EngineError::InvalidRequest(_) => "invalid_request",
            EngineError::Config(_) => "config",
        }
    }

    /// True for errors caused by the caller's input rather than the engine's data.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidCoordinate(_)
                | EngineError::InvalidRadius { .. }
                | EngineError::InvalidHeight(_)
                | EngineError::OutOfServiceArea { .. }
                | EngineError::UnknownPlace(_)
                | EngineError::InvalidRequest(_)
        )
    }

    pub(crate) fn unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        EngineError::DataUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes_are_distinct() {
        let errors = [
            EngineError::unavailable("x", "missing"),
            EngineError::InvalidGeometry {
                id: "a".into(),
                reason: "bowtie".into(),
            },
            EngineError::EmptyCatalog { read: 0, dropped: 0 },
            EngineError::InvalidCoordinate("lat".into()),
            EngineError::InvalidRadius {
                radius: 0.0,
                max: 15000.0,
            },
            EngineError::InvalidHeight(f64::NAN),
            EngineError::OutOfServiceArea {
                area: "Utrecht".into(),
            },
            EngineError::UnknownPlace(ResolveError::NotFound("Atlantis".into())),
            EngineError::InvalidRequest("missing operation".into()),
            EngineError::Config("bad".into()),
        ];
        let mut codes: Vec<&str> = errors.iter().map(|e| e.reason()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_caller_errors() {
        assert!(EngineError::InvalidRadius {
            radius: -1.0,
            max: 15000.0
        }
        .is_caller_error());
        assert!(!EngineError::EmptyCatalog { read: 3, dropped: 3 }.is_caller_error());
    }
}
