use std::path::PathBuf;
use thiserror::Error;

use crate::validation::ValidationReport;

/// The main error type for cellcount operations.
#[derive(Debug, Error)]
pub enum CellCountError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{what} {index} not found (have {len})")]
    NotFound {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Failed to parse marker XML from {path}: {message}")]
    MarkerXmlParse { path: PathBuf, message: String },

    #[error("Failed to parse marker JSON from {path}: {source}")]
    MarkerJsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid marker data in {path}: {message}")]
    MarkerDataInvalid { path: PathBuf, message: String },

    #[error("Failed to write marker JSON to {path}: {source}")]
    MarkerJsonWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Markers belong to image '{found}', not to the current image '{expected}'")]
    Mismatch { expected: String, found: String },

    #[error("Failed to parse options from {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to write table: {0}")]
    TableWrite(#[from] csv::Error),

    #[error("Failed to serialize report: {0}")]
    ReportJson(#[source] serde_json::Error),

    #[error("Failed to load image plane {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Validation failed with {error_count} error(s) and {warning_count} warning(s)")]
    ValidationFailed {
        error_count: usize,
        warning_count: usize,
        report: ValidationReport,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Coarse classification of [`CellCountError`] for callers that only need
/// to decide how to react.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad argument; nothing was changed.
    InvalidInput,
    /// Index out of range; nothing was changed.
    NotFound,
    /// Operation not permitted in the current session state.
    InvalidState,
    /// Persisted data could not be parsed or is structurally invalid.
    Format,
    /// A marker file belongs to a different image.
    Mismatch,
    /// Filesystem or output failure.
    Io,
}

impl CellCountError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CellCountError::InvalidInput(_)
            | CellCountError::UnsupportedFormat(_)
            | CellCountError::ConfigParse { .. }
            | CellCountError::ValidationFailed { .. } => ErrorKind::InvalidInput,
            CellCountError::NotFound { .. } => ErrorKind::NotFound,
            CellCountError::InvalidState(_) => ErrorKind::InvalidState,
            CellCountError::MarkerXmlParse { .. }
            | CellCountError::MarkerJsonParse { .. }
            | CellCountError::MarkerDataInvalid { .. }
            | CellCountError::ImageLoad { .. } => ErrorKind::Format,
            CellCountError::Mismatch { .. } => ErrorKind::Mismatch,
            CellCountError::Io(_)
            | CellCountError::MarkerJsonWrite { .. }
            | CellCountError::TableWrite(_)
            | CellCountError::ReportJson(_) => ErrorKind::Io,
        }
    }

    /// Returns true for warning-class errors the caller may choose to override.
    pub fn is_warning(&self) -> bool {
        self.kind() == ErrorKind::Mismatch
    }

    pub(crate) fn not_found(what: &'static str, index: usize, len: usize) -> Self {
        CellCountError::NotFound { what, index, len }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_is_the_only_warning() {
        let mismatch = CellCountError::Mismatch {
            expected: "sample.tif".into(),
            found: "other.tif".into(),
        };
        assert!(mismatch.is_warning());
        assert_eq!(mismatch.kind(), ErrorKind::Mismatch);

        let state = CellCountError::InvalidState("not initialized".into());
        assert!(!state.is_warning());
        assert_eq!(state.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn not_found_message_names_the_range() {
        let err = CellCountError::not_found("counter type", 7, 3);
        assert_eq!(err.to_string(), "counter type 7 not found (have 3)");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
