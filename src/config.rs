//! Counter options.
//!
//! Options are read from a YAML file; every field is optional and falls back
//! to the counter's usual defaults.
//!
//! ```yaml
//! initial_types: 8
//! delete_tolerance: 3.5
//! restrict_to_subregions: true
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CellCountError;
use crate::model::DEFAULT_MAX_TYPES;

/// Number of counter types a fresh session starts with.
pub const DEFAULT_INITIAL_TYPES: usize = 5;

/// Hit radius, in pixels, for removing a marker in delete mode.
pub const DEFAULT_DELETE_TOLERANCE: f64 = 5.0;

/// Session options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CounterOptions {
    /// Counter types created for a new session ("Type 1".."Type N").
    pub initial_types: usize,

    /// Upper bound on the number of counter types.
    pub max_types: usize,

    /// Distance within which a delete-mode click removes a marker.
    pub delete_tolerance: f64,

    /// Whether the caller keeps the original image and counts on a copy.
    pub keep_original: bool,

    /// Initial state of the marker-number display flag.
    pub show_numbers: bool,

    /// Initial state of the show-markers-on-all-slices flag.
    pub show_all: bool,

    /// Default subregion restriction for reports and measurements.
    pub restrict_to_subregions: bool,
}

impl Default for CounterOptions {
    fn default() -> Self {
        Self {
            initial_types: DEFAULT_INITIAL_TYPES,
            max_types: DEFAULT_MAX_TYPES,
            delete_tolerance: DEFAULT_DELETE_TOLERANCE,
            keep_original: false,
            show_numbers: true,
            show_all: false,
            restrict_to_subregions: false,
        }
    }
}

impl CounterOptions {
    /// Loads and validates options from a YAML file.
    pub fn load(path: &Path) -> Result<Self, CellCountError> {
        let data = fs::read_to_string(path).map_err(CellCountError::Io)?;
        let options: CounterOptions =
            serde_yaml::from_str(&data).map_err(|source| CellCountError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        options.validate()?;
        log::info!("loaded counter options from {}", path.display());
        Ok(options)
    }

    /// Checks that the options describe a usable session.
    pub fn validate(&self) -> Result<(), CellCountError> {
        if self.initial_types == 0 {
            return Err(CellCountError::InvalidInput(
                "initial_types must be at least 1".to_string(),
            ));
        }
        if self.initial_types > self.max_types {
            return Err(CellCountError::InvalidInput(format!(
                "initial_types ({}) exceeds max_types ({})",
                self.initial_types, self.max_types
            )));
        }
        if !self.delete_tolerance.is_finite() || self.delete_tolerance < 0.0 {
            return Err(CellCountError::InvalidInput(format!(
                "delete_tolerance must be a finite, non-negative distance, got {}",
                self.delete_tolerance
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_yaml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        file.write_all(contents.as_bytes()).expect("write yaml");
        file
    }

    #[test]
    fn defaults_match_the_counter() {
        let options = CounterOptions::default();
        assert_eq!(options.initial_types, 5);
        assert_eq!(options.max_types, 100);
        assert_eq!(options.delete_tolerance, 5.0);
        assert!(options.show_numbers);
        assert!(!options.show_all);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let file = write_yaml("initial_types: 8\nrestrict_to_subregions: true\n");
        let options = CounterOptions::load(file.path()).expect("load");
        assert_eq!(options.initial_types, 8);
        assert!(options.restrict_to_subregions);
        assert_eq!(options.delete_tolerance, DEFAULT_DELETE_TOLERANCE);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let file = write_yaml("initial_types: 0\n");
        assert!(matches!(
            CounterOptions::load(file.path()),
            Err(CellCountError::InvalidInput(_))
        ));

        let options = CounterOptions {
            initial_types: 3,
            max_types: 2,
            ..CounterOptions::default()
        };
        assert!(options.validate().is_err());

        let options = CounterOptions {
            delete_tolerance: -1.0,
            ..CounterOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let file = write_yaml("initial_types: [not, a, number]\n");
        assert!(matches!(
            CounterOptions::load(file.path()),
            Err(CellCountError::ConfigParse { .. })
        ));

        let file = write_yaml("unknown_option: 1\n");
        assert!(matches!(
            CounterOptions::load(file.path()),
            Err(CellCountError::ConfigParse { .. })
        ));
    }
}
