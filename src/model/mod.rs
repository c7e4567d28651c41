//! Annotation data model for cellcount.
//!
//! This module defines the in-memory representation of a counting session's
//! annotations: counter types with their ordered markers, polygonal
//! subregions, and the currently selected type. The file codecs
//! ([`io_marker_xml`], [`io_json`]) read into and write from these types.
//!
//! # Design Principles
//!
//! 1. **Construction through the store**: markers are only created by
//!    [`MarkerStore::add_marker`], so every marker's type index matches the
//!    type that owns it. Decoders go through the same API.
//!
//! 2. **Append-only order**: marker, type and subregion order is insertion
//!    order and survives a save/load cycle unchanged.
//!
//! 3. **No partial mutation**: every fallible operation validates before it
//!    changes anything.
//!
//! # Example
//!
//! ```
//! use cellcount::model::{AnnotationSet, TypeIndex};
//!
//! let mut set = AnnotationSet::with_default_types(3, 100).unwrap();
//! set.select_type(TypeIndex(0)).unwrap();
//! set.add_marker(TypeIndex(0), 10.0, 12.5, 1).unwrap();
//! assert_eq!(set.markers().total_markers(), 1);
//! ```

pub mod geometry;
mod ids;
pub mod io_json;
pub mod io_marker_xml;
pub mod marker;
pub mod subregion;

use serde::{Deserialize, Serialize};

pub use geometry::{point_in_polygon, Point, Polygon};
pub use ids::TypeIndex;
pub use marker::{CounterType, Marker, MarkerStore, DEFAULT_MAX_TYPES};
pub use subregion::SubregionStore;

use crate::error::CellCountError;

/// Spatial calibration of the source image (voxel size and unit).
///
/// Carried through untouched; nothing in this crate interprets it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub pixel_depth: f64,
    pub unit: String,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            pixel_width: 1.0,
            pixel_height: 1.0,
            pixel_depth: 1.0,
            unit: "pixel".to_string(),
        }
    }
}

/// All annotations of one counting session.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AnnotationSet {
    markers: MarkerStore,
    current_type: Option<TypeIndex>,
    subregions: SubregionStore,
}

impl AnnotationSet {
    /// Creates a set around an existing store, with no type selected.
    pub fn from_store(markers: MarkerStore) -> Self {
        Self {
            markers,
            current_type: None,
            subregions: SubregionStore::new(),
        }
    }

    /// Creates a set with `count` default-named types.
    pub fn with_default_types(count: usize, max_types: usize) -> Result<Self, CellCountError> {
        Ok(Self::from_store(MarkerStore::with_default_types(
            count, max_types,
        )?))
    }

    pub fn markers(&self) -> &MarkerStore {
        &self.markers
    }

    pub fn subregions(&self) -> &SubregionStore {
        &self.subregions
    }

    pub fn current_type(&self) -> Option<TypeIndex> {
        self.current_type
    }

    pub fn type_names(&self) -> Vec<String> {
        self.markers
            .types()
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    /// Makes `index` the current type.
    pub fn select_type(&mut self, index: TypeIndex) -> Result<(), CellCountError> {
        self.markers.get(index)?;
        self.current_type = Some(index);
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.current_type = None;
    }

    pub fn add_type(&mut self, name: impl Into<String>) -> Result<TypeIndex, CellCountError> {
        self.markers.add_type(name)
    }

    /// See [`MarkerStore::set_max_types`].
    pub fn set_max_types(&mut self, max_types: usize) -> Result<(), CellCountError> {
        self.markers.set_max_types(max_types)
    }

    pub fn add_default_type(&mut self) -> Result<TypeIndex, CellCountError> {
        self.markers.add_default_type()
    }

    /// Removes the last type. If it was selected, the selection is cleared.
    pub fn remove_last_type(&mut self) -> Result<CounterType, CellCountError> {
        let removed = self.markers.remove_last_type()?;
        if self.current_type == Some(removed.index()) {
            self.current_type = None;
        }
        Ok(removed)
    }

    pub fn rename_type(
        &mut self,
        index: TypeIndex,
        name: impl Into<String>,
    ) -> Result<(), CellCountError> {
        self.markers.rename_type(index, name)
    }

    pub fn add_marker(
        &mut self,
        index: TypeIndex,
        x: f64,
        y: f64,
        z: usize,
    ) -> Result<Marker, CellCountError> {
        self.markers.add_marker(index, x, y, z)
    }

    pub fn remove_last_marker(
        &mut self,
        index: TypeIndex,
    ) -> Result<Option<Marker>, CellCountError> {
        self.markers.remove_last_marker(index)
    }

    pub fn remove_marker_near(
        &mut self,
        index: TypeIndex,
        point: Point,
        slice: usize,
        tolerance: f64,
    ) -> Result<bool, CellCountError> {
        self.markers
            .remove_marker_near(index, point, slice, tolerance)
    }

    pub fn add_subregion(&mut self, polygon: Polygon) -> Result<usize, CellCountError> {
        self.subregions.add_subregion(polygon)
    }

    pub fn remove_last_subregion(&mut self) -> Option<Polygon> {
        self.subregions.remove_last_subregion()
    }

    /// Removes all markers and subregions; type definitions and the
    /// selection stay.
    pub fn clear_annotations(&mut self) {
        self.markers.clear_all();
        self.subregions.clear();
    }

    /// Returns true if the marker should be counted under the given
    /// subregion restriction.
    pub fn passes_subregion_filter(&self, marker: &Marker, restrict: bool) -> bool {
        !restrict || self.subregions.any_contains(&marker.point())
    }
}

/// A persisted annotation set together with the identity of the image it
/// was made on.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MarkerFile {
    /// Title of the source image the markers belong to.
    pub source_identity: String,

    /// Calibration of the source image, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibration: Option<Calibration>,

    pub annotations: AnnotationSet,
}

impl MarkerFile {
    pub fn new(source_identity: impl Into<String>, annotations: AnnotationSet) -> Self {
        Self {
            source_identity: source_identity.into(),
            calibration: None,
            annotations,
        }
    }

    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = Some(calibration);
        self
    }

    /// Fails with [`CellCountError::Mismatch`] when the markers were made on
    /// a different image than `live_title`.
    pub fn check_identity(&self, live_title: &str) -> Result<(), CellCountError> {
        if self.source_identity == live_title {
            Ok(())
        } else {
            Err(CellCountError::Mismatch {
                expected: live_title.to_string(),
                found: self.source_identity.clone(),
            })
        }
    }
}

/// On-disk encodings of a [`MarkerFile`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkerFormat {
    /// The counter's native XML layout.
    Xml,
    /// Lossless JSON dump.
    Json,
}

impl MarkerFormat {
    /// Parses a format name as given on the command line.
    pub fn from_name(name: &str) -> Result<Self, CellCountError> {
        match name.to_ascii_lowercase().as_str() {
            "xml" | "marker-xml" => Ok(MarkerFormat::Xml),
            "json" => Ok(MarkerFormat::Json),
            other => Err(CellCountError::UnsupportedFormat(format!(
                "'{other}' (supported: xml, json)"
            ))),
        }
    }

    /// Infers the format from a file extension.
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xml" => Some(MarkerFormat::Xml),
            "json" => Some(MarkerFormat::Json),
            _ => None,
        }
    }

    pub fn read(self, path: &std::path::Path) -> Result<MarkerFile, CellCountError> {
        match self {
            MarkerFormat::Xml => io_marker_xml::read_marker_xml(path),
            MarkerFormat::Json => io_json::read_marker_json(path),
        }
    }

    pub fn write(self, path: &std::path::Path, file: &MarkerFile) -> Result<(), CellCountError> {
        match self {
            MarkerFormat::Xml => io_marker_xml::write_marker_xml(path, file),
            MarkerFormat::Json => io_json::write_marker_json(path, file),
        }
    }
}
