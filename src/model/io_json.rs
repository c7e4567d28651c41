//! JSON serialization for marker files.
//!
//! This is a lossless dump of a [`MarkerFile`], useful for:
//! - Inspecting a session's annotations with ordinary JSON tooling
//! - Feeding counts into scripts without an XML parser
//! - Exchanging data between cellcount instances
//!
//! Reading goes through the same store API as the XML reader, so a JSON
//! file cannot smuggle in markers whose type index disagrees with their
//! owning type.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::marker::{MarkerStore, DEFAULT_MAX_TYPES};
use super::{AnnotationSet, Calibration, MarkerFile, Polygon, TypeIndex};
use crate::error::CellCountError;

#[derive(Deserialize)]
struct MarkerFileDoc {
    source_identity: String,
    #[serde(default)]
    calibration: Option<Calibration>,
    annotations: AnnotationSetDoc,
}

#[derive(Deserialize)]
struct AnnotationSetDoc {
    markers: MarkerStoreDoc,
    #[serde(default)]
    current_type: Option<TypeIndex>,
    #[serde(default)]
    subregions: Vec<Polygon>,
}

#[derive(Deserialize)]
struct MarkerStoreDoc {
    types: Vec<CounterTypeDoc>,
}

#[derive(Deserialize)]
struct CounterTypeDoc {
    name: String,
    #[serde(default)]
    markers: Vec<MarkerDoc>,
}

#[derive(Deserialize)]
struct MarkerDoc {
    x: f64,
    y: f64,
    z: usize,
}

/// Reads a marker file from JSON.
///
/// # Errors
/// Returns an error if the file cannot be read, is not valid JSON, or
/// describes an invalid annotation set.
pub fn read_marker_json(path: &Path) -> Result<MarkerFile, CellCountError> {
    let file = File::open(path).map_err(CellCountError::Io)?;
    let reader = BufReader::new(file);

    let doc: MarkerFileDoc =
        serde_json::from_reader(reader).map_err(|source| CellCountError::MarkerJsonParse {
            path: path.to_path_buf(),
            source,
        })?;
    build_marker_file(doc, path)
}

/// Writes a marker file as pretty-printed JSON.
pub fn write_marker_json(path: &Path, file: &MarkerFile) -> Result<(), CellCountError> {
    let out = File::create(path).map_err(CellCountError::Io)?;
    let writer = BufWriter::new(out);

    serde_json::to_writer_pretty(writer, file).map_err(|source| CellCountError::MarkerJsonWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a marker file from a JSON string.
pub fn from_json_str(json: &str) -> Result<MarkerFile, CellCountError> {
    let path = PathBuf::from("<string>");
    let doc: MarkerFileDoc =
        serde_json::from_str(json).map_err(|source| CellCountError::MarkerJsonParse {
            path: path.clone(),
            source,
        })?;
    build_marker_file(doc, &path)
}

/// Writes a marker file to a JSON string.
pub fn to_json_string(file: &MarkerFile) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(file)
}

fn build_marker_file(doc: MarkerFileDoc, path: &Path) -> Result<MarkerFile, CellCountError> {
    let invalid = |message: String| CellCountError::MarkerDataInvalid {
        path: path.to_path_buf(),
        message,
    };

    let type_docs = doc.annotations.markers.types;
    if type_docs.is_empty() {
        return Err(invalid("annotation set has no counter types".to_string()));
    }

    let mut store = MarkerStore::new(DEFAULT_MAX_TYPES.max(type_docs.len()));
    for (position, type_doc) in type_docs.into_iter().enumerate() {
        let index = store
            .add_type(type_doc.name)
            .map_err(|err| invalid(format!("type {}: {err}", position + 1)))?;
        for marker in type_doc.markers {
            store
                .add_marker(index, marker.x, marker.y, marker.z)
                .map_err(|err| invalid(format!("type {}: {err}", position + 1)))?;
        }
    }

    let mut annotations = AnnotationSet::from_store(store);
    if let Some(current) = doc.annotations.current_type {
        annotations
            .select_type(current)
            .map_err(|err| invalid(format!("current type: {err}")))?;
    }
    for (position, polygon) in doc.annotations.subregions.into_iter().enumerate() {
        annotations
            .add_subregion(polygon)
            .map_err(|err| invalid(format!("subregion {}: {err}", position + 1)))?;
    }

    Ok(MarkerFile {
        source_identity: doc.source_identity,
        calibration: doc.calibration,
        annotations,
    })
}
