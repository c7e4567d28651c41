//! Polygonal subregions.
//!
//! Subregions are validated on insertion and never edited afterwards; like
//! counter types they are removed newest-first only.

use serde::Serialize;

use super::geometry::{Point, Polygon};
use crate::error::CellCountError;

/// Ordered collection of validated polygons.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SubregionStore {
    regions: Vec<Polygon>,
}

impl SubregionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a polygon after checking it is a simple shape with at least
    /// three vertices.
    pub fn add_subregion(&mut self, polygon: Polygon) -> Result<usize, CellCountError> {
        polygon
            .check_simple()
            .map_err(|message| CellCountError::InvalidInput(format!("invalid subregion: {message}")))?;
        self.regions.push(polygon);
        Ok(self.regions.len() - 1)
    }

    /// Pops the most recently added subregion, if any.
    pub fn remove_last_subregion(&mut self) -> Option<Polygon> {
        self.regions.pop()
    }

    /// Read-only view of the subregions in insertion order.
    pub fn active_subregions(&self) -> &[Polygon] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Returns true if the point lies inside (or on the edge of) any
    /// subregion.
    pub fn any_contains(&self, point: &Point) -> bool {
        self.regions.iter().any(|region| region.contains(point))
    }

    pub fn clear(&mut self) {
        self.regions.clear();
    }
}
