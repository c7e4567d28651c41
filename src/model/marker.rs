//! Markers and the per-type marker store.
//!
//! Each counter type owns an append-only sequence of markers. Insertion order
//! matters: "delete last marker" pops the most recent one, and the file
//! format writes markers back in the order they were placed.

use serde::{Deserialize, Serialize};

use super::geometry::Point;
use super::ids::TypeIndex;
use crate::error::CellCountError;

/// Default cap on the number of counter types.
pub const DEFAULT_MAX_TYPES: usize = 100;

/// A single counted point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub x: f64,
    pub y: f64,
    /// 1-based linear stack index.
    pub z: usize,
    pub type_index: TypeIndex,
}

impl Marker {
    /// Position of the marker within its plane.
    #[inline]
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// A user-named category of markers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CounterType {
    index: TypeIndex,
    name: String,
    markers: Vec<Marker>,
}

impl CounterType {
    fn new(index: TypeIndex, name: String) -> Self {
        Self {
            index,
            name,
            markers: Vec::new(),
        }
    }

    pub fn index(&self) -> TypeIndex {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Markers in insertion order.
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Number of markers placed on the given 1-based stack index.
    pub fn count_on_slice(&self, slice: usize) -> usize {
        self.markers.iter().filter(|m| m.z == slice).count()
    }
}

/// Name given to a type that was added without an explicit name.
pub fn default_type_name(index: TypeIndex) -> String {
    format!("Type {}", index.number())
}

/// Names must be non-blank and free of control characters, which the marker
/// XML format cannot carry.
fn check_type_name(name: &str) -> Result<(), CellCountError> {
    if name.trim().is_empty() {
        return Err(CellCountError::InvalidInput(
            "counter type name must not be empty".to_string(),
        ));
    }
    if let Some(bad) = name.chars().find(|c| c.is_control()) {
        return Err(CellCountError::InvalidInput(format!(
            "counter type name {name:?} contains control character {bad:?}"
        )));
    }
    Ok(())
}

/// Ordered collection of counter types and their markers.
///
/// Every marker stored under a type carries that type's index; the store is
/// the only place markers are created, so this holds by construction.
#[derive(Clone, Debug, Serialize)]
pub struct MarkerStore {
    types: Vec<CounterType>,
    #[serde(skip)]
    max_types: usize,
}

// The cap is a session policy, not part of the annotation data.
impl PartialEq for MarkerStore {
    fn eq(&self, other: &Self) -> bool {
        self.types == other.types
    }
}

impl Default for MarkerStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TYPES)
    }
}

impl MarkerStore {
    /// Creates an empty store that accepts at most `max_types` types.
    pub fn new(max_types: usize) -> Self {
        Self {
            types: Vec::new(),
            max_types: max_types.max(1),
        }
    }

    /// Creates a store with `count` default-named types ("Type 1", ...).
    pub fn with_default_types(count: usize, max_types: usize) -> Result<Self, CellCountError> {
        let mut store = Self::new(max_types);
        for _ in 0..count {
            store.add_default_type()?;
        }
        Ok(store)
    }

    pub fn max_types(&self) -> usize {
        self.max_types
    }

    /// Changes the type cap. Fails, leaving the store as is, when it already
    /// holds more types than `max_types`.
    pub fn set_max_types(&mut self, max_types: usize) -> Result<(), CellCountError> {
        let max_types = max_types.max(1);
        if self.types.len() > max_types {
            return Err(CellCountError::InvalidInput(format!(
                "{} counter types exceed the limit of {}",
                self.types.len(),
                max_types
            )));
        }
        self.max_types = max_types;
        Ok(())
    }

    pub fn types(&self) -> &[CounterType] {
        &self.types
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Looks up a type by index.
    pub fn get(&self, index: TypeIndex) -> Result<&CounterType, CellCountError> {
        self.types
            .get(index.as_usize())
            .ok_or_else(|| CellCountError::not_found("counter type", index.as_usize(), self.types.len()))
    }

    fn get_mut(&mut self, index: TypeIndex) -> Result<&mut CounterType, CellCountError> {
        let len = self.types.len();
        self.types
            .get_mut(index.as_usize())
            .ok_or_else(|| CellCountError::not_found("counter type", index.as_usize(), len))
    }

    /// Appends a new empty counter type and returns its index.
    pub fn add_type(&mut self, name: impl Into<String>) -> Result<TypeIndex, CellCountError> {
        let name = name.into();
        check_type_name(&name)?;
        if self.types.len() >= self.max_types {
            return Err(CellCountError::InvalidState(format!(
                "cannot add more than {} counter types",
                self.max_types
            )));
        }

        let index = TypeIndex::new(self.types.len());
        self.types.push(CounterType::new(index, name));
        Ok(index)
    }

    /// Appends a type named after its 1-based number.
    pub fn add_default_type(&mut self) -> Result<TypeIndex, CellCountError> {
        let name = default_type_name(TypeIndex::new(self.types.len()));
        self.add_type(name)
    }

    /// Removes the last counter type, together with its markers.
    ///
    /// At least one type always remains.
    pub fn remove_last_type(&mut self) -> Result<CounterType, CellCountError> {
        if self.types.len() <= 1 {
            return Err(CellCountError::InvalidState(
                "at least one counter type must remain".to_string(),
            ));
        }
        self.types
            .pop()
            .ok_or_else(|| CellCountError::InvalidState("no counter types".to_string()))
    }

    pub fn rename_type(
        &mut self,
        index: TypeIndex,
        new_name: impl Into<String>,
    ) -> Result<(), CellCountError> {
        let new_name = new_name.into();
        let counter_type = self.get_mut(index)?;
        check_type_name(&new_name)?;
        counter_type.name = new_name;
        Ok(())
    }

    /// Appends a marker to the given type.
    pub fn add_marker(
        &mut self,
        index: TypeIndex,
        x: f64,
        y: f64,
        z: usize,
    ) -> Result<Marker, CellCountError> {
        let counter_type = self.get_mut(index)?;
        if !x.is_finite() || !y.is_finite() {
            return Err(CellCountError::InvalidInput(format!(
                "marker coordinates must be finite, got ({x}, {y})"
            )));
        }
        if z == 0 {
            return Err(CellCountError::InvalidInput(
                "marker slice index is 1-based, got 0".to_string(),
            ));
        }

        let marker = Marker {
            x,
            y,
            z,
            type_index: index,
        };
        counter_type.markers.push(marker);
        Ok(marker)
    }

    /// Pops the most recently added marker of the type, if any.
    pub fn remove_last_marker(&mut self, index: TypeIndex) -> Result<Option<Marker>, CellCountError> {
        Ok(self.get_mut(index)?.markers.pop())
    }

    /// Removes the marker of the given type on `slice` closest to `point`,
    /// provided it lies within `tolerance`.
    ///
    /// Ties on distance go to the most recently added marker. Returns whether
    /// a marker was removed.
    pub fn remove_marker_near(
        &mut self,
        index: TypeIndex,
        point: Point,
        slice: usize,
        tolerance: f64,
    ) -> Result<bool, CellCountError> {
        let counter_type = self.get_mut(index)?;

        let mut best: Option<(usize, f64)> = None;
        for (pos, marker) in counter_type.markers.iter().enumerate() {
            if marker.z != slice {
                continue;
            }
            let distance = marker.point().distance_to(&point);
            if distance > tolerance {
                continue;
            }
            // `<=` lets later markers win ties.
            if best.map_or(true, |(_, d)| distance <= d) {
                best = Some((pos, distance));
            }
        }

        match best {
            Some((pos, _)) => {
                counter_type.markers.remove(pos);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn count_by_type(&self, index: TypeIndex) -> Result<usize, CellCountError> {
        Ok(self.get(index)?.len())
    }

    pub fn count_by_type_and_slice(
        &self,
        index: TypeIndex,
        slice: usize,
    ) -> Result<usize, CellCountError> {
        Ok(self.get(index)?.count_on_slice(slice))
    }

    /// Total number of markers across all types.
    pub fn total_markers(&self) -> usize {
        self.types.iter().map(CounterType::len).sum()
    }

    /// All markers, type by type in declaration order, each type in
    /// insertion order.
    pub fn iter_markers(&self) -> impl Iterator<Item = &Marker> + '_ {
        self.types.iter().flat_map(|t| t.markers.iter())
    }

    /// All markers placed on the given 1-based stack index.
    pub fn markers_on_slice(&self, slice: usize) -> impl Iterator<Item = &Marker> + '_ {
        self.iter_markers().filter(move |m| m.z == slice)
    }

    /// Empties every type's marker list; type definitions are kept.
    pub fn clear_all(&mut self) {
        for counter_type in &mut self.types {
            counter_type.markers.clear();
        }
    }
}
