//! Pointer-event resolution.
//!
//! A click is turned into an [`Action`] by [`resolve`], a pure function of
//! the event, the mode flags and the selected type. [`apply`] then performs
//! the action on an annotation set. Neither keeps state between calls.

use crate::error::CellCountError;
use crate::model::{AnnotationSet, Marker, Point, TypeIndex};

/// A click on the image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerEvent {
    pub x: f64,
    pub y: f64,
    /// 1-based linear stack index the click happened on.
    pub slice: usize,
}

impl PointerEvent {
    pub fn new(x: f64, y: f64, slice: usize) -> Self {
        Self { x, y, slice }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Mode flags that change what a click means.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModeFlags {
    pub delete_mode: bool,
}

/// The store operation a click resolves to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Action {
    AddMarker {
        type_index: TypeIndex,
        x: f64,
        y: f64,
        slice: usize,
    },
    RemoveNear {
        type_index: TypeIndex,
        point: Point,
        slice: usize,
        tolerance: f64,
    },
}

/// What applying an [`Action`] did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ActionOutcome {
    Added(Marker),
    /// Whether a marker was within tolerance and got removed.
    Removed(bool),
}

/// Decides what a click does.
///
/// # Errors
/// [`CellCountError::InvalidState`] if no counter type is selected.
pub fn resolve(
    event: &PointerEvent,
    mode: ModeFlags,
    current_type: Option<TypeIndex>,
    tolerance: f64,
) -> Result<Action, CellCountError> {
    let type_index = current_type.ok_or_else(|| {
        CellCountError::InvalidState("no counter type selected".to_string())
    })?;

    let action = if mode.delete_mode {
        Action::RemoveNear {
            type_index,
            point: event.point(),
            slice: event.slice,
            tolerance,
        }
    } else {
        Action::AddMarker {
            type_index,
            x: event.x,
            y: event.y,
            slice: event.slice,
        }
    };
    log::debug!("resolved click at ({}, {}) on slice {} to {:?}", event.x, event.y, event.slice, action);
    Ok(action)
}

/// Performs a resolved action on the annotation set.
pub fn apply(set: &mut AnnotationSet, action: &Action) -> Result<ActionOutcome, CellCountError> {
    match *action {
        Action::AddMarker {
            type_index,
            x,
            y,
            slice,
        } => set
            .add_marker(type_index, x, y, slice)
            .map(ActionOutcome::Added),
        Action::RemoveNear {
            type_index,
            point,
            slice,
            tolerance,
        } => set
            .remove_marker_near(type_index, point, slice, tolerance)
            .map(ActionOutcome::Removed),
    }
}
