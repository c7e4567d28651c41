//! Per-slice and total marker counts.
//!
//! This module turns an annotation set into the results table the counter
//! shows: one row per stack plane with its channel/z/frame position, then a
//! grand total per counter type.

mod table;

pub use table::{CountReport, SliceCounts};
pub(crate) use table::tsv_string;

use serde::Serialize;

use crate::error::CellCountError;
use crate::model::AnnotationSet;
use crate::pixels::{plane_count, Dimensions};

/// Options for marker counting.
#[derive(Clone, Debug, Default)]
pub struct ReportOptions {
    /// Count only markers inside an active subregion (edges count as inside).
    pub restrict_to_subregions: bool,
}

/// Position of a plane within a hyperstack, all 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StackPosition {
    pub channel: usize,
    pub slice: usize,
    pub frame: usize,
}

fn check_shape(channels: usize, slices: usize, frames: usize) -> Result<usize, CellCountError> {
    if channels == 0 || slices == 0 || frames == 0 {
        return Err(CellCountError::InvalidInput(format!(
            "stack shape {channels}x{slices}x{frames} (CxZxT) must be positive"
        )));
    }
    plane_count(channels, slices, frames)
}

/// Splits a 1-based linear stack index into its channel, z-slice and frame.
///
/// Channels vary fastest, then slices, then frames, matching ImageJ
/// hyperstack order. Inverse of [`stack_index`].
pub fn decompose_slice_index(
    linear: usize,
    channels: usize,
    slices: usize,
    frames: usize,
) -> Result<StackPosition, CellCountError> {
    let total = check_shape(channels, slices, frames)?;
    if linear == 0 || linear > total {
        return Err(CellCountError::InvalidInput(format!(
            "stack index {linear} outside 1..={total}"
        )));
    }

    let offset = linear - 1;
    Ok(StackPosition {
        channel: offset % channels + 1,
        slice: (offset / channels) % slices + 1,
        frame: offset / (channels * slices) + 1,
    })
}

/// Linearizes a hyperstack position: `(frame-1)*Z*C + (slice-1)*C + channel`.
pub fn stack_index(
    position: StackPosition,
    channels: usize,
    slices: usize,
    frames: usize,
) -> Result<usize, CellCountError> {
    check_shape(channels, slices, frames)?;
    let StackPosition {
        channel,
        slice,
        frame,
    } = position;
    if !(1..=channels).contains(&channel)
        || !(1..=slices).contains(&slice)
        || !(1..=frames).contains(&frame)
    {
        return Err(CellCountError::InvalidInput(format!(
            "position c={channel} z={slice} t={frame} outside {channels}x{slices}x{frames}"
        )));
    }
    Ok((frame - 1) * slices * channels + (slice - 1) * channels + channel)
}

/// Per-plane marker counts for every plane `1..=stack_size`, in ascending
/// order, columns in type declaration order.
pub fn per_slice_counts(
    set: &AnnotationSet,
    dims: &Dimensions,
    opts: &ReportOptions,
) -> Result<Vec<SliceCounts>, CellCountError> {
    let total = check_shape(dims.channels, dims.slices, dims.frames)?;
    let type_count = set.markers().type_count();

    let mut rows = Vec::with_capacity(total);
    for slice in 1..=total {
        let position = decompose_slice_index(slice, dims.channels, dims.slices, dims.frames)?;
        rows.push(SliceCounts {
            slice,
            counts: vec![0; type_count],
            channel: position.channel,
            z_pos: position.slice,
            frame: position.frame,
        });
    }

    for (type_idx, counter_type) in set.markers().types().iter().enumerate() {
        for marker in counter_type.markers() {
            if !set.passes_subregion_filter(marker, opts.restrict_to_subregions) {
                continue;
            }
            if (1..=total).contains(&marker.z) {
                rows[marker.z - 1].counts[type_idx] += 1;
            }
        }
    }

    Ok(rows)
}

/// Marker count per type across the whole stack.
pub fn totals(set: &AnnotationSet, opts: &ReportOptions) -> Vec<usize> {
    set.markers()
        .types()
        .iter()
        .map(|counter_type| {
            counter_type
                .markers()
                .iter()
                .filter(|m| set.passes_subregion_filter(m, opts.restrict_to_subregions))
                .count()
        })
        .collect()
}

/// Compute the full results table for an annotation set on an image of the
/// given shape.
pub fn count_markers(
    set: &AnnotationSet,
    dims: &Dimensions,
    opts: &ReportOptions,
) -> Result<CountReport, CellCountError> {
    let rows = per_slice_counts(set, dims, opts)?;
    let totals = totals(set, opts);
    let stack_size = rows.len();

    let markers_outside_stack = set
        .markers()
        .iter_markers()
        .filter(|m| set.passes_subregion_filter(m, opts.restrict_to_subregions))
        .filter(|m| m.z > stack_size)
        .count();
    if markers_outside_stack > 0 {
        log::warn!(
            "{} marker(s) lie beyond the {} plane(s) of the stack and only appear in totals",
            markers_outside_stack,
            stack_size
        );
    }

    Ok(CountReport {
        type_names: set.type_names(),
        rows,
        totals,
        stack_size,
        markers_outside_stack,
        restricted_to_subregions: opts.restrict_to_subregions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Polygon, TypeIndex, DEFAULT_MAX_TYPES};

    fn scenario_set() -> AnnotationSet {
        let mut set = AnnotationSet::with_default_types(3, DEFAULT_MAX_TYPES).expect("set");
        for _ in 0..2 {
            set.add_marker(TypeIndex(0), 5.0, 5.0, 1).expect("add");
        }
        set.add_marker(TypeIndex(1), 5.0, 5.0, 1).expect("add");
        for _ in 0..3 {
            set.add_marker(TypeIndex(0), 50.0, 50.0, 2).expect("add");
        }
        set
    }

    #[test]
    fn overflowing_shapes_are_invalid_input() {
        let err = decompose_slice_index(1, usize::MAX, usize::MAX, 1).unwrap_err();
        assert!(matches!(err, CellCountError::InvalidInput(_)));

        let set = AnnotationSet::with_default_types(1, DEFAULT_MAX_TYPES).expect("set");
        let dims = Dimensions {
            width: 0,
            height: 0,
            channels: usize::MAX / 2,
            slices: 3,
            frames: 1,
        };
        assert!(count_markers(&set, &dims, &ReportOptions::default()).is_err());
    }

    #[test]
    fn decompose_matches_imagej_order() {
        // 2 channels, 3 slices, 2 frames.
        let pos = |i| decompose_slice_index(i, 2, 3, 2).expect("decompose");
        assert_eq!(pos(1), StackPosition { channel: 1, slice: 1, frame: 1 });
        assert_eq!(pos(2), StackPosition { channel: 2, slice: 1, frame: 1 });
        assert_eq!(pos(3), StackPosition { channel: 1, slice: 2, frame: 1 });
        assert_eq!(pos(7), StackPosition { channel: 1, slice: 1, frame: 2 });
        assert_eq!(pos(12), StackPosition { channel: 2, slice: 3, frame: 2 });
    }

    #[test]
    fn decompose_and_linearize_are_inverse() {
        let (c, z, t) = (3, 4, 2);
        for linear in 1..=c * z * t {
            let position = decompose_slice_index(linear, c, z, t).expect("decompose");
            assert_eq!(stack_index(position, c, z, t).expect("linearize"), linear);
        }
    }

    #[test]
    fn invalid_shapes_and_indices_are_rejected() {
        assert!(decompose_slice_index(0, 1, 1, 1).is_err());
        assert!(decompose_slice_index(5, 1, 4, 1).is_err());
        assert!(decompose_slice_index(1, 0, 4, 1).is_err());
        let bad = StackPosition { channel: 2, slice: 1, frame: 1 };
        assert!(stack_index(bad, 1, 4, 1).is_err());
    }

    #[test]
    fn scenario_counts_and_totals() {
        let set = scenario_set();
        let dims = Dimensions::stack(100, 100, 2);
        let report = count_markers(&set, &dims, &ReportOptions::default()).expect("report");

        assert_eq!(report.totals, [5, 1, 0]);
        assert_eq!(report.rows[0].counts, [2, 1, 0]);
        assert_eq!(report.rows[1].counts, [3, 0, 0]);
        assert_eq!(report.markers_outside_stack, 0);
    }

    #[test]
    fn per_slice_sums_equal_totals() {
        let set = scenario_set();
        let dims = Dimensions {
            width: 100,
            height: 100,
            channels: 2,
            slices: 2,
            frames: 1,
        };
        let opts = ReportOptions::default();
        let rows = per_slice_counts(&set, &dims, &opts).expect("rows");
        let expected = totals(&set, &opts);
        for type_idx in 0..expected.len() {
            let summed: usize = rows.iter().map(|r| r.counts[type_idx]).sum();
            assert_eq!(summed, expected[type_idx]);
        }
        assert_eq!(rows[1].channel, 2);
        assert_eq!(rows[1].z_pos, 1);
    }

    #[test]
    fn subregion_restriction_filters_rows_and_totals() {
        let mut set = scenario_set();
        set.add_subregion(Polygon::from_xy(&[
            (0.0, 0.0),
            (10.0, 0.0),
            (10.0, 10.0),
            (0.0, 10.0),
        ]))
        .expect("region");
        let opts = ReportOptions {
            restrict_to_subregions: true,
        };
        let report =
            count_markers(&set, &Dimensions::stack(100, 100, 2), &opts).expect("report");
        assert_eq!(report.totals, [2, 1, 0]);
        assert_eq!(report.rows[1].counts, [0, 0, 0]);
    }

    #[test]
    fn markers_beyond_the_stack_only_reach_totals() {
        let mut set = scenario_set();
        set.add_marker(TypeIndex(2), 1.0, 1.0, 9).expect("add");
        let report = count_markers(&set, &Dimensions::stack(100, 100, 2), &ReportOptions::default())
            .expect("report");
        assert_eq!(report.totals, [5, 1, 1]);
        assert_eq!(report.markers_outside_stack, 1);
        assert!(report.rows.iter().all(|r| r.counts[2] == 0));
    }
}
