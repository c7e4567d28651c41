mod proptest_helpers;

use cellcount::model::{
    point_in_polygon, AnnotationSet, Point, Polygon, TypeIndex, DEFAULT_MAX_TYPES,
};
use cellcount::pixels::Dimensions;
use cellcount::report::{
    count_markers, decompose_slice_index, per_slice_counts, stack_index, totals, ReportOptions,
};
use proptest::prelude::*;

use proptest_helpers::{arb_annotation_set, arb_polygon, proptest_config};

#[derive(Clone, Debug)]
enum Op {
    Add(f64, f64),
    RemoveLast,
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            (0.0f64..100.0, 0.0f64..100.0).prop_map(|(x, y)| Op::Add(x, y)),
            Just(Op::RemoveLast),
        ],
        0..40,
    )
}

proptest! {
    #![proptest_config(proptest_config())]

    #[test]
    fn containment_ignores_start_vertex_and_winding(
        polygon in arb_polygon(),
        x in -50.0f64..650.0,
        y in -50.0f64..650.0,
        shift in 0usize..8,
    ) {
        let point = Point::new(x, y);
        let expected = point_in_polygon(&point, &polygon);

        let mut rotated = polygon.vertices.clone();
        let shift = shift % rotated.len();
        rotated.rotate_left(shift);
        prop_assert_eq!(point_in_polygon(&point, &Polygon::new(rotated.clone())), expected);

        rotated.reverse();
        prop_assert_eq!(point_in_polygon(&point, &Polygon::new(rotated)), expected);
    }

    #[test]
    fn vertices_count_as_inside(polygon in arb_polygon()) {
        for vertex in &polygon.vertices {
            prop_assert!(polygon.contains(vertex));
        }
    }

    #[test]
    fn decomposition_inverts_linearization(
        channels in 1usize..5,
        slices in 1usize..6,
        frames in 1usize..4,
        pick in any::<prop::sample::Index>(),
    ) {
        let total = channels * slices * frames;
        let linear = pick.index(total) + 1;
        let position = decompose_slice_index(linear, channels, slices, frames).expect("decompose");
        prop_assert!((1..=channels).contains(&position.channel));
        prop_assert!((1..=slices).contains(&position.slice));
        prop_assert!((1..=frames).contains(&position.frame));
        prop_assert_eq!(stack_index(position, channels, slices, frames).expect("linearize"), linear);
    }

    #[test]
    fn marker_removal_is_lifo(ops in arb_ops()) {
        let mut set = AnnotationSet::with_default_types(1, DEFAULT_MAX_TYPES).expect("set");
        let mut model: Vec<(f64, f64)> = Vec::new();
        let (mut adds, mut removes) = (0usize, 0usize);

        for op in ops {
            match op {
                Op::Add(x, y) => {
                    set.add_marker(TypeIndex(0), x, y, 1).expect("add");
                    model.push((x, y));
                    adds += 1;
                }
                Op::RemoveLast => {
                    removes += 1;
                    let removed = set.remove_last_marker(TypeIndex(0)).expect("remove");
                    prop_assert_eq!(removed.map(|m| (m.x, m.y)), model.pop());
                }
            }
        }

        let count = set.markers().count_by_type(TypeIndex(0)).expect("count");
        prop_assert_eq!(count, model.len());
        prop_assert!(count >= adds.saturating_sub(removes));
    }

    #[test]
    fn per_slice_counts_sum_to_totals(
        set in arb_annotation_set(),
        channels in 1usize..3,
        frames in 1usize..3,
        restrict in any::<bool>(),
    ) {
        // Slices 1..8 are generated; make the stack large enough for all of them.
        let dims = Dimensions {
            width: 1000,
            height: 1000,
            channels,
            slices: 8,
            frames,
        };
        let opts = ReportOptions { restrict_to_subregions: restrict };
        let rows = per_slice_counts(&set, &dims, &opts).expect("rows");
        let expected = totals(&set, &opts);

        prop_assert_eq!(rows.len(), dims.stack_size());
        for (type_idx, total) in expected.iter().enumerate() {
            let summed: usize = rows.iter().map(|row| row.counts[type_idx]).sum();
            prop_assert_eq!(summed, *total);
        }

        let report = count_markers(&set, &dims, &opts).expect("report");
        prop_assert_eq!(report.markers_outside_stack, 0);
        prop_assert_eq!(report.totals, expected);
    }
}
