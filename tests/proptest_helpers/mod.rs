#![allow(dead_code)]

use std::f64::consts::TAU;

use cellcount::model::{
    AnnotationSet, Calibration, MarkerFile, MarkerStore, Point, Polygon, TypeIndex,
    DEFAULT_MAX_TYPES,
};
use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// Valid type names: markup characters and leading or trailing spaces are
/// allowed, control characters are not.
pub fn arb_name() -> impl Strategy<Value = String> {
    " {0,2}[A-Za-z0-9_&<>'\"][A-Za-z0-9 _&<>.-]{0,10} {0,2}"
}

pub fn arb_title() -> impl Strategy<Value = String> {
    " ?[A-Za-z0-9_ ]{0,12}\\.(tif|png|czi) ?"
}

pub fn arb_marker_position() -> impl Strategy<Value = (f64, f64, usize)> {
    (-50.0f64..1000.0, -50.0f64..1000.0, 1usize..8)
}

/// Regular polygons: always simple with clearly non-zero area.
pub fn arb_polygon() -> impl Strategy<Value = Polygon> {
    (
        0.0f64..500.0,
        0.0f64..500.0,
        1.0f64..100.0,
        3usize..9,
        0.0f64..TAU,
    )
        .prop_map(|(cx, cy, radius, sides, rotation)| {
            Polygon::new((0..sides).map(|k| {
                let angle = rotation + TAU * k as f64 / sides as f64;
                Point::new(cx + radius * angle.cos(), cy + radius * angle.sin())
            }))
        })
}

pub fn arb_annotation_set() -> impl Strategy<Value = AnnotationSet> {
    (
        prop::collection::vec(
            (arb_name(), prop::collection::vec(arb_marker_position(), 0..6)),
            1..5,
        ),
        prop::collection::vec(arb_polygon(), 0..3),
        any::<prop::sample::Index>(),
        any::<bool>(),
    )
        .prop_map(|(types, polygons, selected, has_selection)| {
            let mut store = MarkerStore::new(DEFAULT_MAX_TYPES);
            for (name, markers) in &types {
                let index = store.add_type(name.clone()).expect("add type");
                for &(x, y, z) in markers {
                    store.add_marker(index, x, y, z).expect("add marker");
                }
            }

            let mut set = AnnotationSet::from_store(store);
            if has_selection {
                set.select_type(TypeIndex(selected.index(types.len())))
                    .expect("select type");
            }
            for polygon in polygons {
                set.add_subregion(polygon).expect("add subregion");
            }
            set
        })
}

pub fn arb_calibration() -> impl Strategy<Value = Option<Calibration>> {
    prop::option::of(
        (0.01f64..10.0, 0.01f64..10.0, 0.01f64..10.0, "(pixel|micron|nm|µm)").prop_map(
            |(pixel_width, pixel_height, pixel_depth, unit)| Calibration {
                pixel_width,
                pixel_height,
                pixel_depth,
                unit,
            },
        ),
    )
}

pub fn arb_marker_file() -> impl Strategy<Value = MarkerFile> {
    (arb_title(), arb_calibration(), arb_annotation_set()).prop_map(
        |(title, calibration, annotations)| MarkerFile {
            source_identity: title,
            calibration,
            annotations,
        },
    )
}
