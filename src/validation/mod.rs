//! Marker file validation for cellcount.
//!
//! This module checks a loaded marker file for problems the codecs accept
//! but a count should not silently include:
//! - Structural issues (unnamed source image, empty or duplicate type names)
//! - Marker issues (non-finite coordinates, duplicates)
//! - Geometric issues against a target image (off-plane markers, slices
//!   beyond the stack, subregions reaching outside the image)

mod report;

pub use report::{IssueCode, IssueContext, Severity, ValidationIssue, ValidationReport};

use std::collections::HashMap;

use crate::model::{MarkerFile, Point};
use crate::pixels::Dimensions;

/// Options for validation behavior.
#[derive(Clone, Debug, Default)]
pub struct ValidateOptions {
    /// If true, treat warnings as errors.
    pub strict: bool,
    /// Plane size `(width, height)` to check marker and subregion positions
    /// against.
    pub plane: Option<(usize, usize)>,
    /// Number of planes to check marker slices against.
    pub stack_size: Option<usize>,
}

impl ValidateOptions {
    /// Checks everything against the given image shape.
    pub fn for_image(dims: &Dimensions) -> Self {
        Self {
            strict: false,
            plane: Some((dims.width, dims.height)),
            stack_size: Some(dims.stack_size()),
        }
    }
}

/// Validates a marker file and returns a report of all issues found.
///
/// Checks that need the image shape are skipped when `opts` does not
/// provide it.
pub fn validate_markers(file: &MarkerFile, opts: &ValidateOptions) -> ValidationReport {
    let mut report = ValidationReport::new();

    if file.source_identity.trim().is_empty() {
        report.add(ValidationIssue::warning(
            IssueCode::EmptySourceIdentity,
            "No source image title; imports will always report a mismatch",
            IssueContext::File,
        ));
    }

    validate_types(file, &mut report);
    validate_markers_in_types(file, opts, &mut report);
    validate_subregions(file, opts, &mut report);

    report
}

fn validate_types(file: &MarkerFile, report: &mut ValidationReport) {
    let mut seen_names: HashMap<&str, usize> = HashMap::new();

    for counter_type in file.annotations.markers().types() {
        let number = counter_type.index().number();
        let name = counter_type.name().trim();

        if name.is_empty() {
            report.add(ValidationIssue::warning(
                IssueCode::EmptyTypeName,
                "Empty counter type name",
                IssueContext::Type { number },
            ));
        } else if let Some(first) = seen_names.get(name) {
            report.add(ValidationIssue::warning(
                IssueCode::DuplicateTypeName,
                format!("Duplicate type name '{}' (also used by type {})", name, first),
                IssueContext::Type { number },
            ));
        } else {
            seen_names.insert(name, number);
        }
    }
}

fn validate_markers_in_types(file: &MarkerFile, opts: &ValidateOptions, report: &mut ValidationReport) {
    for counter_type in file.annotations.markers().types() {
        let type_number = counter_type.index().number();
        // Exact-position duplicates, keyed on the bit patterns of finite coordinates.
        let mut seen: HashMap<(u64, u64, usize), usize> = HashMap::new();

        for (idx, marker) in counter_type.markers().iter().enumerate() {
            let context = IssueContext::Marker {
                type_number,
                position: idx + 1,
            };

            if !marker.point().is_finite() {
                report.add(ValidationIssue::error(
                    IssueCode::MarkerNotFinite,
                    format!("Non-finite coordinates ({}, {})", marker.x, marker.y),
                    context,
                ));
                continue;
            }

            let out_of_stack = opts.stack_size.is_some_and(|size| marker.z > size);
            if marker.z == 0 || out_of_stack {
                let range = opts
                    .stack_size
                    .map(|size| format!("1..={size}"))
                    .unwrap_or_else(|| "1..".to_string());
                report.add(ValidationIssue::error(
                    IssueCode::SliceOutOfRange,
                    format!("Slice {} outside {}", marker.z, range),
                    context.clone(),
                ));
            }

            if let Some((width, height)) = opts.plane {
                if !inside_plane(&marker.point(), width, height) {
                    report.add(ValidationIssue::warning(
                        IssueCode::MarkerOutOfBounds,
                        format!(
                            "Marker ({:.1}, {:.1}) lies outside the {}x{} image",
                            marker.x, marker.y, width, height
                        ),
                        context.clone(),
                    ));
                }
            }

            let key = (marker.x.to_bits(), marker.y.to_bits(), marker.z);
            if let Some(first) = seen.get(&key) {
                report.add(ValidationIssue::warning(
                    IssueCode::DuplicateMarker,
                    format!(
                        "Same position ({}, {}) on slice {} as marker {}",
                        marker.x, marker.y, marker.z, first
                    ),
                    context,
                ));
            } else {
                seen.insert(key, idx + 1);
            }
        }
    }
}

fn validate_subregions(file: &MarkerFile, opts: &ValidateOptions, report: &mut ValidationReport) {
    let Some((width, height)) = opts.plane else {
        return;
    };

    for (idx, polygon) in file
        .annotations
        .subregions()
        .active_subregions()
        .iter()
        .enumerate()
    {
        let outside = polygon
            .vertices
            .iter()
            .filter(|v| !inside_plane(v, width, height))
            .count();
        if outside > 0 {
            report.add(ValidationIssue::warning(
                IssueCode::SubregionOutOfBounds,
                format!(
                    "{} of {} vertices lie outside the {}x{} image",
                    outside,
                    polygon.len(),
                    width,
                    height
                ),
                IssueContext::Subregion { number: idx + 1 },
            ));
        }
    }
}

/// Plane bounds are inclusive of the far edge, so a polygon may trace the
/// image border.
fn inside_plane(point: &Point, width: usize, height: usize) -> bool {
    point.x >= 0.0 && point.y >= 0.0 && point.x <= width as f64 && point.y <= height as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnnotationSet, Polygon, TypeIndex, DEFAULT_MAX_TYPES};

    fn valid_file() -> MarkerFile {
        let mut set = AnnotationSet::with_default_types(2, DEFAULT_MAX_TYPES).expect("set");
        set.add_marker(TypeIndex(0), 10.0, 20.0, 1).expect("add");
        set.add_marker(TypeIndex(1), 30.0, 40.0, 2).expect("add");
        set.add_subregion(Polygon::from_xy(&[(0.0, 0.0), (64.0, 0.0), (64.0, 64.0)]))
            .expect("region");
        MarkerFile::new("sample.tif", set)
    }

    fn opts() -> ValidateOptions {
        ValidateOptions::for_image(&Dimensions::stack(64, 64, 2))
    }

    #[test]
    fn test_valid_file() {
        let report = validate_markers(&valid_file(), &opts());
        assert!(
            report.is_clean(),
            "Expected no issues, got: {:?}",
            report.issues
        );
    }

    #[test]
    fn test_slice_beyond_stack_is_error() {
        let mut file = valid_file();
        file.annotations
            .add_marker(TypeIndex(0), 5.0, 5.0, 3)
            .expect("add");

        let report = validate_markers(&file, &opts());
        assert_eq!(report.error_count(), 1);
        assert!(report.has(IssueCode::SliceOutOfRange));

        // Without a stack size the slice cannot be checked.
        let report = validate_markers(&file, &ValidateOptions::default());
        assert!(report.is_clean());
    }

    #[test]
    fn test_marker_outside_plane_is_warning() {
        let mut file = valid_file();
        file.annotations
            .add_marker(TypeIndex(1), 70.0, 5.0, 1)
            .expect("add");

        let report = validate_markers(&file, &opts());
        assert!(report.is_ok());
        assert_eq!(report.warning_count(), 1);
        assert!(report.has(IssueCode::MarkerOutOfBounds));
    }

    #[test]
    fn test_duplicate_type_name() {
        let mut file = valid_file();
        file.annotations
            .rename_type(TypeIndex(1), "Type 1")
            .expect("rename");

        let report = validate_markers(&file, &opts());
        assert!(report.has(IssueCode::DuplicateTypeName));
        let issue = &report.issues[0];
        assert!(matches!(issue.context, IssueContext::Type { number: 2 }));
    }

    #[test]
    fn test_duplicate_marker() {
        let mut file = valid_file();
        file.annotations
            .add_marker(TypeIndex(0), 10.0, 20.0, 1)
            .expect("add");
        // Same spot on another slice is fine.
        file.annotations
            .add_marker(TypeIndex(0), 10.0, 20.0, 2)
            .expect("add");

        let report = validate_markers(&file, &opts());
        assert_eq!(report.warning_count(), 1);
        assert!(report.has(IssueCode::DuplicateMarker));
    }

    #[test]
    fn test_subregion_and_identity_warnings() {
        let mut file = valid_file();
        file.source_identity = String::new();
        file.annotations
            .add_subregion(Polygon::from_xy(&[(-5.0, 0.0), (10.0, 0.0), (10.0, 10.0)]))
            .expect("region");

        let report = validate_markers(&file, &opts());
        assert!(report.has(IssueCode::EmptySourceIdentity));
        assert!(report.has(IssueCode::SubregionOutOfBounds));
        assert!(report.to_string().contains("subregion 2"));
    }

    #[test]
    fn test_report_serializes_codes() {
        let mut file = valid_file();
        file.source_identity = " ".into();
        let report = validate_markers(&file, &opts());
        let json = serde_json::to_string(&report).expect("json");
        assert!(json.contains("\"EmptySourceIdentity\""));
        assert!(json.contains("\"kind\":\"file\""));
    }
}
