//! Intensity sampling at marker locations.
//!
//! Every marker is looked up on its own plane through a [`PixelSource`].
//! Markers that fall outside the image (or outside the subregions, when
//! restricted) are skipped and counted, never fatal.

mod report;

pub use report::{MeasureReport, MeasureRow};

use crate::error::CellCountError;
use crate::model::AnnotationSet;
use crate::pixels::PixelSource;
use crate::report::{decompose_slice_index, stack_index, StackPosition};

/// Options for intensity measurement.
#[derive(Clone, Debug, Default)]
pub struct MeasureOptions {
    /// Sample this channel instead of the marker's own (1-based). The
    /// marker's z-slice and frame are kept.
    pub channel: Option<usize>,
    /// Measure only markers inside an active subregion.
    pub restrict_to_subregions: bool,
}

/// Samples the pixel under every marker, in type then insertion order.
///
/// # Errors
/// Returns [`CellCountError::InvalidInput`] if the channel override is
/// outside the image's channel range.
pub fn measure_markers<S: PixelSource + ?Sized>(
    set: &AnnotationSet,
    image: &S,
    opts: &MeasureOptions,
) -> Result<MeasureReport, CellCountError> {
    let dims = image.dimensions();
    if let Some(channel) = opts.channel {
        if channel == 0 || channel > dims.channels {
            return Err(CellCountError::InvalidInput(format!(
                "channel {} outside 1..={}",
                channel, dims.channels
            )));
        }
    }

    let mut report = MeasureReport {
        type_names: set.type_names(),
        ..MeasureReport::default()
    };
    let stack_size = dims.stack_size();

    for marker in set.markers().iter_markers() {
        if !set.passes_subregion_filter(marker, opts.restrict_to_subregions) {
            report.outside_subregions += 1;
            continue;
        }
        if marker.z > stack_size || !dims.contains_pixel(marker.x, marker.y) {
            report.skipped_out_of_bounds += 1;
            continue;
        }

        let position = decompose_slice_index(marker.z, dims.channels, dims.slices, dims.frames)?;
        let (plane, position) = match opts.channel {
            Some(channel) => {
                let position = StackPosition { channel, ..position };
                (
                    stack_index(position, dims.channels, dims.slices, dims.frames)?,
                    position,
                )
            }
            None => (marker.z, position),
        };

        let (px, py) = (marker.x.floor() as usize, marker.y.floor() as usize);
        report.rows.push(MeasureRow {
            type_index: marker.type_index,
            type_name: report.type_names[marker.type_index.as_usize()].clone(),
            x: marker.x,
            y: marker.y,
            slice: plane,
            channel: position.channel,
            z_pos: position.slice,
            frame: position.frame,
            intensity: image.pixel_intensity(plane, px, py),
        });
    }

    if report.skipped_out_of_bounds > 0 {
        log::warn!(
            "skipped {} marker(s) outside the {}x{}x{} image",
            report.skipped_out_of_bounds,
            dims.width,
            dims.height,
            stack_size
        );
    }
    log::info!(
        "measured {} marker(s) on '{}'",
        report.rows.len(),
        image.title()
    );
    Ok(report)
}
