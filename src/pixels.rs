//! Pixel access to the image being counted.
//!
//! The counting core never draws or processes images; it only needs the
//! stack geometry, the title (to match marker files) and single pixel values
//! for measurement. [`PixelSource`] is that seam. [`ImageStack`] is the
//! in-memory implementation used by the CLI and tests.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use serde::Serialize;

use crate::error::CellCountError;
use crate::model::Calibration;

/// Size of an image and the shape of its hyperstack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub slices: usize,
    pub frames: usize,
}

impl Dimensions {
    /// A plain z-stack with `slices` planes.
    pub fn stack(width: usize, height: usize, slices: usize) -> Self {
        Self {
            width,
            height,
            channels: 1,
            slices,
            frames: 1,
        }
    }

    /// Total number of planes (`channels * slices * frames`), saturating at
    /// `usize::MAX`. [`plane_count`] rejects such shapes instead.
    pub fn stack_size(&self) -> usize {
        self.channels
            .saturating_mul(self.slices)
            .saturating_mul(self.frames)
    }

    /// Returns true if the image has more than one plane.
    pub fn is_stack(&self) -> bool {
        self.stack_size() > 1
    }

    /// Returns true if pixel `(x, y)` lies inside the plane.
    pub fn contains_pixel(&self, x: f64, y: f64) -> bool {
        x >= 0.0 && y >= 0.0 && x < self.width as f64 && y < self.height as f64
    }
}

/// Number of planes in a `channels x slices x frames` stack.
pub fn plane_count(channels: usize, slices: usize, frames: usize) -> Result<usize, CellCountError> {
    channels
        .checked_mul(slices)
        .and_then(|planes| planes.checked_mul(frames))
        .ok_or_else(|| {
            CellCountError::InvalidInput(format!(
                "stack shape {channels}x{slices}x{frames} (CxZxT) has too many planes"
            ))
        })
}

/// Read-only access to the image a session counts on.
pub trait PixelSource {
    /// Image title; marker files store it to recognise their image.
    fn title(&self) -> &str;

    fn dimensions(&self) -> Dimensions;

    /// Spatial calibration, passed through to saved files untouched.
    fn calibration(&self) -> Calibration {
        Calibration::default()
    }

    /// Intensity at pixel `(x, y)` on the 1-based linear stack index `slice`.
    ///
    /// Callers check bounds against [`PixelSource::dimensions`] first.
    fn pixel_intensity(&self, slice: usize, x: usize, y: usize) -> f64;
}

/// An in-memory stack of equally sized grayscale planes.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageStack {
    title: String,
    dimensions: Dimensions,
    calibration: Calibration,
    planes: Vec<Vec<f32>>,
}

impl ImageStack {
    /// Creates a z-stack from row-major planes of `width * height` values.
    pub fn new(
        title: impl Into<String>,
        width: usize,
        height: usize,
        planes: Vec<Vec<f32>>,
    ) -> Result<Self, CellCountError> {
        if width == 0 || height == 0 {
            return Err(CellCountError::InvalidInput(format!(
                "image must not be empty, got {width}x{height}"
            )));
        }
        if planes.is_empty() {
            return Err(CellCountError::InvalidInput(
                "image needs at least one plane".to_string(),
            ));
        }
        if let Some(idx) = planes.iter().position(|p| p.len() != width * height) {
            return Err(CellCountError::InvalidInput(format!(
                "plane {} has {} values, expected {}",
                idx + 1,
                planes[idx].len(),
                width * height
            )));
        }

        Ok(Self {
            title: title.into(),
            dimensions: Dimensions::stack(width, height, planes.len()),
            calibration: Calibration::default(),
            planes,
        })
    }

    /// Reinterprets the planes as a `channels x slices x frames` hyperstack
    /// (channel varying fastest).
    pub fn with_hyperstack_dims(
        mut self,
        channels: usize,
        slices: usize,
        frames: usize,
    ) -> Result<Self, CellCountError> {
        if plane_count(channels, slices, frames)? != self.planes.len() {
            return Err(CellCountError::InvalidInput(format!(
                "{}x{}x{} (CxZxT) does not match {} plane(s)",
                channels,
                slices,
                frames,
                self.planes.len()
            )));
        }
        self.dimensions.channels = channels;
        self.dimensions.slices = slices;
        self.dimensions.frames = frames;
        Ok(self)
    }

    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = calibration;
        self
    }

    /// Loads one image file per plane, in the given order.
    ///
    /// The stack title is the first file's name. 8- and 16-bit grayscale
    /// keep their raw values; colour images are converted to 8-bit luma.
    pub fn open(paths: &[PathBuf]) -> Result<Self, CellCountError> {
        let first = paths.first().ok_or_else(|| {
            CellCountError::InvalidInput("at least one image plane is required".to_string())
        })?;
        let title = first
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| first.display().to_string());

        let mut size = None;
        let mut planes = Vec::with_capacity(paths.len());
        for path in paths {
            let (width, height, plane) = load_plane(path)?;
            match size {
                None => size = Some((width, height)),
                Some(expected) if expected != (width, height) => {
                    return Err(CellCountError::InvalidInput(format!(
                        "{} is {}x{}, expected {}x{}",
                        path.display(),
                        width,
                        height,
                        expected.0,
                        expected.1
                    )));
                }
                Some(_) => {}
            }
            planes.push(plane);
        }

        let (width, height) = size.unwrap_or((0, 0));
        log::info!(
            "loaded {} plane(s) of {}x{} as '{}'",
            planes.len(),
            width,
            height,
            title
        );
        Self::new(title, width, height, planes)
    }
}

impl PixelSource for ImageStack {
    fn title(&self) -> &str {
        &self.title
    }

    fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    fn calibration(&self) -> Calibration {
        self.calibration.clone()
    }

    fn pixel_intensity(&self, slice: usize, x: usize, y: usize) -> f64 {
        let plane = &self.planes[slice - 1];
        f64::from(plane[y * self.dimensions.width + x])
    }
}

fn load_plane(path: &Path) -> Result<(usize, usize, Vec<f32>), CellCountError> {
    let decoded = image::open(path).map_err(|source| CellCountError::ImageLoad {
        path: path.to_path_buf(),
        source,
    })?;
    let (width, height) = (decoded.width() as usize, decoded.height() as usize);

    let values: Vec<f32> = match decoded {
        DynamicImage::ImageLuma16(buffer) => buffer.into_raw().into_iter().map(f32::from).collect(),
        DynamicImage::ImageLuma8(buffer) => buffer.into_raw().into_iter().map(f32::from).collect(),
        other => other
            .to_luma8()
            .into_raw()
            .into_iter()
            .map(f32::from)
            .collect(),
    };
    Ok((width, height, values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: usize, height: usize, offset: f32) -> Vec<f32> {
        (0..width * height).map(|i| i as f32 + offset).collect()
    }

    #[test]
    fn plane_count_rejects_overflowing_shapes() {
        assert_eq!(plane_count(2, 3, 4).expect("count"), 24);
        let err = plane_count(usize::MAX, 2, 1).unwrap_err();
        assert!(matches!(err, CellCountError::InvalidInput(_)));

        let huge = Dimensions {
            width: 1,
            height: 1,
            channels: usize::MAX,
            slices: 2,
            frames: 2,
        };
        assert_eq!(huge.stack_size(), usize::MAX);

        let stack = ImageStack::new("t.tif", 2, 2, vec![ramp(2, 2, 0.0); 2]).expect("stack");
        assert!(stack.with_hyperstack_dims(usize::MAX, 2, 1).is_err());
    }

    #[test]
    fn new_checks_plane_sizes() {
        let err = ImageStack::new("bad", 2, 2, vec![ramp(2, 2, 0.0), vec![0.0; 3]]).unwrap_err();
        assert!(err.to_string().contains("plane 2"));

        assert!(ImageStack::new("empty", 0, 2, vec![vec![]]).is_err());
        assert!(ImageStack::new("none", 2, 2, vec![]).is_err());
    }

    #[test]
    fn pixel_lookup_is_row_major_per_plane() {
        let stack = ImageStack::new("s", 3, 2, vec![ramp(3, 2, 0.0), ramp(3, 2, 100.0)])
            .expect("stack");
        assert_eq!(stack.pixel_intensity(1, 2, 1), 5.0);
        assert_eq!(stack.pixel_intensity(2, 0, 1), 103.0);
        assert_eq!(stack.dimensions().stack_size(), 2);
    }

    #[test]
    fn hyperstack_dims_must_match_plane_count() {
        let planes = (0..6).map(|i| ramp(2, 2, i as f32)).collect();
        let stack = ImageStack::new("h", 2, 2, planes).expect("stack");
        assert!(stack.clone().with_hyperstack_dims(2, 2, 2).is_err());

        let stack = stack.with_hyperstack_dims(2, 3, 1).expect("dims");
        let dims = stack.dimensions();
        assert_eq!((dims.channels, dims.slices, dims.frames), (2, 3, 1));
    }

    #[test]
    fn open_reads_grayscale_planes_with_raw_values() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let path = temp.path().join("plane.png");
        let mut buffer = image::GrayImage::new(4, 3);
        buffer.put_pixel(2, 1, image::Luma([200]));
        buffer.save(&path).expect("save png");

        let stack = ImageStack::open(&[path]).expect("open");
        assert_eq!(stack.title(), "plane.png");
        assert_eq!(stack.dimensions(), Dimensions::stack(4, 3, 1));
        assert_eq!(stack.pixel_intensity(1, 2, 1), 200.0);
        assert_eq!(stack.pixel_intensity(1, 0, 0), 0.0);
    }

    #[test]
    fn contains_pixel_excludes_far_edges() {
        let dims = Dimensions::stack(10, 5, 1);
        assert!(dims.contains_pixel(0.0, 0.0));
        assert!(dims.contains_pixel(9.9, 4.9));
        assert!(!dims.contains_pixel(10.0, 2.0));
        assert!(!dims.contains_pixel(-0.1, 2.0));
    }
}
