//! Sample grids emitted during training.

use crate::error::GanError;
use burn::prelude::*;
use image::{DynamicImage, ImageBuffer, Luma, Rgb, Rgba};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Generated images tiled row-major into one picture, pixels in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleGrid {
    pub grid_rows: usize,
    pub grid_columns: usize,
    /// Per-image shape `[rows, columns, channels]`.
    pub image_dims: [usize; 3],
    /// Channels-last pixels of the `grid_rows * grid_columns` images, in order.
    pub pixels: Vec<f32>,
}

impl SampleGrid {
    /// Takes the first `grid_rows * grid_columns` images.
    ///
    /// # Shapes
    ///   - images [n, rows, columns, channels], n >= grid_rows * grid_columns
    pub fn from_images<B: Backend>(
        images: Tensor<B, 4>,
        grid_rows: usize,
        grid_columns: usize,
    ) -> Result<Self, GanError> {
        let [n, rows, columns, channels] = images.dims();
        let cells = grid_rows * grid_columns;
        if cells == 0 || n < cells {
            return Err(GanError::precondition(
                "images",
                format!("a {grid_rows}x{grid_columns} grid needs {cells} images, found {n}"),
            ));
        }
        let pixels = images
            .narrow(0, 0, cells)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| GanError::Data(format!("{e:?}")))?;

        Ok(Self {
            grid_rows,
            grid_columns,
            image_dims: [rows, columns, channels],
            pixels,
        })
    }

    /// Picture size as `(width, height)`.
    pub fn size(&self) -> (u32, u32) {
        let [rows, columns, _] = self.image_dims;
        (
            (self.grid_columns * columns) as u32,
            (self.grid_rows * rows) as u32,
        )
    }

    /// Channel values of the pixel at picture coordinates `(x, y)`, scaled to bytes.
    fn pixel<const C: usize>(&self, x: u32, y: u32) -> [u8; C] {
        let [rows, columns, channels] = self.image_dims;
        let (x, y) = (x as usize, y as usize);
        let cell = (y / rows) * self.grid_columns + x / columns;
        let offset = ((cell * rows + y % rows) * columns + x % columns) * channels;
        std::array::from_fn(|ch| to_byte(self.pixels[offset + ch]))
    }

    /// One, three and four channels map to grayscale, RGB and RGBA.
    pub fn to_image(&self) -> Result<DynamicImage, GanError> {
        let (width, height) = self.size();
        let image = match self.image_dims[2] {
            1 => DynamicImage::ImageLuma8(ImageBuffer::from_fn(width, height, |x, y| {
                Luma(self.pixel::<1>(x, y))
            })),
            3 => DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
                Rgb(self.pixel::<3>(x, y))
            })),
            4 => DynamicImage::ImageRgba8(ImageBuffer::from_fn(width, height, |x, y| {
                Rgba(self.pixel::<4>(x, y))
            })),
            channels => {
                return Err(GanError::precondition(
                    "channels",
                    format!("sample grids support 1, 3 or 4 channels, found {channels}"),
                ));
            }
        };
        Ok(image)
    }
}

fn to_byte(value: f32) -> u8 {
    num_traits::clamp(value * 255.0, 0.0, 255.0).round() as u8
}

/// Destination of the sample grids emitted at save intervals.
pub trait SampleSink {
    fn save(&mut self, step: usize, grid: &SampleGrid) -> Result<(), GanError>;
}

impl<S: SampleSink + ?Sized> SampleSink for &mut S {
    fn save(&mut self, step: usize, grid: &SampleGrid) -> Result<(), GanError> {
        (**self).save(step, grid)
    }
}

/// Writes grids as `<dir>/<prefix>_<step>.png`, the step zero-padded to six digits.
#[derive(Debug, Clone)]
pub struct PngSampleWriter {
    dir: PathBuf,
    prefix: String,
}

impl PngSampleWriter {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, step: usize) -> PathBuf {
        self.dir.join(format!("{}_{step:06}.png", self.prefix))
    }
}

impl SampleSink for PngSampleWriter {
    fn save(&mut self, step: usize, grid: &SampleGrid) -> Result<(), GanError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(step);
        grid.to_image()?
            .save(&path)
            .map_err(|source| GanError::Sample {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), "saved sample grid");
        Ok(())
    }
}
