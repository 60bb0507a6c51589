//! Plate Carrée map projection and grid resampling.

use forecast_common::{BoundingBox, Field};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{RenderError, RenderResult};

/// How grid values are sampled at pixel centers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    #[default]
    Nearest,
    Bilinear,
}

/// Equirectangular target map: geographic extent and pixel size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapProjection {
    pub bbox: BoundingBox,
    pub width: u32,
    pub height: u32,
    pub interpolation: Interpolation,
}

impl MapProjection {
    pub fn new(
        bbox: BoundingBox,
        width: u32,
        height: u32,
        interpolation: Interpolation,
    ) -> RenderResult<Self> {
        bbox.validate()
            .map_err(|e| RenderError::InvalidProjection(e.to_string()))?;
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidProjection(format!(
                "map size {}x{} must be non-zero",
                width, height
            )));
        }
        Ok(Self {
            bbox,
            width,
            height,
            interpolation,
        })
    }

    /// Whole-globe map, nearest-neighbour sampling.
    pub fn global(width: u32, height: u32) -> RenderResult<Self> {
        Self::new(BoundingBox::global(), width, height, Interpolation::Nearest)
    }

    fn x_scale(&self) -> f64 {
        self.width as f64 / self.bbox.width()
    }

    fn y_scale(&self) -> f64 {
        self.height as f64 / self.bbox.height()
    }

    /// Geographic coordinate `(lon, lat)` of the center of pixel `(x, y)`.
    pub fn pixel_center(&self, x: u32, y: u32) -> (f64, f64) {
        let lon = self.bbox.min_x + (x as f64 + 0.5) / self.x_scale();
        let lat = self.bbox.max_y - (y as f64 + 0.5) / self.y_scale();
        (lon, lat)
    }

    /// Pixel-space position of a geographic coordinate (may be off-canvas).
    pub fn to_pixel(&self, lon: f64, lat: f64) -> (f32, f32) {
        let x = (lon - self.bbox.min_x) * self.x_scale();
        let y = (self.bbox.max_y - lat) * self.y_scale();
        (x as f32, y as f32)
    }

    /// Resample `field` onto the map, row-major; `NaN` where there is no data.
    pub fn resample(&self, field: &Field) -> Vec<f32> {
        let width = self.width as usize;
        let mut out = vec![f32::NAN; width * self.height as usize];

        out.par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, px) in row.iter_mut().enumerate() {
                    let (lon, lat) = self.pixel_center(x as u32, y as u32);
                    let value = match self.interpolation {
                        Interpolation::Nearest => field.sample(lat, lon),
                        Interpolation::Bilinear => sample_bilinear(field, lat, lon),
                    };
                    *px = value.unwrap_or(f32::NAN);
                }
            });

        out
    }
}

/// Bilinear sample; missing when any of the four neighbours is missing.
fn sample_bilinear(field: &Field, lat: f64, lon: f64) -> Option<f32> {
    let grid = &field.grid;
    let (x, y) = grid.fractional_index(lat, lon)?;

    let y = y.clamp(0.0, (grid.ny - 1) as f64);
    let j0 = y.floor() as usize;
    let j1 = (j0 + 1).min(grid.ny - 1);
    let dy = (y - j0 as f64) as f32;

    let (i0, i1, dx) = if grid.is_global_lon() {
        let i0 = x.floor() as usize % grid.nx;
        (i0, (i0 + 1) % grid.nx, (x - x.floor()) as f32)
    } else {
        let x = x.clamp(0.0, (grid.nx - 1) as f64);
        let i0 = x.floor() as usize;
        (i0, (i0 + 1).min(grid.nx - 1), (x - i0 as f64) as f32)
    };

    let v00 = field.get(i0, j0)?;
    let v10 = field.get(i1, j0)?;
    let v01 = field.get(i0, j1)?;
    let v11 = field.get(i1, j1)?;

    let top = v00 * (1.0 - dx) + v10 * dx;
    let bottom = v01 * (1.0 - dx) + v11 * dx;
    Some(top * (1.0 - dy) + bottom * dy)
}
