//! Field → map image.

use std::path::{Path, PathBuf};
use std::time::Instant;

use forecast_common::{write_atomic, Field};
use serde::{Deserialize, Serialize};
use tiny_skia::{Pixmap, PremultipliedColorU8};
use tracing::debug;

use crate::basemap::{draw_graticule, Basemap};
use crate::color_scale::{ColorScale, Rgba};
use crate::error::{RenderError, RenderResult};
use crate::legend::{draw_legend, premultiplied};
use crate::png::create_png_auto;
use crate::projection::MapProjection;

/// A rendered image on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapArtifact {
    pub path: PathBuf,
    /// Encoded size in bytes
    pub bytes: u64,
    /// CRC32 of the encoded image
    pub crc32: u32,
    pub width: u32,
    pub height: u32,
}

/// Static decorations composited over every map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapStyle {
    pub basemap: Option<Basemap>,
    pub basemap_color: Rgba,
    /// Degrees between graticule lines; `None` disables the graticule
    pub graticule_spacing: Option<f64>,
    pub graticule_color: Rgba,
    /// Height of the legend strip below the map; 0 disables it
    pub legend_height: u32,
}

impl Default for MapStyle {
    fn default() -> Self {
        Self {
            basemap: None,
            basemap_color: [0, 0, 0, 255],
            graticule_spacing: None,
            graticule_color: [128, 128, 128, 255],
            legend_height: 0,
        }
    }
}

/// Renders fields with a fixed [`MapStyle`].
#[derive(Debug, Clone, Default)]
pub struct MapRenderer {
    style: MapStyle,
}

impl MapRenderer {
    pub fn new(style: MapStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &MapStyle {
        &self.style
    }

    /// Render `field` and write the PNG atomically to `artifact_path`.
    pub fn render(
        &self,
        field: &Field,
        scale: &ColorScale,
        projection: &MapProjection,
        artifact_path: &Path,
    ) -> RenderResult<MapArtifact> {
        let started = Instant::now();
        let (png, width, height) = self.encode(field, scale, projection)?;
        write_atomic(artifact_path, &png)?;

        debug!(
            field = %field.name,
            hour = %field.forecast_hour,
            path = %artifact_path.display(),
            bytes = png.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Rendered map"
        );

        Ok(MapArtifact {
            path: artifact_path.to_path_buf(),
            bytes: png.len() as u64,
            crc32: crc32fast::hash(&png),
            width,
            height,
        })
    }

    /// Render `field` to PNG bytes. Returns the image and its size.
    pub fn encode(
        &self,
        field: &Field,
        scale: &ColorScale,
        projection: &MapProjection,
    ) -> RenderResult<(Vec<u8>, u32, u32)> {
        let pixmap = self.compose(field, scale, projection)?;
        let (width, height) = (pixmap.width(), pixmap.height());

        let rgba: Vec<u8> = pixmap
            .pixels()
            .iter()
            .flat_map(|p| {
                let c = p.demultiply();
                [c.red(), c.green(), c.blue(), c.alpha()]
            })
            .collect();

        let png = create_png_auto(&rgba, width as usize, height as usize)?;
        Ok((png, width, height))
    }

    /// Data layer, then graticule and basemap, then the legend strip.
    fn compose(
        &self,
        field: &Field,
        scale: &ColorScale,
        projection: &MapProjection,
    ) -> RenderResult<Pixmap> {
        let width = projection.width;
        let height = projection.height + self.style.legend_height;
        let mut pixmap = Pixmap::new(width, height).ok_or(RenderError::Canvas { width, height })?;

        let values = projection.resample(field);
        // One premultiplied color per palette level, computed once
        let lut: Vec<PremultipliedColorU8> = scale.lut().iter().map(|&c| premultiplied(c)).collect();
        for (px, &value) in pixmap.pixels_mut().iter_mut().zip(&values) {
            *px = match scale.level(value) {
                Some(level) => lut[level],
                None => PremultipliedColorU8::TRANSPARENT,
            };
        }

        if let Some(spacing) = self.style.graticule_spacing {
            draw_graticule(&mut pixmap, projection, spacing, self.style.graticule_color);
        }
        if let Some(basemap) = &self.style.basemap {
            basemap.draw(&mut pixmap, projection, self.style.basemap_color);
        }
        // Decorations may overrun the map area; the legend covers them
        draw_legend(&mut pixmap, projection.height, self.style.legend_height, scale);

        Ok(pixmap)
    }
}

/// Render with no background decorations.
pub fn render(
    field: &Field,
    color_scale: &ColorScale,
    map_projection: &MapProjection,
    artifact_path: &Path,
) -> RenderResult<MapArtifact> {
    MapRenderer::default().render(field, color_scale, map_projection, artifact_path)
}
