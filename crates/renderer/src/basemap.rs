//! Static map background: basemap lines from GeoJSON and the graticule.
//!
//! All strokes are one-pixel, non-antialiased lines in a single opaque
//! color, so the background adds at most a couple of colors to the image
//! and draws identically on every run.

use std::path::Path;

use serde_json::Value;
use tiny_skia::{Paint, PathBuilder, Pixmap, Stroke, Transform};
use tracing::info;

use crate::color_scale::Rgba;
use crate::error::{RenderError, RenderResult};
use crate::projection::MapProjection;

/// A polyline in `(lon, lat)` degrees.
pub type LineString = Vec<(f64, f64)>;

/// Coastlines, borders and similar outlines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Basemap {
    lines: Vec<LineString>,
}

impl Basemap {
    pub fn new(lines: Vec<LineString>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[LineString] {
        &self.lines
    }

    /// Parse a GeoJSON document: a FeatureCollection, a Feature or a bare
    /// geometry. Polygons contribute their rings as lines; points are
    /// ignored.
    pub fn from_geojson(text: &str) -> RenderResult<Self> {
        let doc: Value = serde_json::from_str(text)?;
        let mut lines = Vec::new();
        collect_object(&doc, &mut lines)?;
        Ok(Self { lines })
    }

    pub fn from_file(path: &Path) -> RenderResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| RenderError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let basemap = Self::from_geojson(&text)?;
        info!(path = %path.display(), lines = basemap.lines.len(), "Loaded basemap");
        Ok(basemap)
    }

    /// Stroke every line onto `pixmap`. Lines are repeated at ±360° when the
    /// map extent reaches past the antimeridian.
    pub fn draw(&self, pixmap: &mut Pixmap, projection: &MapProjection, color: Rgba) {
        let paint = line_paint(color);
        let stroke = hairline();
        let bbox = &projection.bbox;

        for shift in [-360.0, 0.0, 360.0] {
            for line in &self.lines {
                let (lo, hi) = line
                    .iter()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(lon, _)| {
                        (lo.min(lon + shift), hi.max(lon + shift))
                    });
                if hi < bbox.min_x || lo > bbox.max_x {
                    continue;
                }

                let mut pb = PathBuilder::new();
                let mut prev: Option<f64> = None;
                for &(lon, lat) in line {
                    let (x, y) = projection.to_pixel(lon + shift, lat);
                    match prev {
                        // Break the path where it crosses the antimeridian
                        Some(p) if (lon - p).abs() <= 180.0 => pb.line_to(x, y),
                        _ => pb.move_to(x, y),
                    }
                    prev = Some(lon);
                }
                if let Some(path) = pb.finish() {
                    pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
                }
            }
        }
    }
}

fn collect_object(value: &Value, lines: &mut Vec<LineString>) -> RenderResult<()> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| RenderError::InvalidBasemap("object without \"type\"".to_string()))?;

    match kind {
        "FeatureCollection" => {
            let features = value
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| RenderError::InvalidBasemap("features must be an array".to_string()))?;
            for feature in features {
                collect_object(feature, lines)?;
            }
        }
        "Feature" => match value.get("geometry") {
            Some(Value::Null) | None => {}
            Some(geometry) => collect_object(geometry, lines)?,
        },
        "GeometryCollection" => {
            let geometries = value
                .get("geometries")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    RenderError::InvalidBasemap("geometries must be an array".to_string())
                })?;
            for geometry in geometries {
                collect_object(geometry, lines)?;
            }
        }
        "Point" | "MultiPoint" => {}
        "LineString" => lines.push(positions(coordinates(value)?)?),
        "MultiLineString" | "Polygon" => {
            for ring in as_array(coordinates(value)?)? {
                lines.push(positions(ring)?);
            }
        }
        "MultiPolygon" => {
            for polygon in as_array(coordinates(value)?)? {
                for ring in as_array(polygon)? {
                    lines.push(positions(ring)?);
                }
            }
        }
        other => {
            return Err(RenderError::InvalidBasemap(format!(
                "unsupported GeoJSON type '{}'",
                other
            )))
        }
    }
    Ok(())
}

fn coordinates(geometry: &Value) -> RenderResult<&Value> {
    geometry
        .get("coordinates")
        .ok_or_else(|| RenderError::InvalidBasemap("geometry without coordinates".to_string()))
}

fn as_array(value: &Value) -> RenderResult<&Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| RenderError::InvalidBasemap("expected a coordinate array".to_string()))
}

fn positions(value: &Value) -> RenderResult<LineString> {
    as_array(value)?
        .iter()
        .map(|position| {
            let lon = position.get(0).and_then(Value::as_f64);
            let lat = position.get(1).and_then(Value::as_f64);
            match (lon, lat) {
                (Some(lon), Some(lat)) => Ok((lon, lat)),
                _ => Err(RenderError::InvalidBasemap(format!(
                    "bad position {}",
                    position
                ))),
            }
        })
        .collect()
}

/// Meridians and parallels every `spacing` degrees, including 0°.
pub fn draw_graticule(pixmap: &mut Pixmap, projection: &MapProjection, spacing: f64, color: Rgba) {
    if !(spacing.is_finite() && spacing > 0.0) {
        return;
    }
    let paint = line_paint(color);
    let stroke = hairline();
    let bbox = &projection.bbox;

    let mut lon = (bbox.min_x / spacing).ceil() * spacing;
    while lon <= bbox.max_x {
        let (x0, y0) = projection.to_pixel(lon, bbox.max_y);
        let (x1, y1) = projection.to_pixel(lon, bbox.min_y);
        stroke_segment(pixmap, (x0, y0), (x1, y1), &paint, &stroke);
        lon += spacing;
    }

    let mut lat = (bbox.min_y / spacing).ceil() * spacing;
    while lat <= bbox.max_y {
        let (x0, y0) = projection.to_pixel(bbox.min_x, lat);
        let (x1, y1) = projection.to_pixel(bbox.max_x, lat);
        stroke_segment(pixmap, (x0, y0), (x1, y1), &paint, &stroke);
        lat += spacing;
    }
}

pub(crate) fn line_paint(color: Rgba) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
    paint.anti_alias = false;
    paint
}

pub(crate) fn hairline() -> Stroke {
    Stroke {
        width: 1.0,
        ..Stroke::default()
    }
}

pub(crate) fn stroke_segment(
    pixmap: &mut Pixmap,
    from: (f32, f32),
    to: (f32, f32),
    paint: &Paint,
    stroke: &Stroke,
) {
    let mut pb = PathBuilder::new();
    pb.move_to(from.0, from.1);
    pb.line_to(to.0, to.1);
    if let Some(path) = pb.finish() {
        pixmap.stroke_path(&path, paint, stroke, Transform::identity(), None);
    }
}
