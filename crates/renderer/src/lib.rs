//! Map rendering for decoded forecast fields.
//!
//! Values are clamped to a fixed per-field [`ColorScale`], resampled onto a
//! Plate Carrée [`MapProjection`], composited with a static basemap,
//! graticule and legend, and encoded as a deterministic PNG.

pub mod basemap;
pub mod color_scale;
pub mod error;
pub mod legend;
pub mod png;
pub mod projection;
pub mod render;

pub use basemap::{draw_graticule, Basemap};
pub use color_scale::{parse_hex_color, ColorScale, ColorScaleTable, Rgba, PALETTE_LEVELS};
pub use error::{RenderError, RenderResult};
pub use projection::{Interpolation, MapProjection};
pub use render::{render, MapArtifact, MapRenderer, MapStyle};
