//! Renderer error types.

use forecast_common::CommonError;
use thiserror::Error;

pub type RenderResult<T> = Result<T, RenderError>;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("No color scale defined for field '{0}'")]
    UnknownScale(String),

    #[error("Invalid color scale '{name}': {reason}")]
    InvalidColorScale { name: String, reason: String },

    #[error("Invalid map projection: {0}")]
    InvalidProjection(String),

    #[error("Invalid basemap: {0}")]
    InvalidBasemap(String),

    #[error("Failed to allocate {width}x{height} canvas")]
    Canvas { width: u32, height: u32 },

    #[error("PNG encoding failed: {0}")]
    Encode(String),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] CommonError),
}
