//! Error types shared by the pipeline crates.

use thiserror::Error;

/// Result type alias using CommonError.
pub type CommonResult<T> = Result<T, CommonError>;

#[derive(Debug, Error)]
pub enum CommonError {
    #[error("Invalid run identifier: {0} (expected YYYYMMDDHH with HH in 00/06/12/18)")]
    InvalidRunId(String),

    #[error("Invalid initialization cycle: {0}")]
    InvalidCycle(u32),

    #[error("Invalid forecast hour: {0}")]
    InvalidForecastHour(String),

    #[error("Invalid bounding box: {0} (expected minx,miny,maxx,maxy)")]
    InvalidBoundingBox(String),

    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Illegal forecast hour transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Failed to persist {path}: {reason}")]
    Persist { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
