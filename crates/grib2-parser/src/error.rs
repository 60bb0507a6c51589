//! Error types for GRIB2 parsing and decoding.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Grib2Error {
    #[error("Invalid GRIB2 format: {0}")]
    InvalidFormat(String),

    #[error("Invalid section {section}: {reason}")]
    InvalidSection { section: u8, reason: String },

    #[error("Truncated message at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Unsupported template {template} in section {section}")]
    UnsupportedTemplate { section: u8, template: u16 },

    #[error("Unpacking error: {0}")]
    UnpackingError(String),

    #[error("Invalid inventory line {line}: {reason}")]
    InvalidInventory { line: usize, reason: String },

    #[error(transparent)]
    Grid(#[from] forecast_common::CommonError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by [`crate::decode`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The container or one of its messages could not be parsed or unpacked.
    /// The grid file should be discarded, not decoded again.
    #[error("Corrupt grid file {path}: {source}")]
    CorruptFile {
        path: String,
        #[source]
        source: Grib2Error,
    },

    #[error("Field {field} not found in {path}")]
    FieldNotFound { field: String, path: String },

    #[error("Unknown field {0}: not in the field catalogue")]
    UnknownField(String),

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl DecodeError {
    pub fn is_corrupt(&self) -> bool {
        matches!(self, DecodeError::CorruptFile { .. })
    }
}
