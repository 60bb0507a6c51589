//! Errors that end a pipeline invocation.

use forecast_common::CommonError;
use renderer::RenderError;
use thiserror::Error;

use crate::manifest::ManifestError;
use crate::resolver::ResolveError;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Per-hour problems are recorded in the manifest instead; these abort the
/// whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("Invalid render setup: {0}")]
    Render(#[from] RenderError),

    #[error(transparent)]
    Common(#[from] CommonError),
}
