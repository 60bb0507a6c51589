//! AIGFS forecast map pipeline.
//!
//! One invocation resolves the newest published run on the remote archive,
//! downloads its grid files, decodes the configured fields and renders a
//! map per field and forecast hour, recording the results in a manifest.

pub mod config;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod metrics;
pub mod orchestrator;
pub mod resolver;
pub mod retention;
pub mod retry;
pub mod source;

pub use config::{MissingFieldPolicy, ModelConfig};
pub use error::{PipelineError, PipelineResult};
pub use fetch::{FetchError, FetchResult, Fetcher, GridFile};
pub use manifest::{FieldEntry, FieldStatus, HourEntry, Manifest, ManifestError};
pub use orchestrator::{artifact_relative_path, HourOutcome, Orchestrator, RunReport};
pub use resolver::{ResolveError, RunResolver};
pub use retention::RetentionStats;
pub use retry::{RetryPolicy, Transient};
pub use source::{HttpSource, RemoteLayout, RemoteSource, SourceError};
