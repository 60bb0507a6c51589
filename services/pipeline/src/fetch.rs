//! Grid file downloads.
//!
//! Each hour's file streams into a uniquely named temp file next to its
//! final path, is checked for complete GRIB2 framing, and only then renamed
//! into place. A file already on disk that passes the same check is reused.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use forecast_common::{FailureReason, ForecastHour, RunId};
use futures::stream::{self, StreamExt};
use grib2_parser::{validate_file, Grib2Error};
use metrics::counter;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::ModelConfig;
use crate::retry::{RetryPolicy, Transient};
use crate::source::{RemoteLayout, RemoteSource, SourceError};

/// A validated GRIB2 file on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridFile {
    pub run: RunId,
    pub hour: ForecastHour,
    pub path: PathBuf,
    pub bytes: u64,
}

#[derive(Debug)]
pub enum FetchResult {
    Downloaded(GridFile),
    AlreadyPresent(GridFile),
    /// The archive answered 404; the hour may appear later.
    NotYetPublished { url: String },
    Failed(FetchError),
}

impl FetchResult {
    pub fn grid_file(&self) -> Option<&GridFile> {
        match self {
            FetchResult::Downloaded(file) | FetchResult::AlreadyPresent(file) => Some(file),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FetchResult::Downloaded(_) => "downloaded",
            FetchResult::AlreadyPresent(_) => "already_present",
            FetchResult::NotYetPublished { .. } => "not_yet_published",
            FetchResult::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Download of {url} failed after {attempts} attempts: {source}")]
    Network {
        url: String,
        attempts: u32,
        #[source]
        source: SourceError,
    },

    #[error("Download of {url} rejected with HTTP {status}")]
    Rejected { url: String, status: u16 },

    #[error("Download of {url} still invalid after {attempts} attempts: {source}")]
    InvalidBody {
        url: String,
        attempts: u32,
        #[source]
        source: Grib2Error,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            FetchError::InvalidBody { .. } => FailureReason::CorruptFile,
            FetchError::Network { .. } | FetchError::Rejected { .. } | FetchError::Io { .. } => {
                FailureReason::NetworkFailure
            }
        }
    }
}

/// Failure of a single download attempt.
#[derive(Debug)]
enum AttemptError {
    Source(SourceError),
    Invalid(Grib2Error),
    Io(std::io::Error),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Source(e) => e.fmt(f),
            AttemptError::Invalid(e) => write!(f, "invalid GRIB2 body: {}", e),
            AttemptError::Io(e) => write!(f, "temp file: {}", e),
        }
    }
}

impl Transient for AttemptError {
    fn is_transient(&self) -> bool {
        match self {
            AttemptError::Source(e) => e.is_transient(),
            // Truncated or garbled bodies are worth another try
            AttemptError::Invalid(_) => true,
            AttemptError::Io(_) => false,
        }
    }
}

pub struct Fetcher {
    source: Arc<dyn RemoteSource>,
    layout: RemoteLayout,
    policy: RetryPolicy,
    data_dir: PathBuf,
    max_concurrent: usize,
}

impl Fetcher {
    pub fn new(source: Arc<dyn RemoteSource>, config: &ModelConfig) -> Self {
        Self {
            source,
            layout: RemoteLayout::new(&config.source),
            policy: config.retry_policy(),
            data_dir: config.storage.data_dir.clone(),
            max_concurrent: config.processing.max_concurrent_hours.max(1),
        }
    }

    /// `<data_dir>/<run_id>/<remote file name>`
    pub fn grid_path(&self, run: &RunId, hour: ForecastHour) -> PathBuf {
        self.data_dir
            .join(run.to_string())
            .join(self.layout.file_name(run, hour))
    }

    /// Fetch every hour with bounded concurrency.
    pub async fn fetch(
        &self,
        run: &RunId,
        hours: &[ForecastHour],
    ) -> BTreeMap<ForecastHour, FetchResult> {
        stream::iter(hours.iter().copied())
            .map(|hour| async move { (hour, self.fetch_hour(run, hour).await) })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await
    }

    #[instrument(skip(self, run, hour), fields(run = %run, hour = %hour))]
    pub async fn fetch_hour(&self, run: &RunId, hour: ForecastHour) -> FetchResult {
        let path = self.grid_path(run, hour);
        let grid_file = |bytes| GridFile {
            run: *run,
            hour,
            path: path.clone(),
            bytes,
        };

        if let Some(bytes) = existing_valid(&path).await {
            debug!(path = %path.display(), "Grid file already present");
            counter!("aigfs_fetch_results_total", "result" => "already_present").increment(1);
            return FetchResult::AlreadyPresent(grid_file(bytes));
        }

        let dir = match path.parent() {
            Some(dir) => dir.to_path_buf(),
            None => self.data_dir.clone(),
        };
        if let Err(source) = tokio::fs::create_dir_all(&dir).await {
            return FetchResult::Failed(FetchError::Io {
                path: dir.display().to_string(),
                source,
            });
        }

        let url = self.layout.file_url(run, hour);
        let outcome = self
            .policy
            .run("download", |attempt| self.attempt(&url, &dir, attempt))
            .await;

        let result = match outcome {
            Ok((tmp, bytes)) => match tmp.persist(&path) {
                Ok(_) => {
                    info!(path = %path.display(), bytes, "Downloaded grid file");
                    counter!("aigfs_fetch_bytes_total").increment(bytes);
                    FetchResult::Downloaded(grid_file(bytes))
                }
                Err(e) => FetchResult::Failed(FetchError::Io {
                    path: path.display().to_string(),
                    source: e.error,
                }),
            },
            Err((AttemptError::Source(e), _)) if e.is_not_found() => {
                debug!(url = %url, "Grid file not yet published");
                FetchResult::NotYetPublished { url }
            }
            Err((AttemptError::Source(e @ SourceError::Status { status, .. }), _))
                if e.is_client_error() =>
            {
                FetchResult::Failed(FetchError::Rejected { url, status })
            }
            Err((AttemptError::Source(source), attempts)) => {
                FetchResult::Failed(FetchError::Network {
                    url,
                    attempts,
                    source,
                })
            }
            Err((AttemptError::Invalid(source), attempts)) => {
                FetchResult::Failed(FetchError::InvalidBody {
                    url,
                    attempts,
                    source,
                })
            }
            Err((AttemptError::Io(source), _)) => FetchResult::Failed(FetchError::Io {
                path: dir.display().to_string(),
                source,
            }),
        };

        if let FetchResult::Failed(e) = &result {
            warn!(error = %e, "Grid file fetch failed");
        }
        counter!("aigfs_fetch_results_total", "result" => result.label()).increment(1);
        result
    }

    /// One download into a fresh temp file in `dir`. The temp file is
    /// removed when dropped, so only a validated body survives.
    async fn attempt(
        &self,
        url: &str,
        dir: &Path,
        attempt: u32,
    ) -> Result<(NamedTempFile, u64), AttemptError> {
        counter!("aigfs_fetch_attempts_total").increment(1);
        debug!(url, attempt, "Downloading");

        let tmp = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(".part")
            .tempfile_in(dir)
            .map_err(AttemptError::Io)?;

        let bytes = self
            .source
            .download(url, tmp.path())
            .await
            .map_err(AttemptError::Source)?;

        let tmp_path = tmp.path().to_path_buf();
        let messages = tokio::task::spawn_blocking(move || validate_file(&tmp_path))
            .await
            .map_err(|e| AttemptError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
            .map_err(AttemptError::Invalid)?;

        debug!(bytes, messages = messages.len(), "Download passed framing check");
        Ok((tmp, bytes))
    }
}

/// Size of the file at `path` if it exists and is well-framed GRIB2. A
/// damaged file is removed so it gets downloaded again.
async fn existing_valid(path: &Path) -> Option<u64> {
    let metadata = tokio::fs::metadata(path).await.ok()?;

    let owned = path.to_path_buf();
    let valid = tokio::task::spawn_blocking(move || validate_file(&owned))
        .await
        .ok()?;

    match valid {
        Ok(_) => Some(metadata.len()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Discarding damaged grid file");
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove damaged grid file");
            }
            None
        }
    }
}
