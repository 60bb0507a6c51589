//! Remote data source: URL layout and the HTTP client behind a trait seam.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use forecast_common::{ForecastHour, RunId};
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::config::SourceConfig;
use crate::retry::Transient;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Not found: {url}")]
    NotFound { url: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("Failed writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl SourceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::NotFound { .. })
    }

    /// A 4xx other than 404: the request itself is wrong.
    pub fn is_client_error(&self) -> bool {
        matches!(self, SourceError::Status { status, .. } if (400..500).contains(status) && *status != 429)
    }
}

impl Transient for SourceError {
    fn is_transient(&self) -> bool {
        match self {
            SourceError::Transport { .. } => true,
            SourceError::Status { status, .. } => *status >= 500 || *status == 429,
            SourceError::NotFound { .. } | SourceError::Io { .. } => false,
        }
    }
}

/// Read access to the remote archive.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch a small text resource (directory listing, inventory).
    async fn get_text(&self, url: &str) -> Result<String, SourceError>;

    /// Stream the body at `url` into the file at `dest`, replacing its
    /// contents. Returns the number of bytes written.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, SourceError>;
}

/// Deterministic remote paths for a run and forecast hour.
#[derive(Debug, Clone)]
pub struct RemoteLayout {
    base_url: String,
    directory_template: String,
    file_template: String,
    index_suffix: String,
}

impl RemoteLayout {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            directory_template: config.directory_template.trim_matches('/').to_string(),
            file_template: config.file_template.clone(),
            index_suffix: config.index_suffix.clone(),
        }
    }

    fn expand(template: &str, run: &RunId, hour: Option<ForecastHour>) -> String {
        let expanded = template
            .replace("{date}", &run.date_str())
            .replace("{cycle:02}", &format!("{:02}", run.cycle().hour()));
        match hour {
            Some(h) => expanded
                .replace("{forecast:03}", &format!("{:03}", h.hours()))
                .replace("{forecast:02}", &format!("{:02}", h.hours())),
            None => expanded,
        }
    }

    /// Directory listing URL, with a trailing slash.
    pub fn directory_url(&self, run: &RunId) -> String {
        format!(
            "{}/{}/",
            self.base_url,
            Self::expand(&self.directory_template, run, None)
        )
    }

    pub fn file_name(&self, run: &RunId, hour: ForecastHour) -> String {
        Self::expand(&self.file_template, run, Some(hour))
    }

    pub fn index_name(&self, run: &RunId, hour: ForecastHour) -> String {
        format!("{}{}", self.file_name(run, hour), self.index_suffix)
    }

    pub fn file_url(&self, run: &RunId, hour: ForecastHour) -> String {
        format!("{}{}", self.directory_url(run), self.file_name(run, hour))
    }

    pub fn index_url(&self, run: &RunId, hour: ForecastHour) -> String {
        format!("{}{}", self.directory_url(run), self.index_name(run, hour))
    }
}

/// [`RemoteSource`] over HTTP(S).
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .user_agent(concat!("aigfs-pipeline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Transport {
                url: config.base_url.clone(),
                reason: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, SourceError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport(url, e))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(SourceError::NotFound {
                url: url.to_string(),
            }),
            status => Err(SourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }
}

fn transport(url: &str, e: reqwest::Error) -> SourceError {
    SourceError::Transport {
        url: url.to_string(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl RemoteSource for HttpSource {
    #[instrument(skip(self))]
    async fn get_text(&self, url: &str) -> Result<String, SourceError> {
        let text = self
            .get(url)
            .await?
            .text()
            .await
            .map_err(|e| transport(url, e))?;
        debug!(bytes = text.len(), "Fetched text resource");
        Ok(text)
    }

    #[instrument(skip(self, dest), fields(dest = %dest.display()))]
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, SourceError> {
        let response = self.get(url).await?;
        let io_error = |source| SourceError::Io {
            path: dest.display().to_string(),
            source,
        };

        let mut file = tokio::fs::File::create(dest).await.map_err(io_error)?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transport(url, e))?;
            file.write_all(&chunk).await.map_err(io_error)?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(io_error)?;
        file.sync_all().await.map_err(io_error)?;
        debug!(bytes = written, "Download streamed");
        Ok(written)
    }
}
