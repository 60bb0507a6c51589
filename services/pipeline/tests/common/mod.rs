//! In-memory remote archive and config helpers for pipeline tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use forecast_common::{ForecastHour, RunId};
use pipeline::{ModelConfig, RemoteLayout, RemoteSource, SourceError};
use test_utils::surface_file;

pub const BASE_URL: &str = "http://mock.test/aigfs";

/// Canned answer for one request.
#[derive(Debug, Clone)]
pub enum Reply {
    Body(Vec<u8>),
    Status(u16),
    Timeout,
}

/// Remote archive served from memory. Each URL holds a queue of replies;
/// the last one repeats. Unknown URLs answer 404.
#[derive(Default)]
pub struct MockSource {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<String>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, url: impl Into<String>, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .insert(url.into(), VecDeque::from([reply]));
    }

    /// Replies served in order, the last repeating.
    pub fn sequence(&self, url: impl Into<String>, replies: Vec<Reply>) {
        self.replies
            .lock()
            .unwrap()
            .insert(url.into(), replies.into());
    }

    pub fn remove(&self, url: &str) {
        self.replies.lock().unwrap().remove(url);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, url: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    fn reply(&self, url: &str) -> Reply {
        self.requests.lock().unwrap().push(url.to_string());
        let mut replies = self.replies.lock().unwrap();
        match replies.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or(Reply::Status(404)),
            None => Reply::Status(404),
        }
    }

    fn body(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        match self.reply(url) {
            Reply::Body(bytes) => Ok(bytes),
            Reply::Status(404) => Err(SourceError::NotFound {
                url: url.to_string(),
            }),
            Reply::Status(status) => Err(SourceError::Status {
                url: url.to_string(),
                status,
            }),
            Reply::Timeout => Err(SourceError::Transport {
                url: url.to_string(),
                reason: "operation timed out".to_string(),
            }),
        }
    }
}

#[async_trait]
impl RemoteSource for MockSource {
    async fn get_text(&self, url: &str) -> Result<String, SourceError> {
        let bytes = self.body(url)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, SourceError> {
        let bytes = self.body(url)?;
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|source| SourceError::Io {
                path: dest.display().to_string(),
                source,
            })?;
        Ok(bytes.len() as u64)
    }
}

/// Small, fast configuration rooted at `root`: hours 0 to 9 every 3,
/// millisecond retry delays and a tiny map.
pub fn test_config(root: &Path) -> ModelConfig {
    let yaml = format!(
        r#"
model:
  id: aigfs
  name: "AIGFS test"
source:
  base_url: "{base}"
schedule:
  forecast_hours: {{ start: 0, end: 9, step: 3 }}
  delay_hours: 4
  lookback_hours: 48
fetch:
  max_attempts: 3
  initial_retry_delay_ms: 1
  max_retry_delay_ms: 4
processing:
  max_concurrent_hours: 2
  render_workers: 2
fields: [t2m, prmsl, wind10]
map:
  width: 72
  height: 36
  graticule_spacing: 30.0
  legend_height: 12
storage:
  data_dir: "{data}"
  output_dir: "{output}"
"#,
        base = BASE_URL,
        data = root.join("grib").display(),
        output = root.join("maps").display(),
    );
    ModelConfig::from_yaml(&yaml).unwrap()
}

pub fn run_id(s: &str) -> RunId {
    s.parse().unwrap()
}

fn run_tuple(run: &RunId) -> (u16, u8, u8, u8) {
    use chrono::Datelike;
    let date = run.date();
    (
        date.year() as u16,
        date.month() as u8,
        date.day() as u8,
        run.cycle().hour() as u8,
    )
}

/// Publish `hours` of `run`: directory listing, index files and grid files.
pub fn publish(mock: &MockSource, config: &ModelConfig, run: &RunId, hours: &[u16]) {
    let layout = RemoteLayout::new(&config.source);
    let mut listing = String::from("<html><body><pre>\n");

    for &h in hours {
        let hour = ForecastHour::new(h);
        let file = surface_file(run_tuple(run), h as u32);
        mock.set(layout.file_url(run, hour), Reply::Body(file.bytes));
        mock.set(layout.index_url(run, hour), Reply::Body(file.inventory.into_bytes()));
        listing.push_str(&format!(
            "<a href=\"{0}\">{0}</a>\n<a href=\"{1}\">{1}</a>\n",
            layout.file_name(run, hour),
            layout.index_name(run, hour)
        ));
    }

    listing.push_str("</pre></body></html>\n");
    mock.set(layout.directory_url(run), Reply::Body(listing.into_bytes()));
}

/// The grid file of `run`/`hour` with its first section length overwritten:
/// framing stays valid but the sections cannot be parsed.
pub fn corrupt_grid_file(run: &RunId, hour: u16) -> Vec<u8> {
    let mut bytes = surface_file(run_tuple(run), hour as u32).bytes;
    bytes[16..20].copy_from_slice(&[0xFF; 4]);
    bytes
}
