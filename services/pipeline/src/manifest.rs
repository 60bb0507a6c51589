//! Persistent record of rendered artifacts, read by the web layer.
//!
//! Stored as pretty JSON at `<output_dir>/manifest.json`. Every map is a
//! `BTreeMap` and no timestamps are recorded, so processing the same inputs
//! twice produces the same bytes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use forecast_common::{write_atomic, CommonError, FailureReason, ForecastHour, HourState, RunId};
use renderer::MapArtifact;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to write manifest: {0}")]
    Write(#[from] CommonError),

    #[error("Failed to serialize manifest: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Manifest write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub runs: BTreeMap<RunId, RunEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunEntry {
    #[serde(default)]
    pub hours: BTreeMap<ForecastHour, HourEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourEntry {
    /// `pending`, `rendered` or `failed`
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStatus {
    Rendered,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldEntry {
    pub status: FieldStatus,
    /// Image path relative to the output directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crc32: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

impl FieldEntry {
    pub fn rendered(relative_path: String, artifact: &MapArtifact) -> Self {
        Self {
            status: FieldStatus::Rendered,
            path: Some(relative_path),
            bytes: Some(artifact.bytes),
            crc32: Some(artifact.crc32),
            reason: None,
        }
    }

    pub fn failed(reason: FailureReason) -> Self {
        Self {
            status: FieldStatus::Failed,
            path: None,
            bytes: None,
            crc32: None,
            reason: Some(reason),
        }
    }

    pub fn is_rendered(&self) -> bool {
        self.status == FieldStatus::Rendered
    }
}

impl HourEntry {
    pub fn new(state: HourState, fields: BTreeMap<String, FieldEntry>) -> Self {
        Self {
            state: state.name().to_string(),
            reason: state.failure_reason(),
            fields,
        }
    }

    pub fn is_rendered(&self) -> bool {
        self.state == HourState::Rendered.name()
    }

    /// Whether this hour needs no more work: rendered, every field in
    /// `fields` accounted for, and every recorded image present under
    /// `output_dir`.
    pub fn is_settled<S: AsRef<str>>(&self, fields: &[S], output_dir: &Path) -> bool {
        self.is_rendered()
            && fields
                .iter()
                .all(|f| self.fields.contains_key(f.as_ref()))
            && self
                .fields
                .values()
                .filter(|f| f.is_rendered())
                .all(|f| f.path.as_ref().is_some_and(|p| output_dir.join(p).is_file()))
    }

    /// Recorded images that still exist on disk.
    pub fn present_fields(&self, output_dir: &Path) -> BTreeMap<String, FieldEntry> {
        self.fields
            .iter()
            .filter(|(_, f)| {
                f.is_rendered() && f.path.as_ref().is_some_and(|p| output_dir.join(p).is_file())
            })
            .map(|(name, f)| (name.clone(), f.clone()))
            .collect()
    }
}

impl Manifest {
    pub fn path(output_dir: &Path) -> PathBuf {
        output_dir.join(MANIFEST_FILE)
    }

    /// Load the manifest under `output_dir`. A missing or unreadable file
    /// yields an empty manifest; everything it described is re-derived.
    pub fn load(output_dir: &Path) -> Self {
        let path = Self::path(output_dir);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read manifest, starting empty");
                return Self::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(manifest) => {
                debug!(path = %path.display(), "Loaded manifest");
                manifest
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Manifest is malformed, starting empty");
                Self::default()
            }
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, ManifestError> {
        let mut json = serde_json::to_vec_pretty(self)?;
        json.push(b'\n');
        Ok(json)
    }

    /// Write atomically to `<output_dir>/manifest.json`.
    pub fn save(&self, output_dir: &Path) -> Result<(), ManifestError> {
        write_atomic(&Self::path(output_dir), &self.to_json()?)?;
        Ok(())
    }

    /// Like [`Manifest::save`], but the file write and fsync run on the
    /// blocking pool. The JSON is serialized before the write is handed off.
    pub async fn save_async(&self, output_dir: &Path) -> Result<(), ManifestError> {
        let json = self.to_json()?;
        let path = Self::path(output_dir);
        tokio::task::spawn_blocking(move || write_atomic(&path, &json)).await??;
        Ok(())
    }

    pub fn hour(&self, run: &RunId, hour: ForecastHour) -> Option<&HourEntry> {
        self.runs.get(run)?.hours.get(&hour)
    }

    pub fn record_hour(&mut self, run: RunId, hour: ForecastHour, entry: HourEntry) {
        self.runs.entry(run).or_default().hours.insert(hour, entry);
    }

    /// Drop every run not in `keep`, returning the removed run ids.
    pub fn retain_runs(&mut self, keep: &[RunId]) -> Vec<RunId> {
        let removed: Vec<RunId> = self
            .runs
            .keys()
            .filter(|id| !keep.contains(id))
            .copied()
            .collect();
        for id in &removed {
            self.runs.remove(id);
        }
        removed
    }
}
