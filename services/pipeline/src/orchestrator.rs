//! Pipeline orchestration: resolve, fetch, decode and render every
//! configured forecast hour of a run.
//!
//! Hours are independent. Each one walks the [`HourState`] lifecycle and
//! settles as rendered, pending or failed; the manifest is saved after every
//! hour so an interrupted invocation resumes where it stopped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use forecast_common::{remove_if_exists, FailureReason, ForecastHour, HourState, Run, RunId};
use futures::stream::{self, StreamExt};
use grib2_parser::{decode, DecodeError, DecodedFile, FieldCatalog};
use metrics::{counter, histogram};
use renderer::{ColorScaleTable, MapProjection, MapRenderer, MapStyle};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{MissingFieldPolicy, ModelConfig};
use crate::error::PipelineResult;
use crate::fetch::{FetchResult, Fetcher, GridFile};
use crate::manifest::{FieldEntry, HourEntry, Manifest};
use crate::resolver::RunResolver;
use crate::retention::{self, RetentionStats};
use crate::source::RemoteSource;

/// `<run_id>/<fNNN>/<field>.png`, relative to the output directory.
pub fn artifact_relative_path(run: &RunId, hour: ForecastHour, field: &str) -> String {
    format!("{}/{}/{}.png", run, hour, field)
}

/// How one forecast hour settled.
#[derive(Debug, Clone, PartialEq)]
pub struct HourOutcome {
    pub state: HourState,
    pub reason: Option<FailureReason>,
    pub fields: BTreeMap<String, FieldEntry>,
    /// Settled by an earlier invocation; nothing was fetched or rendered
    pub reused: bool,
}

impl HourOutcome {
    fn settled(state: HourState, fields: BTreeMap<String, FieldEntry>) -> Self {
        Self {
            state,
            reason: state.failure_reason(),
            fields,
            reused: false,
        }
    }

    fn not_yet_published(fields: BTreeMap<String, FieldEntry>) -> Self {
        Self {
            state: HourState::Pending,
            reason: Some(FailureReason::NotYetPublished),
            fields,
            reused: false,
        }
    }

    fn reused(entry: &HourEntry) -> Self {
        Self {
            state: HourState::Rendered,
            reason: entry.reason,
            fields: entry.fields.clone(),
            reused: true,
        }
    }

    /// Metric/log label: the state name, or `skipped` when reused.
    pub fn label(&self) -> &'static str {
        if self.reused {
            "skipped"
        } else {
            self.state.name()
        }
    }

    pub fn rendered_fields(&self) -> usize {
        self.fields.values().filter(|f| f.is_rendered()).count()
    }

    fn to_entry(&self) -> HourEntry {
        HourEntry {
            state: self.state.name().to_string(),
            reason: self.reason,
            fields: self.fields.clone(),
        }
    }
}

/// Per-hour outcomes of one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run: Run,
    pub hours: BTreeMap<ForecastHour, HourOutcome>,
    pub retention: RetentionStats,
}

impl RunReport {
    pub fn outcome(&self, hour: ForecastHour) -> Option<&HourOutcome> {
        self.hours.get(&hour)
    }

    /// Hours whose label is `label` (`rendered`, `pending`, `failed`, `skipped`).
    pub fn count(&self, label: &str) -> usize {
        self.hours.values().filter(|o| o.label() == label).count()
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }
}

/// Lifecycle tracker for one hour.
struct HourProgress {
    run: RunId,
    hour: ForecastHour,
    state: HourState,
}

impl HourProgress {
    fn new(run: RunId, hour: ForecastHour) -> Self {
        Self {
            run,
            hour,
            state: HourState::Pending,
        }
    }

    fn advance(&mut self, next: HourState) {
        match self.state.advance(next) {
            Ok(state) => {
                debug!(run = %self.run, hour = %self.hour, from = %self.state, to = %state, "Hour state change");
                self.state = state;
            }
            Err(e) => {
                error!(run = %self.run, hour = %self.hour, error = %e, "Illegal hour transition ignored");
            }
        }
    }

    fn fail(&mut self, reason: FailureReason) {
        self.advance(HourState::Failed(reason));
    }
}

pub struct Orchestrator {
    resolver: RunResolver,
    fetcher: Fetcher,
    catalog: Arc<FieldCatalog>,
    scales: Arc<ColorScaleTable>,
    renderer: Arc<MapRenderer>,
    projection: MapProjection,
    /// Gates decode/render jobs on the blocking pool
    workers: Arc<Semaphore>,
    fields: Vec<String>,
    hours: Vec<ForecastHour>,
    missing_field_policy: MissingFieldPolicy,
    max_concurrent_hours: usize,
    data_dir: PathBuf,
    output_dir: PathBuf,
    keep_runs: usize,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn RemoteSource>,
        config: &ModelConfig,
        scales: ColorScaleTable,
        style: MapStyle,
    ) -> PipelineResult<Self> {
        scales.check_covers(&config.fields)?;
        let projection = MapProjection::new(
            config.map.bbox,
            config.map.width,
            config.map.height,
            config.map.interpolation,
        )?;

        Ok(Self {
            resolver: RunResolver::new(source.clone(), config)?,
            fetcher: Fetcher::new(source, config),
            catalog: Arc::new(FieldCatalog::aigfs()),
            scales: Arc::new(scales),
            renderer: Arc::new(MapRenderer::new(style)),
            projection,
            workers: Arc::new(Semaphore::new(config.processing.render_workers.max(1))),
            fields: config.fields.clone(),
            hours: config.forecast_hours(),
            missing_field_policy: config.processing.missing_field_policy,
            max_concurrent_hours: config.processing.max_concurrent_hours.max(1),
            data_dir: config.storage.data_dir.clone(),
            output_dir: config.storage.output_dir.clone(),
            keep_runs: config.retention.keep_runs.max(1),
        })
    }

    /// Process `hours` instead of the configured schedule.
    pub fn with_hours(mut self, hours: Vec<ForecastHour>) -> Self {
        self.hours = hours;
        self
    }

    pub fn hours(&self) -> &[ForecastHour] {
        &self.hours
    }

    pub fn resolver(&self) -> &RunResolver {
        &self.resolver
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Resolve the latest run once, then process it.
    pub async fn process_latest(&self, now: DateTime<Utc>) -> PipelineResult<RunReport> {
        let run = self.resolver.resolve_latest_run(now).await?;
        self.process_run(run).await
    }

    #[instrument(skip(self, run), fields(run = %run.id, hours = self.hours.len()))]
    pub async fn process_run(&self, run: Run) -> PipelineResult<RunReport> {
        let started = Instant::now();
        let manifest = Mutex::new(Manifest::load(&self.output_dir));

        info!(fields = ?self.fields, "Processing run");

        let hours: BTreeMap<ForecastHour, HourOutcome> = stream::iter(self.hours.iter().copied())
            .map(|hour| {
                let manifest = &manifest;
                async move { (hour, self.process_hour(run.id, hour, manifest).await) }
            })
            .buffer_unordered(self.max_concurrent_hours)
            .collect()
            .await;

        let mut manifest = manifest.into_inner();
        let retention = retention::apply(
            &self.data_dir,
            &self.output_dir,
            &mut manifest,
            run.id,
            self.keep_runs,
        );
        manifest.save_async(&self.output_dir).await?;

        let report = RunReport {
            run,
            hours,
            retention,
        };
        info!(
            rendered = report.count("rendered"),
            skipped = report.count("skipped"),
            pending = report.count("pending"),
            failed = report.failed(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Run processed"
        );
        Ok(report)
    }

    async fn process_hour(
        &self,
        run: RunId,
        hour: ForecastHour,
        manifest: &Mutex<Manifest>,
    ) -> HourOutcome {
        let previous = manifest.lock().await.hour(&run, hour).cloned();

        let outcome = match &previous {
            Some(entry) if entry.is_settled(&self.fields, &self.output_dir) => {
                debug!(run = %run, hour = %hour, "Hour already rendered");
                HourOutcome::reused(entry)
            }
            _ => {
                let done = previous
                    .as_ref()
                    .map(|entry| entry.present_fields(&self.output_dir))
                    .unwrap_or_default();
                let todo: Vec<String> = self
                    .fields
                    .iter()
                    .filter(|f| !done.contains_key(f.as_str()))
                    .cloned()
                    .collect();

                let mut outcome = self.run_hour(run, hour, &todo).await;
                for (name, entry) in done {
                    outcome.fields.entry(name).or_insert(entry);
                }
                outcome
            }
        };

        counter!("aigfs_hours_total", "outcome" => outcome.label()).increment(1);
        info!(
            run = %run,
            hour = %hour,
            outcome = outcome.label(),
            reason = outcome.reason.map(|r| r.as_str()),
            fields_rendered = outcome.rendered_fields(),
            "Hour settled"
        );

        if !outcome.reused {
            // Held until the write lands so snapshots reach disk in order
            let mut manifest = manifest.lock().await;
            manifest.record_hour(run, hour, outcome.to_entry());
            if let Err(e) = manifest.save_async(&self.output_dir).await {
                error!(run = %run, hour = %hour, error = %e, "Failed to save manifest");
            }
        }

        outcome
    }

    /// Fetch, decode and render `todo` for one hour.
    async fn run_hour(&self, run: RunId, hour: ForecastHour, todo: &[String]) -> HourOutcome {
        let mut progress = HourProgress::new(run, hour);
        let mut fields = BTreeMap::new();

        progress.advance(HourState::Downloading);
        let grid = match self.fetcher.fetch_hour(&run, hour).await {
            FetchResult::Downloaded(grid) | FetchResult::AlreadyPresent(grid) => grid,
            FetchResult::NotYetPublished { url } => {
                progress.advance(HourState::Pending);
                info!(run = %run, hour = %hour, url = %url, "Hour not yet published");
                return HourOutcome::not_yet_published(fields);
            }
            FetchResult::Failed(e) => {
                progress.fail(e.failure_reason());
                return HourOutcome::settled(progress.state, fields);
            }
        };
        progress.advance(HourState::Downloaded);

        // Held across decode and render
        let Ok(_permit) = self.workers.clone().acquire_owned().await else {
            progress.fail(FailureReason::RenderFailure);
            return HourOutcome::settled(progress.state, fields);
        };

        let decoded = match self.decode(&grid, todo).await {
            Ok(decoded) => decoded,
            Err(reason) => {
                progress.fail(reason);
                return HourOutcome::settled(progress.state, fields);
            }
        };
        progress.advance(HourState::Decoded);

        for name in &decoded.missing {
            fields.insert(name.clone(), FieldEntry::failed(FailureReason::FieldNotFound));
        }
        if !decoded.missing.is_empty() && self.missing_field_policy == MissingFieldPolicy::FailHour {
            warn!(run = %run, hour = %hour, missing = ?decoded.missing, "Discarding grid file lacking fields");
            discard_grid(&grid);
            progress.fail(FailureReason::FieldNotFound);
            return HourOutcome::settled(progress.state, fields);
        }

        let mut render_failed = false;
        for (name, entry) in self.render(run, hour, decoded).await {
            render_failed |= !entry.is_rendered();
            fields.insert(name, entry);
        }

        if render_failed {
            progress.fail(FailureReason::RenderFailure);
        } else {
            progress.advance(HourState::Rendered);
        }
        HourOutcome::settled(progress.state, fields)
    }

    /// Decode on the blocking pool. A corrupt grid file, or one lacking a
    /// requested field, is removed so the next invocation downloads it again.
    async fn decode(&self, grid: &GridFile, names: &[String]) -> Result<DecodedFile, FailureReason> {
        let path = grid.path.clone();
        let catalog = self.catalog.clone();
        let names = names.to_vec();

        let result = tokio::task::spawn_blocking(move || decode(&path, names.as_slice(), &catalog)).await;

        let corrupt = match result {
            Ok(Ok(decoded)) => return Ok(decoded),
            Ok(Err(DecodeError::FieldNotFound { field, .. })) | Ok(Err(DecodeError::UnknownField(field))) => {
                warn!(path = %grid.path.display(), field = %field, "Field unavailable");
                discard_grid(grid);
                return Err(FailureReason::FieldNotFound);
            }
            Ok(Err(e)) => e.to_string(),
            Err(e) => format!("decoder panicked: {}", e),
        };

        warn!(path = %grid.path.display(), error = %corrupt, "Discarding corrupt grid file");
        discard_grid(grid);
        Err(FailureReason::CorruptFile)
    }

    /// Render every decoded field on the blocking pool. Failures stay with
    /// their own field.
    async fn render(
        &self,
        run: RunId,
        hour: ForecastHour,
        decoded: DecodedFile,
    ) -> Vec<(String, FieldEntry)> {
        let names: Vec<String> = decoded.fields.keys().cloned().collect();
        let renderer = self.renderer.clone();
        let scales = self.scales.clone();
        let projection = self.projection;
        let output_dir = self.output_dir.clone();

        let job = tokio::task::spawn_blocking(move || {
            decoded
                .fields
                .iter()
                .map(|(name, field)| {
                    let relative = artifact_relative_path(&run, hour, name);
                    let path = output_dir.join(&relative);
                    let started = Instant::now();
                    let result = scales
                        .scale_for(name)
                        .and_then(|scale| renderer.render(field, scale, &projection, &path));
                    histogram!("aigfs_render_seconds").record(started.elapsed().as_secs_f64());

                    let entry = match result {
                        Ok(artifact) => FieldEntry::rendered(relative, &artifact),
                        Err(e) => {
                            warn!(run = %run, hour = %hour, field = %name, error = %e, "Render failed");
                            counter!("aigfs_render_failures_total").increment(1);
                            FieldEntry::failed(FailureReason::RenderFailure)
                        }
                    };
                    (name.clone(), entry)
                })
                .collect::<Vec<_>>()
        });

        match job.await {
            Ok(entries) => entries,
            Err(e) => {
                error!(run = %run, hour = %hour, error = %e, "Render job panicked");
                names
                    .into_iter()
                    .map(|name| (name, FieldEntry::failed(FailureReason::RenderFailure)))
                    .collect()
            }
        }
    }
}

/// Remove a grid file that cannot produce the hour, so the next invocation
/// downloads it again.
fn discard_grid(grid: &GridFile) {
    if let Err(e) = remove_if_exists(&grid.path) {
        warn!(path = %grid.path.display(), error = %e, "Failed to remove grid file");
    }
}
