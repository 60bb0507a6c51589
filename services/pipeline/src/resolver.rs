//! Run resolution: find the newest run the remote archive has published.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use forecast_common::{Cycle, ForecastHour, Run, RunId, CYCLE_HOURS};
use grib2_parser::{DecodeError, FieldCatalog, Grib2Tables, Inventory, InventoryKey};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::ModelConfig;
use crate::retry::{RetryPolicy, Transient};
use crate::source::{RemoteLayout, RemoteSource, SourceError};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("No run published within {lookback_hours}h before {now}")]
    NoRunAvailable {
        now: DateTime<Utc>,
        lookback_hours: u32,
    },

    /// The archive answered, but not in the shape the pipeline expects.
    #[error("Run {run} could not be resolved: {reason}")]
    RunResolutionFailed { run: RunId, reason: String },

    #[error("Network failure probing run {run} after {attempts} attempts: {source}")]
    NetworkFailure {
        run: RunId,
        attempts: u32,
        #[source]
        source: SourceError,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Finds the latest published run by probing candidate cycles newest first.
pub struct RunResolver {
    source: Arc<dyn RemoteSource>,
    layout: RemoteLayout,
    policy: RetryPolicy,
    cycles: Vec<Cycle>,
    delay_hours: u32,
    lookback_hours: u32,
    /// Keys the analysis inventory must list
    required_keys: BTreeSet<InventoryKey>,
}

impl RunResolver {
    pub fn new(source: Arc<dyn RemoteSource>, config: &ModelConfig) -> Result<Self, ResolveError> {
        let required_keys = FieldCatalog::aigfs()
            .analysis_inventory_keys(&config.fields, &Grib2Tables::ncep())?;

        Ok(Self {
            source,
            layout: RemoteLayout::new(&config.source),
            policy: config.retry_policy(),
            cycles: config
                .schedule
                .cycles
                .iter()
                .filter_map(|&h| Cycle::from_hour(h))
                .collect(),
            delay_hours: config.schedule.delay_hours,
            lookback_hours: config.schedule.lookback_hours,
            required_keys,
        })
    }

    /// Candidate runs, newest first: `now - delay` floored to the cycle, then
    /// one cycle back at a time while still within the lookback window.
    pub fn candidates(&self, now: DateTime<Utc>) -> Vec<RunId> {
        let oldest = now - Duration::hours(self.lookback_hours as i64);
        let max_slots = (self.lookback_hours / CYCLE_HOURS) as usize + 1;

        let mut slot = Some(RunId::latest_at_or_before(
            now - Duration::hours(self.delay_hours as i64),
        ));
        let mut candidates = Vec::with_capacity(max_slots);

        for _ in 0..max_slots {
            let Some(run) = slot.filter(|r| r.init_time() >= oldest) else {
                break;
            };
            if self.cycles.contains(&run.cycle()) {
                candidates.push(run);
            }
            slot = run.previous();
        }

        candidates
    }

    /// The newest published run at `now`.
    #[instrument(skip(self), fields(lookback_hours = self.lookback_hours))]
    pub async fn resolve_latest_run(&self, now: DateTime<Utc>) -> Result<Run, ResolveError> {
        for run_id in self.candidates(now) {
            if self.is_published(&run_id).await? {
                info!(run = %run_id, "Resolved latest run");
                return Ok(Run::available(run_id));
            }
            debug!(run = %run_id, "Run not published, stepping back");
        }

        warn!(now = %now, "No published run within lookback window");
        Err(ResolveError::NoRunAvailable {
            now,
            lookback_hours: self.lookback_hours,
        })
    }

    /// Check a specific run without searching. The returned run is
    /// `Available` or `Missing`.
    pub async fn confirm(&self, run_id: RunId) -> Result<Run, ResolveError> {
        let published = self.is_published(&run_id).await?;
        Ok(Run::unknown(run_id).confirm(published))
    }

    /// Whether `run` is published: its listing names the analysis index and
    /// that index describes this run with every required field.
    #[instrument(skip(self, run), fields(run = %run))]
    pub async fn is_published(&self, run: &RunId) -> Result<bool, ResolveError> {
        let analysis = ForecastHour::new(0);

        let listing_url = self.layout.directory_url(run);
        let Some(listing) = self.get_text(run, &listing_url).await? else {
            debug!(url = %listing_url, "Run directory absent");
            return Ok(false);
        };

        let index_name = self.layout.index_name(run, analysis);
        if !listing.contains(&index_name) {
            debug!(index = %index_name, "Run directory lacks analysis index");
            return Ok(false);
        }

        let index_url = self.layout.index_url(run, analysis);
        let Some(text) = self.get_text(run, &index_url).await? else {
            debug!(url = %index_url, "Analysis index listed but not served");
            return Ok(false);
        };

        self.validate_inventory(run, &text)?;
        Ok(true)
    }

    fn validate_inventory(&self, run: &RunId, text: &str) -> Result<(), ResolveError> {
        let failed = |reason: String| ResolveError::RunResolutionFailed {
            run: *run,
            reason,
        };

        let inventory =
            Inventory::parse(text).map_err(|e| failed(format!("unreadable inventory: {}", e)))?;

        let expected = run.to_string();
        match inventory.reference_date() {
            Some(date) if date == expected => {}
            Some(date) => {
                return Err(failed(format!(
                    "inventory reference date {} does not match run",
                    date
                )))
            }
            None => return Err(failed("inventory mixes reference dates".to_string())),
        }

        let missing: Vec<String> = self
            .required_keys
            .iter()
            .filter(|key| !inventory.contains(key))
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(failed(format!(
                "inventory lacks required fields: {}",
                missing.join(", ")
            )));
        }

        Ok(())
    }

    /// GET with retry. `None` when the resource does not exist.
    async fn get_text(&self, run: &RunId, url: &str) -> Result<Option<String>, ResolveError> {
        let source = &self.source;
        match self
            .policy
            .run("resolve", move |_| async move { source.get_text(url).await })
            .await
        {
            Ok(text) => Ok(Some(text)),
            Err((e, _)) if e.is_not_found() => Ok(None),
            Err((e, attempts)) if e.is_transient() => Err(ResolveError::NetworkFailure {
                run: *run,
                attempts,
                source: e,
            }),
            Err((e, _)) => Err(ResolveError::RunResolutionFailed {
                run: *run,
                reason: e.to_string(),
            }),
        }
    }
}
