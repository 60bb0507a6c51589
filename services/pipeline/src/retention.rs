//! Bounded storage: drop grid files and maps of superseded runs.

use std::collections::BTreeSet;
use std::path::Path;

use forecast_common::RunId;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::manifest::Manifest;

/// What a retention pass removed.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RetentionStats {
    /// Runs whose grid files were deleted
    pub grid_runs_removed: Vec<RunId>,
    /// Runs whose rendered maps were deleted
    pub map_runs_removed: Vec<RunId>,
    /// Runs dropped from the manifest
    pub manifest_runs_removed: Vec<RunId>,
    pub delete_errors: u64,
}

/// Run directories (named `YYYYMMDDHH`) directly under `dir`. Other entries
/// are ignored.
fn run_dirs(dir: &Path) -> Vec<RunId> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(dir = %dir.display(), error = %e, "Cannot list directory");
            }
            return Vec::new();
        }
    };

    let mut runs: Vec<RunId> = entries
        .flatten()
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
        .collect();
    runs.sort();
    runs
}

fn remove_run_dir(root: &Path, run: &RunId, stats: &mut RetentionStats) -> bool {
    let path = root.join(run.to_string());
    match std::fs::remove_dir_all(&path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed run directory");
            true
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove run directory");
            stats.delete_errors += 1;
            false
        }
    }
}

/// Runs whose maps survive: `current` plus the newest others, `keep_runs`
/// in total.
pub fn runs_to_keep(known: &BTreeSet<RunId>, current: RunId, keep_runs: usize) -> Vec<RunId> {
    let mut keep = vec![current];
    keep.extend(
        known
            .iter()
            .rev()
            .filter(|id| **id != current)
            .take(keep_runs.saturating_sub(1))
            .copied(),
    );
    keep.sort();
    keep
}

/// Delete grid files of runs superseded by `current`, and maps plus manifest
/// entries of all but the newest `keep_runs` runs. Deletion failures are
/// logged and counted, never fatal.
pub fn apply(
    data_dir: &Path,
    output_dir: &Path,
    manifest: &mut Manifest,
    current: RunId,
    keep_runs: usize,
) -> RetentionStats {
    let mut stats = RetentionStats::default();

    for run in run_dirs(data_dir) {
        if run < current && remove_run_dir(data_dir, &run, &mut stats) {
            stats.grid_runs_removed.push(run);
        }
    }

    let map_runs = run_dirs(output_dir);
    let known: BTreeSet<RunId> = map_runs
        .iter()
        .chain(manifest.runs.keys())
        .copied()
        .collect();
    let keep = runs_to_keep(&known, current, keep_runs);

    for run in map_runs {
        if !keep.contains(&run) && remove_run_dir(output_dir, &run, &mut stats) {
            stats.map_runs_removed.push(run);
        }
    }
    stats.manifest_runs_removed = manifest.retain_runs(&keep);

    info!(
        current = %current,
        kept = keep.len(),
        grid_runs_removed = stats.grid_runs_removed.len(),
        map_runs_removed = stats.map_runs_removed.len(),
        errors = stats.delete_errors,
        "Retention pass complete"
    );
    stats
}
