//! Prometheus text export for the batch job.
//!
//! The job exposes no endpoint, so each invocation writes the rendered
//! registry to `<output_dir>/metrics.prom` for a textfile collector.

use std::path::{Path, PathBuf};

use forecast_common::{write_atomic, CommonResult};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::debug;

pub const METRICS_FILE: &str = "metrics.prom";

/// Install the global Prometheus recorder.
pub fn install() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Write the current registry to `<output_dir>/metrics.prom`.
pub fn write_textfile(handle: &PrometheusHandle, output_dir: &Path) -> CommonResult<PathBuf> {
    let path = output_dir.join(METRICS_FILE);
    let text = handle.render();
    write_atomic(&path, text.as_bytes())?;
    debug!(path = %path.display(), bytes = text.len(), "Wrote metrics textfile");
    Ok(path)
}
