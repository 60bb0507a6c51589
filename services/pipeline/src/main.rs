//! AIGFS forecast map pipeline.
//!
//! Runs one processing cycle and exits; an external timer schedules it.
//! - Resolves the newest published run (or takes `--run`)
//! - Downloads, decodes and renders every configured forecast hour
//! - Records results in `<output_dir>/manifest.json`
//! - Writes Prometheus metrics to `<output_dir>/metrics.prom`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use forecast_common::{ForecastHour, RunId};
use metrics::gauge;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use pipeline::metrics as textfile;
use pipeline::{HttpSource, ModelConfig, Orchestrator, RemoteSource};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Parser, Debug)]
#[command(name = "aigfs-pipeline")]
#[command(about = "Download AIGFS forecasts and render forecast maps")]
struct Args {
    /// Pipeline configuration file
    #[arg(short, long, env = "AIGFS_CONFIG", default_value = "config/aigfs.yaml")]
    config: PathBuf,

    /// Process this run (YYYYMMDDHH) instead of resolving the latest
    #[arg(long)]
    run: Option<RunId>,

    /// Resolve the latest run, print it and exit
    #[arg(long)]
    resolve_only: bool,

    /// Comma-separated forecast hours overriding the schedule (e.g. 0,6,f012)
    #[arg(long, value_delimiter = ',')]
    hours: Option<Vec<ForecastHour>>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "json")]
    log_format: LogFormat,
}

fn init_tracing(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true);

    match args.log_format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args)?;

    let prometheus = textfile::install().context("Failed to install metrics recorder")?;

    let config = ModelConfig::load(&args.config)?;
    info!(
        model = %config.model.id,
        config = %args.config.display(),
        fields = ?config.fields,
        "Starting AIGFS pipeline"
    );

    let result = run(&args, &config).await;

    if let Err(e) = &result {
        error!(error = %format!("{:#}", e), "Pipeline invocation failed");
    }
    write_metrics(&prometheus, &config);
    result
}

async fn run(args: &Args, config: &ModelConfig) -> Result<()> {
    let source: Arc<dyn RemoteSource> =
        Arc::new(HttpSource::new(&config.source).context("Failed to create HTTP client")?);

    let mut orchestrator = Orchestrator::new(
        source,
        config,
        config.color_scales()?,
        config.map_style()?,
    )
    .context("Failed to set up pipeline")?;
    if let Some(hours) = &args.hours {
        orchestrator = orchestrator.with_hours(hours.clone());
    }

    let run = match args.run {
        Some(id) => {
            let run = orchestrator.resolver().confirm(id).await?;
            if !run.is_available() {
                warn!(run = %run, "Requested run is not published; hours will stay pending");
            }
            run
        }
        None => orchestrator.resolver().resolve_latest_run(Utc::now()).await?,
    };
    gauge!("aigfs_run_init_timestamp_seconds").set(run.id.init_time().timestamp() as f64);

    if args.resolve_only {
        println!("{}", run.id);
        return Ok(());
    }

    let report = orchestrator.process_run(run).await?;
    info!(
        run = %report.run,
        hours = report.hours.len(),
        rendered = report.count("rendered"),
        skipped = report.count("skipped"),
        pending = report.count("pending"),
        failed = report.failed(),
        "Pipeline invocation complete"
    );
    Ok(())
}

fn write_metrics(handle: &PrometheusHandle, config: &ModelConfig) {
    match textfile::write_textfile(handle, &config.storage.output_dir) {
        Ok(path) => info!(path = %path.display(), "Metrics written"),
        Err(e) => warn!(error = %e, "Failed to write metrics"),
    }
}
