//! Run resolution against an in-memory archive.

mod common;

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use forecast_common::{ForecastHour, RunStatus};
use pipeline::{RemoteLayout, ResolveError, RunResolver};
use test_utils::scratch_dir;

use common::{publish, run_id, test_config, MockSource, Reply};

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, day, hour, 30, 0).unwrap()
}

fn resolver(mock: &Arc<MockSource>, config: &pipeline::ModelConfig) -> RunResolver {
    RunResolver::new(mock.clone(), config).unwrap()
}

#[tokio::test]
async fn test_steps_back_to_latest_published_run() {
    let dir = scratch_dir();
    let config = test_config(dir.path());
    let mock = Arc::new(MockSource::new());
    publish(&mock, &config, &run_id("2026010300"), &[0, 3]);

    // 12:30 minus 4 h delay floors to the 06Z slot, which is absent
    let run = resolver(&mock, &config)
        .resolve_latest_run(at(3, 12))
        .await
        .unwrap();
    assert_eq!(run.id, run_id("2026010300"));
    assert_eq!(run.status, RunStatus::Available);

    let layout = RemoteLayout::new(&config.source);
    assert_eq!(mock.count(&layout.directory_url(&run_id("2026010306"))), 1);
}

#[tokio::test]
async fn test_never_returns_run_newer_than_now() {
    let dir = scratch_dir();
    let config = test_config(dir.path());
    let mock = Arc::new(MockSource::new());
    publish(&mock, &config, &run_id("2026010312"), &[0]);
    publish(&mock, &config, &run_id("2026010300"), &[0]);

    let run = resolver(&mock, &config)
        .resolve_latest_run(at(3, 11))
        .await
        .unwrap();
    assert_eq!(run.id, run_id("2026010300"));

    let layout = RemoteLayout::new(&config.source);
    let future = layout.directory_url(&run_id("2026010312"));
    assert!(mock.requests().iter().all(|url| *url != future));
}

#[tokio::test]
async fn test_partially_published_run_is_skipped() {
    let dir = scratch_dir();
    let config = test_config(dir.path());
    let mock = Arc::new(MockSource::new());
    let layout = RemoteLayout::new(&config.source);

    // 06Z directory exists but its analysis index is not there yet
    mock.set(
        layout.directory_url(&run_id("2026010306")),
        Reply::Body(
            format!("<a href=\"{}\"></a>", layout.file_name(&run_id("2026010306"), ForecastHour::new(3)))
                .into_bytes(),
        ),
    );
    publish(&mock, &config, &run_id("2026010300"), &[0]);

    let resolver = resolver(&mock, &config);
    assert!(!resolver.is_published(&run_id("2026010306")).await.unwrap());
    let run = resolver.resolve_latest_run(at(3, 12)).await.unwrap();
    assert_eq!(run.id, run_id("2026010300"));
}

#[tokio::test]
async fn test_index_for_another_run_fails_resolution() {
    let dir = scratch_dir();
    let config = test_config(dir.path());
    let mock = Arc::new(MockSource::new());
    let layout = RemoteLayout::new(&config.source);
    let run = run_id("2026010306");
    publish(&mock, &config, &run, &[0]);

    // Serve the 00Z inventory under the 06Z name
    let stale = test_utils::surface_file((2026, 1, 3, 0), 0).inventory;
    mock.set(
        layout.index_url(&run, ForecastHour::new(0)),
        Reply::Body(stale.into_bytes()),
    );

    let err = resolver(&mock, &config)
        .resolve_latest_run(at(3, 12))
        .await
        .unwrap_err();
    match err {
        ResolveError::RunResolutionFailed { run: failed, reason } => {
            assert_eq!(failed, run);
            assert!(reason.contains("2026010300"), "reason: {}", reason);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_index_missing_required_field_fails_resolution() {
    let dir = scratch_dir();
    let config = test_config(dir.path());
    let mock = Arc::new(MockSource::new());
    let layout = RemoteLayout::new(&config.source);
    let run = run_id("2026010306");
    publish(&mock, &config, &run, &[0]);

    let inventory: String = test_utils::surface_file((2026, 1, 3, 6), 0)
        .inventory
        .lines()
        .filter(|line| !line.contains(":PRMSL:"))
        .map(|line| format!("{}\n", line))
        .collect();
    mock.set(
        layout.index_url(&run, ForecastHour::new(0)),
        Reply::Body(inventory.into_bytes()),
    );

    let err = resolver(&mock, &config)
        .resolve_latest_run(at(3, 12))
        .await
        .unwrap_err();
    assert!(
        matches!(err, ResolveError::RunResolutionFailed { ref reason, .. } if reason.contains("PRMSL")),
        "unexpected error: {}",
        err
    );
}

#[tokio::test]
async fn test_garbage_index_fails_resolution() {
    let dir = scratch_dir();
    let config = test_config(dir.path());
    let mock = Arc::new(MockSource::new());
    let layout = RemoteLayout::new(&config.source);
    let run = run_id("2026010306");
    publish(&mock, &config, &run, &[0]);
    mock.set(
        layout.index_url(&run, ForecastHour::new(0)),
        Reply::Body(b"<html>Service temporarily unavailable</html>".to_vec()),
    );

    let err = resolver(&mock, &config)
        .resolve_latest_run(at(3, 12))
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::RunResolutionFailed { .. }));
}

#[tokio::test]
async fn test_forbidden_listing_fails_resolution() {
    let dir = scratch_dir();
    let config = test_config(dir.path());
    let mock = Arc::new(MockSource::new());
    let layout = RemoteLayout::new(&config.source);
    mock.set(layout.directory_url(&run_id("2026010306")), Reply::Status(403));

    let err = resolver(&mock, &config)
        .resolve_latest_run(at(3, 12))
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::RunResolutionFailed { .. }));
    // Client errors are not retried
    assert_eq!(mock.requests().len(), 1);
}

#[tokio::test]
async fn test_persistent_server_errors_are_network_failure() {
    let dir = scratch_dir();
    let config = test_config(dir.path());
    let mock = Arc::new(MockSource::new());
    let layout = RemoteLayout::new(&config.source);
    let listing = layout.directory_url(&run_id("2026010306"));
    mock.set(listing.clone(), Reply::Status(503));

    let err = resolver(&mock, &config)
        .resolve_latest_run(at(3, 12))
        .await
        .unwrap_err();
    match err {
        ResolveError::NetworkFailure { run, attempts, .. } => {
            assert_eq!(run, run_id("2026010306"));
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(mock.count(&listing), 3);
}

#[tokio::test]
async fn test_transient_failure_recovers_within_budget() {
    let dir = scratch_dir();
    let config = test_config(dir.path());
    let mock = Arc::new(MockSource::new());
    let layout = RemoteLayout::new(&config.source);
    let run = run_id("2026010306");
    publish(&mock, &config, &run, &[0]);

    let listing_url = layout.directory_url(&run);
    let body = format!("<a href=\"{}\"></a>", layout.index_name(&run, ForecastHour::new(0)));
    mock.sequence(
        listing_url.clone(),
        vec![Reply::Timeout, Reply::Status(502), Reply::Body(body.into_bytes())],
    );

    let resolved = resolver(&mock, &config)
        .resolve_latest_run(at(3, 12))
        .await
        .unwrap();
    assert_eq!(resolved.id, run);
    assert_eq!(mock.count(&listing_url), 3);
}

#[tokio::test]
async fn test_no_run_within_lookback() {
    let dir = scratch_dir();
    let config = test_config(dir.path());
    let mock = Arc::new(MockSource::new());
    // Published, but older than the 48 h window
    publish(&mock, &config, &run_id("2025123100"), &[0]);

    let err = resolver(&mock, &config)
        .resolve_latest_run(at(3, 12))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ResolveError::NoRunAvailable {
            lookback_hours: 48,
            ..
        }
    ));
    // 06Z on the 3rd back to 18Z on the 1st: one listing request per slot
    assert_eq!(mock.requests().len(), 7);
}

#[test]
fn test_candidates_follow_configured_cycles() {
    let dir = scratch_dir();
    let mut config = test_config(dir.path());
    config.schedule.cycles = vec![0, 12];
    config.schedule.lookback_hours = 30;
    let resolver = RunResolver::new(Arc::new(MockSource::new()), &config).unwrap();

    let ids: Vec<String> = resolver
        .candidates(at(3, 12))
        .iter()
        .map(|id| id.to_string())
        .collect();
    assert_eq!(ids, vec!["2026010300", "2026010212"]);
}

#[tokio::test]
async fn test_confirm_reports_missing_run() {
    let dir = scratch_dir();
    let config = test_config(dir.path());
    let mock = Arc::new(MockSource::new());
    let resolver = resolver(&mock, &config);

    let run = tokio_test::assert_ok!(resolver.confirm(run_id("2026010300")).await);
    assert_eq!(run.status, RunStatus::Missing);
}
