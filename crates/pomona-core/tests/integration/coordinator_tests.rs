//! Integration tests for RunCoordinator.

use std::sync::{Arc, Mutex};

use pomona_core::{
    AppError, IngestionConfig, IngestionEvent, IngestionService, ProgressReporter,
    RotationConfig, RunCoordinator, RunStatus, SilentReporter, SourceRunStatus,
};

use crate::integration::common::{
    MockAdapterFactory, MockFetcher, MockStore, page_body, page_url, registry,
};

type Coordinator = RunCoordinator<MockStore, MockAdapterFactory, MockFetcher>;

fn coordinator(store: &MockStore, fetcher: &MockFetcher, group_size: usize) -> Coordinator {
    let ingestion = IngestionService::with_config(
        store.clone(),
        MockAdapterFactory::new(),
        fetcher.clone(),
        IngestionConfig::default().with_group_size(group_size),
        RotationConfig::default(),
    );
    RunCoordinator::new(ingestion)
}

const MIXED: &str = r#"
[[sources]]
slug = "ok"
name = "Working source"
adapter = "adzuna"

[[sources]]
slug = "broken"
name = "Broken source"
adapter = "jooble"

[[sources]]
slug = "nokey"
name = "Unconfigured source"
adapter = "reed"
params = { key_env = "NOKEY_API_KEY" }

[[sources]]
slug = "off"
name = "Disabled source"
adapter = "themuse"
enabled = false
"#;

/// Records event names in order.
#[derive(Default)]
struct RecordingReporter {
    events: Arc<Mutex<Vec<String>>>,
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, event: IngestionEvent<'_>) {
        let name = match event {
            IngestionEvent::RunStarted { sources, .. } => format!("run_started:{}", sources),
            IngestionEvent::RunCompleted { summary } => format!("run_completed:{}", summary.status),
            IngestionEvent::SourceFinished { result } => {
                format!("finished:{}:{}", result.source, result.status)
            }
            _ => return,
        };
        self.events.lock().unwrap().push(name);
    }
}

/// Test 1: Verify that a run over mixed sources isolates failures, skips
/// unconfigured sources and closes as partial.
#[tokio::test]
async fn test_run_all_enabled_sources_partial() {
    // Arrange
    let store = MockStore::new();
    let fetcher = MockFetcher::new();
    fetcher
        .respond(page_url("ok", 1), page_body("ok", 0..4))
        .fail(page_url("broken", 1), "connection refused");
    let registry = registry(MIXED);
    let reporter = RecordingReporter::default();

    // Act
    let summary = coordinator(&store, &fetcher, 2)
        .run(&registry, None, &reporter)
        .await
        .unwrap();

    // Assert
    assert_eq!(summary.status, RunStatus::Partial);
    assert_eq!(summary.results.len(), 3, "Disabled source is not selected");
    assert_eq!(summary.totals.succeeded, 1);
    assert_eq!(summary.totals.failed, 1);
    assert_eq!(summary.totals.skipped, 1);
    assert_eq!(summary.totals.inserted, 4);

    let by_slug = |slug: &str| {
        summary
            .results
            .iter()
            .find(|r| r.source == slug)
            .unwrap()
            .clone()
    };
    assert_eq!(by_slug("ok").status, SourceRunStatus::Success);
    assert_eq!(by_slug("broken").status, SourceRunStatus::Failed);
    assert_eq!(
        by_slug("broken").error.as_deref(),
        Some("Network error: connection refused")
    );
    assert_eq!(by_slug("nokey").status, SourceRunStatus::Skipped);

    let run = store.run(summary.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Partial);
    assert_eq!(run.totals.unwrap().inserted, 4);
    assert!(run.finished_at.is_some());
    assert_eq!(run.sources_requested, vec!["ok", "broken", "nokey"]);

    let events = reporter.events.lock().unwrap().clone();
    assert_eq!(events.first().map(String::as_str), Some("run_started:3"));
    assert_eq!(events.last().map(String::as_str), Some("run_completed:partial"));
    assert_eq!(events.len(), 5);
}

/// Test 2: Verify that an explicit slug runs a source that is disabled.
#[tokio::test]
async fn test_explicit_slug_runs_disabled_source() {
    // Arrange
    let store = MockStore::new();
    let fetcher = MockFetcher::new();
    fetcher.respond(page_url("off", 1), page_body("off", 0..2));
    let registry = registry(MIXED);

    // Act
    let summary = coordinator(&store, &fetcher, 3)
        .run(&registry, Some("off"), &SilentReporter)
        .await
        .unwrap();

    // Assert
    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.results.len(), 1);
    assert_eq!(summary.totals.inserted, 2);
}

/// Test 3: Verify that an unknown slug is rejected before a run is opened.
#[tokio::test]
async fn test_unknown_slug_is_an_error() {
    // Arrange
    let store = MockStore::new();
    let fetcher = MockFetcher::new();
    let registry = registry(MIXED);

    // Act
    let result = coordinator(&store, &fetcher, 3)
        .run(&registry, Some("nope"), &SilentReporter)
        .await;

    // Assert
    assert!(matches!(result, Err(AppError::SourceNotFound(ref s)) if s == "nope"));
    assert!(store.inner.lock().unwrap().runs.is_empty());
}

/// Test 4: Verify that a run with nothing selected succeeds with zero totals.
#[tokio::test]
async fn test_empty_selection_succeeds() {
    // Arrange
    let store = MockStore::new();
    let fetcher = MockFetcher::new();
    let registry = registry(
        r#"
[[sources]]
slug = "off"
name = "Disabled"
adapter = "adzuna"
enabled = false
"#,
    );

    // Act
    let summary = coordinator(&store, &fetcher, 3)
        .run(&registry, None, &SilentReporter)
        .await
        .unwrap();

    // Assert
    assert_eq!(summary.status, RunStatus::Success);
    assert!(summary.results.is_empty());
    assert_eq!(summary.totals.sources, 0);
    assert_eq!(store.run(summary.run_id).unwrap().status, RunStatus::Success);
}

/// Test 5: Verify that a run where every source fails closes as failed.
#[tokio::test]
async fn test_all_sources_failing_fails_run() {
    // Arrange
    let store = MockStore::new();
    let fetcher = MockFetcher::new();
    let registry = registry(
        r#"
[[sources]]
slug = "a"
name = "A"
adapter = "adzuna"

[[sources]]
slug = "b"
name = "B"
adapter = "adzuna"
"#,
    );

    // Act: every URL is unknown to the fetcher and answers 404
    let summary = coordinator(&store, &fetcher, 1)
        .run(&registry, None, &SilentReporter)
        .await
        .unwrap();

    // Assert
    assert_eq!(summary.status, RunStatus::Failed);
    assert_eq!(summary.totals.failed, 2);
    assert_eq!(store.health("a").unwrap().consecutive_failures, 1);
    assert_eq!(store.health("b").unwrap().consecutive_failures, 1);
}

/// Test 6: Verify that a panicking source fails alone and is recorded.
#[tokio::test]
async fn test_panicking_source_is_isolated() {
    // Arrange
    let store = MockStore::new();
    let fetcher = MockFetcher::new();
    fetcher.respond(page_url("fine", 1), page_body("fine", 0..1));
    let registry = registry(
        r#"
[[sources]]
slug = "fine"
name = "Fine"
adapter = "adzuna"

[[sources]]
slug = "boom"
name = "Boom"
adapter = "adzuna"
params = { panic = "true" }
"#,
    );

    // Act
    let summary = coordinator(&store, &fetcher, 2)
        .run(&registry, None, &SilentReporter)
        .await
        .unwrap();

    // Assert
    assert_eq!(summary.status, RunStatus::Partial);
    let boom = summary.results.iter().find(|r| r.source == "boom").unwrap();
    assert_eq!(boom.status, SourceRunStatus::Failed);
    assert_eq!(
        boom.error.as_deref(),
        Some("source task panicked: adapter construction exploded")
    );

    let health = store.health("boom").unwrap();
    assert!(health.is_degraded);
    assert_eq!(health.consecutive_failures, 1);
    let record = store.record(summary.run_id, "boom").unwrap();
    assert_eq!(record.status, SourceRunStatus::Failed);
}
