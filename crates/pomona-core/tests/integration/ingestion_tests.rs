//! Integration tests for IngestionService.
//!
//! These tests drive the per-source loop against the in-memory store and a
//! scripted fetcher.

use std::time::Duration;

use chrono::{TimeDelta, Utc};
use pomona_core::{
    IngestionCursor, IngestionService, IngestionState, SilentReporter, SourceRunStatus,
    StaticCredentials,
};
use tokio::time::Instant;
use uuid::Uuid;

use crate::integration::common::{
    MockAdapterFactory, MockFetcher, MockStore, board_url, job, page_body, page_url, registry,
    stale_body,
};

type Service = IngestionService<MockStore, MockAdapterFactory, MockFetcher>;

fn service(store: &MockStore, fetcher: &MockFetcher) -> Service {
    IngestionService::new(store.clone(), MockAdapterFactory::new(), fetcher.clone())
}

fn in_a_minute() -> Instant {
    Instant::now() + Duration::from_secs(60)
}

const ALPHA: &str = r#"
[[sources]]
slug = "alpha"
name = "Alpha"
adapter = "adzuna"
max_pages_per_run = 2
"#;

/// Test 1: Verify that a two-page run inserts new postings, counts stored
/// ones as duplicates and rewinds the cursor after a short page.
#[tokio::test]
async fn test_ingest_two_pages_until_short_page() {
    // Arrange
    let store = MockStore::new();
    store.seed_postings((0..10).map(|i| job("alpha", i)).collect());
    let fetcher = MockFetcher::new();
    fetcher
        .respond(page_url("alpha", 1), page_body("alpha", 0..50))
        .respond(page_url("alpha", 2), page_body("alpha", 50..62));
    let registry = registry(ALPHA);
    let source = registry.select(Some("alpha")).unwrap().remove(0);
    let run_id = Uuid::new_v4();
    let before = Utc::now();

    // Act
    let result = service(&store, &fetcher)
        .ingest_source(&source, run_id, in_a_minute(), &SilentReporter)
        .await;

    // Assert
    assert_eq!(result.status, SourceRunStatus::Success);
    assert_eq!(result.count, 52, "40 new from page 1 plus 12 from page 2");
    assert_eq!(result.duplicates, 10);
    assert_eq!(result.normalized, 62);
    assert_eq!(store.posting_count(), 62);

    let state = store.state("alpha").unwrap();
    assert_eq!(state.cursor.page(), 1, "Short page should rewind the cursor");
    assert!(state.cursor.since().unwrap() >= before, "since should advance");

    let health = store.health("alpha").unwrap();
    assert_eq!(health.consecutive_failures, 0);
    assert!(!health.is_degraded);
    assert_eq!(health.last_counts.inserted, 52);

    let record = store.record(run_id, "alpha").unwrap();
    assert_eq!(record.status, SourceRunStatus::Success);
    assert_eq!(record.page_start, 1);
    assert_eq!(record.page_end, Some(2), "Last fetched page, not the rewound cursor");
    assert_eq!(record.counts.inserted, 52);
}

/// Test 2: Verify that a source without its credential is skipped and leaves
/// cursor and health untouched.
#[tokio::test]
async fn test_missing_credential_skips_source() {
    // Arrange
    let store = MockStore::new();
    let fetcher = MockFetcher::new();
    let registry = registry(
        r#"
[[sources]]
slug = "beta"
name = "Beta"
adapter = "reed"
params = { key_env = "BETA_API_KEY" }
"#,
    );
    let source = registry.select(Some("beta")).unwrap().remove(0);
    let run_id = Uuid::new_v4();

    // Act
    let result = service(&store, &fetcher)
        .ingest_source(&source, run_id, in_a_minute(), &SilentReporter)
        .await;

    // Assert
    assert_eq!(result.status, SourceRunStatus::Skipped);
    assert_eq!(
        result.error.as_deref(),
        Some("missing-config: MOCK_API_KEY")
    );
    assert!(store.state("beta").is_none(), "Cursor must not be written");
    assert!(store.health("beta").is_none(), "Health must not be written");
    assert!(fetcher.requested_urls().is_empty());
    assert_eq!(
        store.record(run_id, "beta").unwrap().status,
        SourceRunStatus::Skipped
    );
}

/// Test 3: Verify that the credential, once present, lets the same source run.
#[tokio::test]
async fn test_present_credential_runs_source() {
    // Arrange
    let store = MockStore::new();
    let fetcher = MockFetcher::new();
    fetcher.respond(page_url("beta", 1), page_body("beta", 0..3));
    let registry = registry(
        r#"
[[sources]]
slug = "beta"
name = "Beta"
adapter = "reed"
params = { key_env = "BETA_API_KEY" }
"#,
    );
    let source = registry.select(Some("beta")).unwrap().remove(0);
    let factory =
        MockAdapterFactory::with_credentials(StaticCredentials::new([("BETA_API_KEY", "k")]));
    let service = IngestionService::new(store.clone(), factory, fetcher.clone());

    // Act
    let result = service
        .ingest_source(&source, Uuid::new_v4(), in_a_minute(), &SilentReporter)
        .await;

    // Assert
    assert_eq!(result.status, SourceRunStatus::Success);
    assert_eq!(result.count, 3);
}

/// Test 4: Verify that a malformed payload fails the source, keeps the cursor
/// on the failing page and counts a consecutive failure.
#[tokio::test]
async fn test_parse_error_fails_source_and_keeps_cursor() {
    // Arrange
    let store = MockStore::new();
    store.set_state(
        "gamma",
        IngestionState::new(IngestionCursor::new(3, None), None),
    );
    let fetcher = MockFetcher::new();
    fetcher.respond(page_url("gamma", 3), b"{not json".to_vec());
    let registry = registry(
        r#"
[[sources]]
slug = "gamma"
name = "Gamma"
adapter = "themuse"
"#,
    );
    let source = registry.select(Some("gamma")).unwrap().remove(0);
    let run_id = Uuid::new_v4();

    // Act
    let result = service(&store, &fetcher)
        .ingest_source(&source, run_id, in_a_minute(), &SilentReporter)
        .await;

    // Assert
    assert_eq!(result.status, SourceRunStatus::Failed);
    let error = result.error.unwrap();
    assert!(error.starts_with("Parse error"), "got: {}", error);

    assert_eq!(store.state("gamma").unwrap().cursor.page(), 3);
    let health = store.health("gamma").unwrap();
    assert_eq!(health.consecutive_failures, 1);
    assert!(health.is_degraded);
    assert_eq!(health.last_error.as_deref(), Some(error.as_str()));

    let record = store.record(run_id, "gamma").unwrap();
    assert_eq!(record.status, SourceRunStatus::Failed);
    assert_eq!(record.error_message.as_deref(), Some(error.as_str()));
}

/// Test 5: Verify that an HTTP error status fails the source with the status
/// in the error text.
#[tokio::test]
async fn test_http_error_status_fails_source() {
    // Arrange
    let store = MockStore::new();
    let fetcher = MockFetcher::new();
    fetcher.respond_status(page_url("alpha", 1), 503);
    let registry = registry(ALPHA);
    let source = registry.select(Some("alpha")).unwrap().remove(0);

    // Act
    let result = service(&store, &fetcher)
        .ingest_source(&source, Uuid::new_v4(), in_a_minute(), &SilentReporter)
        .await;

    // Assert
    assert_eq!(result.status, SourceRunStatus::Failed);
    assert_eq!(
        result.error.as_deref(),
        Some("HTTP 503 from mock://alpha/page/1")
    );
}

/// Test 6: Verify that re-ingesting the same listing inserts nothing new.
#[tokio::test]
async fn test_reingest_is_idempotent() {
    // Arrange
    let store = MockStore::new();
    let fetcher = MockFetcher::new();
    fetcher
        .respond(page_url("alpha", 1), page_body("alpha", 0..50))
        .respond(page_url("alpha", 2), page_body("alpha", 50..62));
    let registry = registry(ALPHA);
    let source = registry.select(Some("alpha")).unwrap().remove(0);
    let service = service(&store, &fetcher);

    // Act
    let first = service
        .ingest_source(&source, Uuid::new_v4(), in_a_minute(), &SilentReporter)
        .await;
    let second = service
        .ingest_source(&source, Uuid::new_v4(), in_a_minute(), &SilentReporter)
        .await;

    // Assert
    assert_eq!(first.count, 62);
    assert_eq!(second.status, SourceRunStatus::Success);
    assert_eq!(second.count, 0);
    assert_eq!(second.duplicates, 62);
    assert_eq!(store.posting_count(), 62);
}

/// Test 7: Verify that a source inside its cooldown window is skipped without
/// any fetch or state write.
#[tokio::test]
async fn test_cooldown_skips_source() {
    // Arrange
    let store = MockStore::new();
    store.set_state(
        "cool",
        IngestionState::new(
            IngestionCursor::new(2, None),
            Some(Utc::now() - TimeDelta::minutes(10)),
        ),
    );
    let fetcher = MockFetcher::new();
    let registry = registry(
        r#"
[[sources]]
slug = "cool"
name = "Cool"
adapter = "adzuna"
cooldown_minutes = 60
"#,
    );
    let source = registry.select(Some("cool")).unwrap().remove(0);

    // Act
    let result = service(&store, &fetcher)
        .ingest_source(&source, Uuid::new_v4(), in_a_minute(), &SilentReporter)
        .await;

    // Assert
    assert_eq!(result.status, SourceRunStatus::Skipped);
    assert_eq!(result.error.as_deref(), Some("cooldown (50 min remaining)"));
    assert!(fetcher.requested_urls().is_empty());
    assert_eq!(store.save_state_calls(), 0);
    assert_eq!(store.state("cool").unwrap().cursor.page(), 2);
}

/// Test 8: Verify that exhausting the page budget leaves the cursor on the
/// next unread page and does not move `since`.
#[tokio::test]
async fn test_page_budget_resumes_next_run() {
    // Arrange
    let store = MockStore::new();
    let fetcher = MockFetcher::new();
    fetcher
        .respond(page_url("alpha", 1), page_body("alpha", 0..50))
        .respond(page_url("alpha", 2), page_body("alpha", 50..100))
        .respond(page_url("alpha", 3), page_body("alpha", 100..110));
    let registry = registry(ALPHA);
    let source = registry.select(Some("alpha")).unwrap().remove(0);
    let run_id = Uuid::new_v4();

    // Act
    let result = service(&store, &fetcher)
        .ingest_source(&source, run_id, in_a_minute(), &SilentReporter)
        .await;

    // Assert
    assert_eq!(result.status, SourceRunStatus::Success);
    assert_eq!(result.count, 100);
    assert_eq!(store.record(run_id, "alpha").unwrap().page_end, Some(2));
    let state = store.state("alpha").unwrap();
    assert_eq!(state.cursor.page(), 3);
    assert_eq!(state.cursor.since(), None);
    assert_eq!(
        fetcher.requested_urls(),
        vec![page_url("alpha", 1), page_url("alpha", 2)]
    );
}

/// Test 9: Verify that a passed deadline stops the loop after the first page.
#[tokio::test]
async fn test_deadline_stops_after_first_page() {
    // Arrange
    let store = MockStore::new();
    let fetcher = MockFetcher::new();
    fetcher
        .respond(page_url("deep", 1), page_body("deep", 0..50))
        .respond(page_url("deep", 2), page_body("deep", 50..100));
    let registry = registry(
        r#"
[[sources]]
slug = "deep"
name = "Deep"
adapter = "adzuna"
max_pages_per_run = 10
"#,
    );
    let source = registry.select(Some("deep")).unwrap().remove(0);

    // Act
    let result = service(&store, &fetcher)
        .ingest_source(&source, Uuid::new_v4(), Instant::now(), &SilentReporter)
        .await;

    // Assert
    assert_eq!(result.status, SourceRunStatus::Success);
    assert_eq!(result.count, 50);
    assert_eq!(fetcher.requested_urls(), vec![page_url("deep", 1)]);
    let state = store.state("deep").unwrap();
    assert_eq!(state.cursor.page(), 2);
    assert_eq!(state.cursor.since(), None);
}

/// Test 10: Verify that a page of only stale postings ends the walk.
#[tokio::test]
async fn test_all_stale_page_ends_listing() {
    // Arrange
    let store = MockStore::new();
    let fetcher = MockFetcher::new();
    fetcher.respond(page_url("alpha", 1), stale_body("alpha", 0..50));
    let registry = registry(ALPHA);
    let source = registry.select(Some("alpha")).unwrap().remove(0);

    // Act
    let result = service(&store, &fetcher)
        .ingest_source(&source, Uuid::new_v4(), in_a_minute(), &SilentReporter)
        .await;

    // Assert
    assert_eq!(result.status, SourceRunStatus::Success);
    assert_eq!(result.count, 0);
    assert_eq!(result.stale_filtered, 50);
    assert_eq!(fetcher.requested_urls().len(), 1);
    let state = store.state("alpha").unwrap();
    assert_eq!(state.cursor.page(), 1);
    assert!(state.cursor.since().is_some());
}

/// Test 11: Verify that a persistence failure fails the source.
#[tokio::test]
async fn test_upsert_failure_fails_source() {
    // Arrange
    let store = MockStore::new();
    store.inner.lock().unwrap().fail_upserts = Some("disk full".into());
    let fetcher = MockFetcher::new();
    fetcher.respond(page_url("alpha", 1), page_body("alpha", 0..5));
    let registry = registry(ALPHA);
    let source = registry.select(Some("alpha")).unwrap().remove(0);

    // Act
    let result = service(&store, &fetcher)
        .ingest_source(&source, Uuid::new_v4(), in_a_minute(), &SilentReporter)
        .await;

    // Assert
    assert_eq!(result.status, SourceRunStatus::Failed);
    assert_eq!(result.error.as_deref(), Some("Persistence error: disk full"));
    assert_eq!(store.health("alpha").unwrap().consecutive_failures, 1);
}

// =============================================================================
// Feeds and company boards
// =============================================================================

const FEEDS: &str = r#"
[[sources]]
slug = "feeds"
name = "Feeds"
adapter = "rss"
feeds = ["mock://feeds/a.xml", "mock://feeds/b.xml"]
"#;

/// Test 12: Verify that one failing feed does not fail a feed source.
#[tokio::test]
async fn test_feed_failure_is_tolerated() {
    // Arrange
    let store = MockStore::new();
    let fetcher = MockFetcher::new();
    fetcher
        .respond("mock://feeds/a.xml", page_body("feeds", 0..3))
        .fail("mock://feeds/b.xml", "connection reset");
    let registry = registry(FEEDS);
    let source = registry.select(Some("feeds")).unwrap().remove(0);

    // Act
    let result = service(&store, &fetcher)
        .ingest_source(&source, Uuid::new_v4(), in_a_minute(), &SilentReporter)
        .await;

    // Assert
    assert_eq!(result.status, SourceRunStatus::Success);
    assert_eq!(result.count, 3);
    assert_eq!(fetcher.requested_urls().len(), 2);
    assert!(store.state("feeds").unwrap().cursor.since().is_some());
}

/// Test 13: Verify that a feed source fails when every feed fails.
#[tokio::test]
async fn test_all_feeds_failing_fails_source() {
    // Arrange
    let store = MockStore::new();
    let fetcher = MockFetcher::new();
    fetcher
        .fail("mock://feeds/a.xml", "connection reset")
        .respond_status("mock://feeds/b.xml", 500);
    let registry = registry(FEEDS);
    let source = registry.select(Some("feeds")).unwrap().remove(0);

    // Act
    let result = service(&store, &fetcher)
        .ingest_source(&source, Uuid::new_v4(), in_a_minute(), &SilentReporter)
        .await;

    // Assert
    assert_eq!(result.status, SourceRunStatus::Failed);
    assert!(
        result.error.unwrap().starts_with("all 2 feeds failed: "),
        "error should name the feed count"
    );
    assert_eq!(store.health("feeds").unwrap().consecutive_failures, 1);
}

/// Test 14: Verify that a company source seeds its targets, fetches each
/// board and records the outcome on every target.
#[tokio::test]
async fn test_company_source_rotates_boards() {
    // Arrange
    let store = MockStore::new();
    let fetcher = MockFetcher::new();
    fetcher
        .respond(board_url("greenhouse", "stripe"), page_body("gh", 0..2))
        .respond(board_url("greenhouse", "figma"), b"[]".to_vec());
    let registry = registry(
        r#"
[[sources]]
slug = "gh"
name = "Greenhouse"
adapter = "greenhouse"
companies = [" Stripe ", "figma"]
"#,
    );
    let source = registry.select(Some("gh")).unwrap().remove(0);

    // Act
    let result = service(&store, &fetcher)
        .ingest_source(&source, Uuid::new_v4(), in_a_minute(), &SilentReporter)
        .await;

    // Assert
    assert_eq!(result.status, SourceRunStatus::Success);
    assert_eq!(result.count, 2);

    let stripe = store.target("greenhouse", "stripe").unwrap();
    assert_eq!(stripe.last_jobs_found, 2);
    assert!((stripe.velocity - 0.6).abs() < 1e-9);

    let figma = store.target("greenhouse", "figma").unwrap();
    assert_eq!(figma.consecutive_empty_runs, 1);
    assert!(figma.cooling_until.is_none());
}

/// Test 15: Verify that a company source with no targets completes empty.
#[tokio::test]
async fn test_company_source_without_targets_completes() {
    // Arrange
    let store = MockStore::new();
    let fetcher = MockFetcher::new();
    let registry = registry(
        r#"
[[sources]]
slug = "lever"
name = "Lever"
adapter = "lever"
"#,
    );
    let source = registry.select(Some("lever")).unwrap().remove(0);

    // Act
    let result = service(&store, &fetcher)
        .ingest_source(&source, Uuid::new_v4(), in_a_minute(), &SilentReporter)
        .await;

    // Assert
    assert_eq!(result.status, SourceRunStatus::Success);
    assert_eq!(result.count, 0);
    assert!(fetcher.requested_urls().is_empty());
}

/// Test 16: Verify that a failure on page 2 keeps page 1's postings, leaves the
/// cursor on the failing page and lets the next run resume from there.
#[tokio::test]
async fn test_failure_after_first_page_resumes_from_failing_page() {
    // Arrange
    let store = MockStore::new();
    let fetcher = MockFetcher::new();
    fetcher
        .respond(page_url("alpha", 1), page_body("alpha", 0..50))
        .respond_status(page_url("alpha", 2), 503);
    let registry = registry(ALPHA);
    let source = registry.select(Some("alpha")).unwrap().remove(0);
    let service = service(&store, &fetcher);
    let run_id = Uuid::new_v4();

    // Act
    let result = service
        .ingest_source(&source, run_id, in_a_minute(), &SilentReporter)
        .await;

    // Assert
    assert_eq!(result.status, SourceRunStatus::Failed);
    assert_eq!(
        result.error.as_deref(),
        Some("HTTP 503 from mock://alpha/page/2")
    );
    assert_eq!(result.count, 50);
    assert_eq!(store.posting_count(), 50, "Page 1 stays persisted");

    let state = store.state("alpha").unwrap();
    assert_eq!(state.cursor.page(), 2);
    assert_eq!(state.cursor.since(), None);

    let health = store.health("alpha").unwrap();
    assert_eq!(health.consecutive_failures, 1);
    assert!(health.is_degraded);

    let record = store.record(run_id, "alpha").unwrap();
    assert_eq!(record.status, SourceRunStatus::Failed);
    assert_eq!(record.page_start, 1);
    assert_eq!(record.page_end, Some(2));
    assert_eq!(record.counts.inserted, 50);

    // Act: the provider recovers
    fetcher.respond(page_url("alpha", 2), page_body("alpha", 50..60));
    let resumed = service
        .ingest_source(&source, Uuid::new_v4(), in_a_minute(), &SilentReporter)
        .await;

    // Assert
    assert_eq!(resumed.status, SourceRunStatus::Success);
    assert_eq!(resumed.count, 10);
    assert_eq!(store.posting_count(), 60);
    assert_eq!(
        fetcher.requested_urls(),
        vec![
            page_url("alpha", 1),
            page_url("alpha", 2),
            page_url("alpha", 2)
        ]
    );
    assert_eq!(store.state("alpha").unwrap().cursor.page(), 1);
    assert_eq!(store.health("alpha").unwrap().consecutive_failures, 0);
}
