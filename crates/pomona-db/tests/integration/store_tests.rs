//! Integration tests for PgStore.
//!
//! These tests verify every store trait against a real PostgreSQL database.
//! Each test runs in an isolated container.

use chrono::{Duration, TimeZone, Utc};
use pomona_core::healer::{
    Alert, AlertSeverity, FailureType, HealingAction, HealingAttempt, HealingResult,
};
use pomona_core::rotation::{CompanyTarget, TargetStatus};
use pomona_core::run::{IngestionCounts, RunStatus, RunTotals, SourceRunRecord, SourceRunStatus};
use pomona_core::traits::{
    AlertSink, CompanyTargetStore, CursorStore, HealingStore, HealthStore, PolicyStore,
    PostingStore, RunStore,
};
use pomona_core::{HealthUpdate, IngestionCursor, IngestionState};

use crate::integration::common::{sample_posting, setup_test_store};

fn counts(normalized: usize, inserted: usize) -> IngestionCounts {
    IngestionCounts {
        normalized,
        inserted,
        ..IngestionCounts::default()
    }
}

// =============================================================================
// Cursor
// =============================================================================

/// Test 1: Verify that a saved cursor is returned unchanged
#[tokio::test]
async fn test_cursor_roundtrip() {
    let (store, _container) = setup_test_store().await;

    assert!(store.get_state("adzuna-gb").await.unwrap().is_none());

    let since = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
    let ran = Utc.with_ymd_and_hms(2026, 10, 2, 12, 0, 0).unwrap();
    let state = IngestionState::new(IngestionCursor::new(4, Some(since)), Some(ran));
    store.save_state("adzuna-gb", &state).await.unwrap();

    let loaded = store.get_state("adzuna-gb").await.unwrap().unwrap();
    assert_eq!(loaded, state);
}

/// Test 2: Verify that reset rewinds the page and keeps `since`
#[tokio::test]
async fn test_reset_cursor_keeps_since() {
    let (store, _container) = setup_test_store().await;

    let since = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
    let state = IngestionState::new(IngestionCursor::new(9, Some(since)), None);
    store.save_state("reed", &state).await.unwrap();

    store.reset_cursor("reed").await.unwrap();

    let loaded = store.get_state("reed").await.unwrap().unwrap();
    assert_eq!(loaded.cursor.page(), 1);
    assert_eq!(loaded.cursor.since(), Some(since));
}

// =============================================================================
// Runs
// =============================================================================

/// Test 3: Verify that a terminal run status is written once
#[tokio::test]
async fn test_finish_run_is_write_once() {
    let (store, _container) = setup_test_store().await;
    let started = Utc::now();

    let run = store
        .create_run(&["adzuna-gb".to_string()], started)
        .await
        .unwrap();
    assert_eq!(run.status, RunStatus::Running);

    let totals = RunTotals {
        sources: 1,
        succeeded: 1,
        inserted: 3,
        ..RunTotals::default()
    };
    let first = store
        .finish_run(run.id, RunStatus::Success, &totals, started + Duration::seconds(5))
        .await
        .unwrap();
    let second = store
        .mark_run_failed(run.id, "late reaper", started + Duration::seconds(9))
        .await
        .unwrap();

    assert!(first);
    assert!(!second, "terminal status must not be overwritten");

    let runs = store.recent_runs(10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Success);
    assert_eq!(runs[0].totals, Some(totals));
    assert!(runs[0].error_message.is_none());
}

/// Test 4: Verify that only old running runs are reported as stuck
#[tokio::test]
async fn test_find_stuck_runs() {
    let (store, _container) = setup_test_store().await;
    let now = Utc::now();

    let old = store
        .create_run(&[], now - Duration::hours(3))
        .await
        .unwrap();
    let finished = store
        .create_run(&[], now - Duration::hours(4))
        .await
        .unwrap();
    store
        .finish_run(finished.id, RunStatus::Failed, &RunTotals::default(), now)
        .await
        .unwrap();
    store.create_run(&[], now).await.unwrap();

    let stuck = store
        .find_stuck_runs(now - Duration::hours(2))
        .await
        .unwrap();

    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0].id, old.id);
}

/// Test 5: Verify that a source record is replaced on the second write
#[tokio::test]
async fn test_upsert_source_record_replaces() {
    let (store, _container) = setup_test_store().await;
    let started = Utc::now();
    let run = store
        .create_run(&["jooble".to_string()], started)
        .await
        .unwrap();

    let mut record =
        SourceRunRecord::start(run.id, "jooble", started, IngestionCursor::new(3, None));
    store.upsert_source_record(&record).await.unwrap();

    record.status = SourceRunStatus::Success;
    record.finished_at = Some(started + Duration::seconds(2));
    record.page_end = Some(5);
    record.cursor_out = Some(IngestionCursor::new(6, None));
    record.counts = counts(40, 12);
    store.upsert_source_record(&record).await.unwrap();

    let records = store.source_records(run.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, SourceRunStatus::Success);
    assert_eq!(records[0].page_start, 3);
    assert_eq!(records[0].page_end, Some(5));
    assert_eq!(records[0].counts, counts(40, 12));
}

// =============================================================================
// Health
// =============================================================================

/// Test 6: Verify that failures accumulate and a success resets them
#[tokio::test]
async fn test_health_failure_counter() {
    let (store, _container) = setup_test_store().await;
    let at = Utc::now();

    for i in 0..3 {
        store
            .record_outcome(
                "usajobs",
                &HealthUpdate::Failure {
                    at: at + Duration::minutes(i),
                    error: "request timed out".to_string(),
                    counts: IngestionCounts::default(),
                },
            )
            .await
            .unwrap();
    }

    let health = store.get_health("usajobs").await.unwrap().unwrap();
    assert_eq!(health.consecutive_failures, 3);
    assert!(health.is_degraded);
    assert_eq!(health.last_error.as_deref(), Some("request timed out"));
    assert_eq!(store.list_degraded().await.unwrap().len(), 1);

    store
        .record_outcome(
            "usajobs",
            &HealthUpdate::Success {
                at: at + Duration::minutes(10),
                counts: counts(20, 7),
            },
        )
        .await
        .unwrap();

    let health = store.get_health("usajobs").await.unwrap().unwrap();
    assert_eq!(health.consecutive_failures, 0);
    assert!(!health.is_degraded);
    assert_eq!(health.last_counts, counts(20, 7));
    // The last error is kept for diagnosis
    assert_eq!(health.last_error.as_deref(), Some("request timed out"));
    assert!(store.list_degraded().await.unwrap().is_empty());
}

/// Test 7: Verify that heal counters reset only for attempts before the boundary
#[tokio::test]
async fn test_reset_heal_attempts() {
    let (store, _container) = setup_test_store().await;
    let now = Utc::now();

    store
        .record_heal_attempt("old", now - Duration::hours(30))
        .await
        .unwrap();
    store
        .record_heal_attempt("old", now - Duration::hours(26))
        .await
        .unwrap();
    store
        .record_heal_attempt("fresh", now - Duration::hours(1))
        .await
        .unwrap();

    let reset = store
        .reset_heal_attempts(now - Duration::hours(24))
        .await
        .unwrap();
    assert_eq!(reset, 1);

    let old = store.get_health("old").await.unwrap().unwrap();
    let fresh = store.get_health("fresh").await.unwrap().unwrap();
    assert_eq!(old.heal_attempts_24h, 0);
    assert_eq!(fresh.heal_attempts_24h, 1);
    assert_eq!(store.list_health().await.unwrap().len(), 2);
}

// =============================================================================
// Postings
// =============================================================================

/// Test 8: Verify that only new identities count as inserted
#[tokio::test]
async fn test_upsert_postings_counts_new_rows() {
    let (store, _container) = setup_test_store().await;

    let batch = vec![
        sample_posting("adzuna-gb", "1"),
        sample_posting("adzuna-gb", "2"),
    ];
    assert_eq!(store.upsert_postings(&batch).await.unwrap(), 2);

    let mut changed = sample_posting("adzuna-gb", "2");
    changed.job.title = "Staff Rust Engineer".to_string();
    let batch = vec![changed, sample_posting("adzuna-gb", "3")];
    assert_eq!(store.upsert_postings(&batch).await.unwrap(), 1);

    let title: (String,) = sqlx::query_as(
        "SELECT title FROM job_postings WHERE source_slug = 'adzuna-gb' AND external_id = '2'",
    )
    .fetch_one(store.pool())
    .await
    .unwrap();
    assert_eq!(title.0, "Staff Rust Engineer");

    let totals = store.posting_counts().await.unwrap();
    assert_eq!(totals.len(), 1);
    assert_eq!(totals[0].postings, 3);
}

/// Test 9: Verify that the same external id under two sources is two postings
#[tokio::test]
async fn test_posting_identity_includes_source() {
    let (store, _container) = setup_test_store().await;

    let batch = vec![sample_posting("reed", "42"), sample_posting("jooble", "42")];
    assert_eq!(store.upsert_postings(&batch).await.unwrap(), 2);
    assert_eq!(store.upsert_postings(&[]).await.unwrap(), 0);
}

// =============================================================================
// Policy
// =============================================================================

/// Test 10: Verify that set_source_enabled creates and updates an override
#[tokio::test]
async fn test_policy_override_upsert() {
    let (store, _container) = setup_test_store().await;

    store
        .set_source_enabled("theirstack", false, "auto-disabled after 10 failures")
        .await
        .unwrap();
    let overrides = store.load_overrides().await.unwrap();
    assert_eq!(overrides.len(), 1);
    assert_eq!(overrides[0].enabled, Some(false));
    assert_eq!(
        overrides[0].reason.as_deref(),
        Some("auto-disabled after 10 failures")
    );
    assert!(overrides[0].max_pages_per_run.is_none());

    store
        .set_source_enabled("theirstack", true, "re-enabled by operator")
        .await
        .unwrap();
    let overrides = store.load_overrides().await.unwrap();
    assert_eq!(overrides[0].enabled, Some(true));
}

// =============================================================================
// Company targets
// =============================================================================

/// Test 11: Verify that ensure_targets never resets existing rotation state
#[tokio::test]
async fn test_ensure_targets_is_idempotent() {
    let (store, _container) = setup_test_store().await;

    let targets = vec![
        CompanyTarget::new("greenhouse", "acme"),
        CompanyTarget::new("greenhouse", "globex"),
    ];
    assert_eq!(store.ensure_targets(&targets).await.unwrap(), 2);

    let mut acme = CompanyTarget::new("greenhouse", "acme");
    acme.velocity = 4.5;
    acme.last_jobs_found = 12;
    store.save_target(&acme).await.unwrap();

    assert_eq!(store.ensure_targets(&targets).await.unwrap(), 0);
    let listed = store.list_targets("greenhouse").await.unwrap();
    assert_eq!(listed[0].company_slug, "acme");
    assert_eq!(listed[0].last_jobs_found, 12);
}

/// Test 12: Verify selection order and that cooling targets are excluded
#[tokio::test]
async fn test_select_targets_order_and_cooling() {
    let (store, _container) = setup_test_store().await;
    let now = Utc::now();

    let mut fast = CompanyTarget::new("lever", "fast");
    fast.velocity = 10.0;
    let mut slow = CompanyTarget::new("lever", "slow");
    slow.velocity = 1.0;
    let mut cooling = CompanyTarget::new("lever", "cooling");
    cooling.velocity = 50.0;
    cooling.cooling_until = Some(now + Duration::days(2));
    cooling.status = TargetStatus::Cooling;
    let other = CompanyTarget::new("greenhouse", "other");

    for target in [&fast, &slow, &cooling, &other] {
        store.save_target(target).await.unwrap();
    }

    let selected = store.select_targets("lever", 10, now).await.unwrap();
    let slugs: Vec<&str> = selected.iter().map(|t| t.company_slug.as_str()).collect();
    assert_eq!(slugs, vec!["fast", "slow"]);

    let limited = store.select_targets("lever", 1, now).await.unwrap();
    assert_eq!(limited.len(), 1);

    let later = store
        .select_targets("lever", 10, now + Duration::days(3))
        .await
        .unwrap();
    assert_eq!(later[0].company_slug, "cooling");
    assert_eq!(later[0].status, TargetStatus::Cooling);
}

// =============================================================================
// Healing attempts and alerts
// =============================================================================

/// Test 13: Verify that healing attempts come back newest first
#[tokio::test]
async fn test_recent_attempts_newest_first() {
    let (store, _container) = setup_test_store().await;
    // Whole seconds, so the value survives timestamptz's microsecond precision
    let at = Utc.with_ymd_and_hms(2026, 10, 3, 8, 0, 0).unwrap();

    let older = HealingAttempt {
        source: "reed".to_string(),
        failure_type: FailureType::Timeout,
        action: HealingAction::Retry,
        result: HealingResult::Failed,
        detail: Some("still timing out".to_string()),
        attempted_at: at - Duration::minutes(15),
    };
    let newer = HealingAttempt {
        source: "reed".to_string(),
        failure_type: FailureType::ParseError,
        action: HealingAction::ResetCursor,
        result: HealingResult::Success,
        detail: None,
        attempted_at: at,
    };
    store.record_attempt(&older).await.unwrap();
    store.record_attempt(&newer).await.unwrap();

    let attempts = store.recent_attempts(10).await.unwrap();
    assert_eq!(attempts, vec![newer, older]);
    assert_eq!(store.recent_attempts(1).await.unwrap().len(), 1);
}

/// Test 14: Verify that alerts are persisted and filtered by severity
#[tokio::test]
async fn test_alerts_filtered_by_severity() {
    let (store, _container) = setup_test_store().await;

    store
        .emit(&Alert {
            alert_type: "source_disabled".to_string(),
            severity: AlertSeverity::Critical,
            title: "Source reed disabled".to_string(),
            description: "10 consecutive failures".to_string(),
            source: Some("reed".to_string()),
        })
        .await
        .unwrap();
    store
        .emit(&Alert {
            alert_type: "healing_escalation".to_string(),
            severity: AlertSeverity::Warning,
            title: "Escalating jooble".to_string(),
            description: "heal attempts exhausted".to_string(),
            source: Some("jooble".to_string()),
        })
        .await
        .unwrap();

    let all = store.recent_alerts(AlertSeverity::Info, 10).await.unwrap();
    assert_eq!(all.len(), 2);

    let critical = store
        .recent_alerts(AlertSeverity::Critical, 10)
        .await
        .unwrap();
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].alert_type, "source_disabled");
    assert_eq!(critical[0].severity, "critical");
}
