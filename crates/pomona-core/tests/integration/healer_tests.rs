//! Integration tests for HealerService.

use chrono::{TimeDelta, Utc};
use pomona_core::{
    AlertSeverity, FailureType, HealerConfig, HealerService, HealingAction, HealingResult,
    IngestionCursor, IngestionRun, IngestionState, PolicyOverride, RunStatus, SourceHealth,
    SourceRegistry,
};
use uuid::Uuid;

use crate::integration::common::{MockStore, MockTrigger, RecordingAlertSink, registry};

type Healer = HealerService<MockStore, MockTrigger, RecordingAlertSink>;

fn healer(store: &MockStore, trigger: &MockTrigger, alerts: &RecordingAlertSink) -> Healer {
    HealerService::new(
        store.clone(),
        trigger.clone(),
        alerts.clone(),
        HealerConfig::default(),
    )
}

fn catalog() -> SourceRegistry {
    registry(
        r#"
[[sources]]
slug = "alpha"
name = "Alpha"
adapter = "adzuna"

[[sources]]
slug = "beta"
name = "Beta"
adapter = "reed"
"#,
    )
}

fn degraded(source: &str, failures: u32, error: &str) -> SourceHealth {
    let mut health = SourceHealth::new(source);
    health.is_degraded = true;
    health.consecutive_failures = failures;
    health.last_error = Some(error.to_string());
    health.last_error_at = Some(Utc::now());
    health
}

fn running_since(minutes_ago: i64, sources: &[&str]) -> IngestionRun {
    IngestionRun {
        id: Uuid::new_v4(),
        started_at: Utc::now() - TimeDelta::minutes(minutes_ago),
        finished_at: None,
        status: RunStatus::Running,
        sources_requested: sources.iter().map(|s| s.to_string()).collect(),
        totals: None,
        error_message: None,
    }
}

/// Test 1: Verify that a run stuck past the threshold is marked failed and
/// one `stuck_run` attempt is logged per source it named.
#[tokio::test]
async fn test_reaps_stuck_run() {
    // Arrange
    let store = MockStore::new();
    let stuck = running_since(20, &["alpha", "beta"]);
    let fresh = running_since(5, &["alpha"]);
    store.insert_run(stuck.clone());
    store.insert_run(fresh.clone());
    let trigger = MockTrigger::new(RunStatus::Success);
    let alerts = RecordingAlertSink::default();
    let mut registry = catalog();

    // Act
    let report = healer(&store, &trigger, &alerts)
        .run_pass(&mut registry, Utc::now())
        .await
        .unwrap();

    // Assert
    assert_eq!(report.stuck_runs_reaped, 1);
    let reaped = store.run(stuck.id).unwrap();
    assert_eq!(reaped.status, RunStatus::Failed);
    assert_eq!(
        reaped.error_message.as_deref(),
        Some("run did not finish within 15 minutes; marked failed by healer")
    );
    assert_eq!(store.run(fresh.id).unwrap().status, RunStatus::Running);

    let attempts = store.attempts();
    assert_eq!(attempts.len(), 2);
    for attempt in &attempts {
        assert_eq!(attempt.failure_type, FailureType::StuckRun);
        assert_eq!(attempt.action, HealingAction::MarkFailed);
        assert_eq!(attempt.result, HealingResult::Success);
    }
    assert!(trigger.calls().is_empty());
}

/// Test 2: Verify that a timed-out source is retried through the trigger.
#[tokio::test]
async fn test_timeout_is_retried() {
    // Arrange
    let store = MockStore::new();
    store.set_health(degraded("alpha", 1, "Request timed out after 30 seconds"));
    let trigger = MockTrigger::new(RunStatus::Success);
    let alerts = RecordingAlertSink::default();
    let mut registry = catalog();

    // Act
    let report = healer(&store, &trigger, &alerts)
        .run_pass(&mut registry, Utc::now())
        .await
        .unwrap();

    // Assert
    assert_eq!(trigger.calls(), vec!["alpha"]);
    assert_eq!(report.attempts.len(), 1);
    let attempt = &report.attempts[0];
    assert_eq!(attempt.failure_type, FailureType::Timeout);
    assert_eq!(attempt.action, HealingAction::Retry);
    assert_eq!(attempt.result, HealingResult::Success);

    assert_eq!(store.health("alpha").unwrap().heal_attempts_24h, 1);
    assert_eq!(store.attempts().len(), 1);
    assert!(alerts.alerts().is_empty());
}

/// Test 3: Verify that a failing retry is recorded as failed.
#[tokio::test]
async fn test_failed_retry_is_recorded() {
    // Arrange
    let store = MockStore::new();
    store.set_health(degraded("alpha", 2, "HTTP 502 from https://api.example.com"));
    let trigger = MockTrigger::new(RunStatus::Failed);
    let alerts = RecordingAlertSink::default();
    let mut registry = catalog();

    // Act
    let report = healer(&store, &trigger, &alerts)
        .run_pass(&mut registry, Utc::now())
        .await
        .unwrap();

    // Assert
    let attempt = &report.attempts[0];
    assert_eq!(attempt.failure_type, FailureType::HttpError);
    assert_eq!(attempt.action, HealingAction::Retry);
    assert_eq!(attempt.result, HealingResult::Failed);
}

/// Test 4: Verify that a parse failure rewinds the cursor.
#[tokio::test]
async fn test_parse_error_resets_cursor() {
    // Arrange
    let store = MockStore::new();
    let since = Utc::now() - TimeDelta::days(1);
    store.set_state(
        "beta",
        IngestionState::new(IngestionCursor::new(4, Some(since)), None),
    );
    store.set_health(degraded("beta", 1, "Parse error: invalid JSON payload"));
    let trigger = MockTrigger::new(RunStatus::Success);
    let alerts = RecordingAlertSink::default();
    let mut registry = catalog();

    // Act
    let report = healer(&store, &trigger, &alerts)
        .run_pass(&mut registry, Utc::now())
        .await
        .unwrap();

    // Assert
    let attempt = &report.attempts[0];
    assert_eq!(attempt.action, HealingAction::ResetCursor);
    assert_eq!(attempt.result, HealingResult::Success);
    let cursor = store.state("beta").unwrap().cursor;
    assert_eq!(cursor.page(), 1);
    assert_eq!(cursor.since(), Some(since), "since is kept");
    assert!(trigger.calls().is_empty());
}

/// Test 5: Verify that reaching the failure threshold disables the source
/// through an override and raises a critical alert.
#[tokio::test]
async fn test_threshold_disables_source() {
    // Arrange
    let store = MockStore::new();
    store.set_health(degraded("alpha", 5, "HTTP 500 from https://api.example.com"));
    let trigger = MockTrigger::new(RunStatus::Success);
    let alerts = RecordingAlertSink::default();
    let mut registry = catalog();

    // Act
    let report = healer(&store, &trigger, &alerts)
        .run_pass(&mut registry, Utc::now())
        .await
        .unwrap();

    // Assert
    assert_eq!(report.attempts[0].action, HealingAction::DisableSource);
    let over = store.override_for("alpha").unwrap();
    assert_eq!(over.enabled, Some(false));
    assert!(over.reason.unwrap().starts_with("disabled by healer: "));

    let alerts = alerts.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, "source_disabled");
    assert_eq!(alerts[0].severity, AlertSeverity::Critical);
    assert_eq!(alerts[0].source.as_deref(), Some("alpha"));

    // The next refresh sees the override
    registry.refresh(&store, Utc::now()).await.unwrap();
    let selected = registry.select(None).unwrap();
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].slug(), "beta");
}

/// Test 6: Verify that a source out of daily attempts is escalated instead of
/// retried.
#[tokio::test]
async fn test_attempt_budget_escalates() {
    // Arrange
    let store = MockStore::new();
    let now = Utc::now();
    let mut health = degraded("alpha", 2, "Request timed out after 30 seconds");
    health.heal_attempts_24h = 3;
    health.last_heal_attempt_at = Some(now);
    store.set_health(health);
    let trigger = MockTrigger::new(RunStatus::Success);
    let alerts = RecordingAlertSink::default();
    let mut registry = catalog();

    // Act
    let report = healer(&store, &trigger, &alerts)
        .run_pass(&mut registry, now)
        .await
        .unwrap();

    // Assert
    assert_eq!(report.attempts[0].action, HealingAction::Escalate);
    assert_eq!(report.attempts[0].result, HealingResult::Logged);
    assert!(trigger.calls().is_empty());
    let alerts = alerts.alerts();
    assert_eq!(alerts[0].alert_type, "healing_escalated");
    assert_eq!(alerts[0].severity, AlertSeverity::Warning);
}

/// Test 7: Verify that an authentication failure escalates as critical.
#[tokio::test]
async fn test_auth_failure_escalates_critical() {
    // Arrange
    let store = MockStore::new();
    store.set_health(degraded("beta", 1, "HTTP 401 from https://api.example.com"));
    let trigger = MockTrigger::new(RunStatus::Success);
    let alerts = RecordingAlertSink::default();
    let mut registry = catalog();

    // Act
    let report = healer(&store, &trigger, &alerts)
        .run_pass(&mut registry, Utc::now())
        .await
        .unwrap();

    // Assert
    assert_eq!(report.attempts[0].failure_type, FailureType::AuthError);
    assert_eq!(report.attempts[0].action, HealingAction::Escalate);
    assert_eq!(alerts.alerts()[0].severity, AlertSeverity::Critical);
}

/// Test 8: Verify that sources disabled by override or no longer configured
/// are left alone.
#[tokio::test]
async fn test_disabled_and_unknown_sources_are_skipped() {
    // Arrange
    let store = MockStore::new();
    store.set_health(degraded("alpha", 1, "Request timed out after 30 seconds"));
    store.set_health(degraded("ghost", 1, "Request timed out after 30 seconds"));
    store.inner.lock().unwrap().overrides.insert(
        "alpha".into(),
        PolicyOverride {
            source: "alpha".into(),
            enabled: Some(false),
            ..Default::default()
        },
    );
    let trigger = MockTrigger::new(RunStatus::Success);
    let alerts = RecordingAlertSink::default();
    let mut registry = catalog();

    // Act
    let report = healer(&store, &trigger, &alerts)
        .run_pass(&mut registry, Utc::now())
        .await
        .unwrap();

    // Assert
    assert!(report.attempts.is_empty());
    assert!(trigger.calls().is_empty());
}

/// Test 9: Verify that heal counters from before today are reset.
#[tokio::test]
async fn test_daily_counter_reset() {
    // Arrange
    let store = MockStore::new();
    let mut health = SourceHealth::new("beta");
    health.heal_attempts_24h = 2;
    health.last_heal_attempt_at = Some(Utc::now() - TimeDelta::days(2));
    store.set_health(health);
    let trigger = MockTrigger::new(RunStatus::Success);
    let alerts = RecordingAlertSink::default();
    let mut registry = catalog();

    // Act
    let report = healer(&store, &trigger, &alerts)
        .run_pass(&mut registry, Utc::now())
        .await
        .unwrap();

    // Assert
    assert_eq!(report.counters_reset, 1);
    assert_eq!(store.health("beta").unwrap().heal_attempts_24h, 0);
}

/// Test 10: Verify that an exhausted budget alerts once, while later passes
/// the same day still record the escalation without alerting again.
#[tokio::test]
async fn test_exhausted_budget_alerts_once() {
    // Arrange
    let store = MockStore::new();
    let now = Utc::now();
    let mut health = degraded("alpha", 2, "Request timed out after 30 seconds");
    health.heal_attempts_24h = 3;
    health.last_heal_attempt_at = Some(now);
    store.set_health(health);
    let trigger = MockTrigger::new(RunStatus::Success);
    let alerts = RecordingAlertSink::default();
    let mut registry = catalog();
    let healer = healer(&store, &trigger, &alerts);

    // Act
    let first = healer.run_pass(&mut registry, now).await.unwrap();
    let second = healer.run_pass(&mut registry, now).await.unwrap();
    let third = healer.run_pass(&mut registry, now).await.unwrap();

    // Assert
    for report in [&first, &second, &third] {
        assert_eq!(report.attempts[0].action, HealingAction::Escalate);
    }
    assert_eq!(alerts.alerts().len(), 1, "Only the exhausting pass alerts");
    assert_eq!(store.attempts().len(), 3, "Every pass is still recorded");
    assert_eq!(store.health("alpha").unwrap().heal_attempts_24h, 6);
    assert!(trigger.calls().is_empty());
}
