//! Integration tests for RotationService.

use chrono::{TimeDelta, Utc};
use pomona_core::{AdapterFactory, CompanyTarget, RotationConfig, RotationService, TargetStatus};

use crate::integration::common::{
    MockAdapterFactory, MockFetcher, MockStore, board_url, page_body, registry,
};

fn greenhouse() -> pomona_core::SourceEntry {
    registry(
        r#"
[[sources]]
slug = "gh"
name = "Greenhouse"
adapter = "greenhouse"
"#,
    )
    .entries()[0]
        .clone()
}

/// Test 1: Verify that seeding is idempotent and keeps target state.
#[tokio::test]
async fn test_seed_keeps_existing_targets() {
    // Arrange
    let store = MockStore::new();
    let service = RotationService::new(store.clone(), MockFetcher::new(), RotationConfig::default());
    let mut known = CompanyTarget::new("greenhouse", "stripe");
    known.velocity = 4.0;
    store.inner.lock().unwrap().targets.insert(
        ("greenhouse".into(), "stripe".into()),
        known,
    );

    // Act
    let created = service
        .seed("greenhouse", &["Stripe".to_string(), "figma".to_string(), "  ".to_string()])
        .await
        .unwrap();

    // Assert
    assert_eq!(created, 1);
    assert_eq!(store.target("greenhouse", "stripe").unwrap().velocity, 4.0);
    assert!(store.target("greenhouse", "figma").is_some());
}

/// Test 2: Verify that the third consecutive empty board starts cooling and
/// is then excluded from selection.
#[tokio::test]
async fn test_empty_boards_cool_down() {
    // Arrange
    let store = MockStore::new();
    let fetcher = MockFetcher::new();
    fetcher.respond(board_url("greenhouse", "quiet"), b"[]".to_vec());
    let mut quiet = CompanyTarget::new("greenhouse", "quiet");
    quiet.consecutive_empty_runs = 2;
    store.inner.lock().unwrap().targets.insert(
        ("greenhouse".into(), "quiet".into()),
        quiet,
    );
    let adapter = MockAdapterFactory::new().create(&greenhouse()).unwrap();
    let service = RotationService::new(store.clone(), fetcher.clone(), RotationConfig::default());
    let now = Utc::now();

    // Act
    let pass = service.run_pass(&adapter, "greenhouse", now).await.unwrap();
    let next = service
        .run_pass(&adapter, "greenhouse", now + TimeDelta::hours(1))
        .await
        .unwrap();

    // Assert
    assert_eq!(pass.selected, 1);
    assert_eq!(pass.empty, 1);
    let target = store.target("greenhouse", "quiet").unwrap();
    assert_eq!(target.consecutive_empty_runs, 3);
    assert_eq!(target.status, TargetStatus::Cooling);
    assert_eq!(target.cooling_until, Some(now + TimeDelta::hours(24)));

    assert_eq!(next.selected, 0, "Cooling target is not selected");
    assert_eq!(fetcher.requested_urls().len(), 1);
}

/// Test 3: Verify that selection prefers high-velocity targets and respects
/// the batch size.
#[tokio::test]
async fn test_selection_prefers_velocity() {
    // Arrange
    let store = MockStore::new();
    let fetcher = MockFetcher::new();
    for (slug, velocity) in [("slow", 0.5), ("fast", 9.0), ("mid", 3.0)] {
        let mut target = CompanyTarget::new("greenhouse", slug);
        target.velocity = velocity;
        store
            .inner
            .lock()
            .unwrap()
            .targets
            .insert(("greenhouse".into(), slug.into()), target);
        fetcher.respond(board_url("greenhouse", slug), page_body("gh", 0..1));
    }
    let adapter = MockAdapterFactory::new().create(&greenhouse()).unwrap();
    let config = RotationConfig::default().with_batch_size(2);
    let service = RotationService::new(store.clone(), fetcher.clone(), config);

    // Act
    let pass = service
        .run_pass(&adapter, "greenhouse", Utc::now())
        .await
        .unwrap();

    // Assert
    assert_eq!(pass.selected, 2);
    assert_eq!(pass.found, 2);
    let mut urls = fetcher.requested_urls();
    urls.sort();
    assert_eq!(
        urls,
        vec![
            board_url("greenhouse", "fast"),
            board_url("greenhouse", "mid")
        ]
    );
    assert!(store.target("greenhouse", "slow").unwrap().last_attempt_at.is_none());
}

/// Test 4: Verify that a failed board is marked failing without touching its
/// empty-run count, and that the pass reports all targets failed.
#[tokio::test]
async fn test_failed_board_marks_target_failing() {
    // Arrange
    let store = MockStore::new();
    let fetcher = MockFetcher::new();
    fetcher.respond_status(board_url("greenhouse", "gone"), 404);
    let mut gone = CompanyTarget::new("greenhouse", "gone");
    gone.consecutive_empty_runs = 1;
    store
        .inner
        .lock()
        .unwrap()
        .targets
        .insert(("greenhouse".into(), "gone".into()), gone);
    let adapter = MockAdapterFactory::new().create(&greenhouse()).unwrap();
    let service = RotationService::new(store.clone(), fetcher, RotationConfig::default());

    // Act
    let pass = service
        .run_pass(&adapter, "greenhouse", Utc::now())
        .await
        .unwrap();

    // Assert
    assert!(pass.all_failed());
    assert_eq!(
        pass.last_error.as_deref(),
        Some("HTTP 404 from mock://greenhouse/board/gone")
    );
    let target = store.target("greenhouse", "gone").unwrap();
    assert_eq!(target.status, TargetStatus::Failing);
    assert_eq!(target.consecutive_empty_runs, 1);
    assert!(target.last_error.is_some());
}
