//! Trait definitions for external dependencies.
//!
//! Services in this crate are generic over these traits so that the ingestion
//! loop, coordinator, healer and rotation queue can be exercised against
//! in-memory mocks and run in production against PostgreSQL (`pomona-db`) and
//! reqwest (`pomona-client`).
//!
//! Every store mutation is a keyed upsert or a guarded update, so concurrent
//! invocations resolve as last-writer-wins without in-process locking.
//!
//! # Example
//!
//! ```
//! use pomona_core::traits::{CursorStore, HealthStore};
//! use pomona_core::AppError;
//!
//! async fn page_and_failures<S>(store: &S, slug: &str) -> Result<(u32, u32), AppError>
//! where
//!     S: CursorStore + HealthStore,
//! {
//!     let page = store.get_state(slug).await?.unwrap_or_default().cursor.page();
//!     let failures = store
//!         .get_health(slug)
//!         .await?
//!         .map(|h| h.consecutive_failures)
//!         .unwrap_or(0);
//!     Ok((page, failures))
//! }
//! ```

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::adapter::{FetchRequest, FetchResponse};
use crate::cursor::IngestionState;
use crate::health::{HealthUpdate, SourceHealth};
use crate::healer::{Alert, HealingAttempt};
use crate::models::EnrichedJob;
use crate::registry::PolicyOverride;
use crate::rotation::CompanyTarget;
use crate::run::{IngestionRun, RunStatus, RunSummary, RunTotals, SourceRunRecord};
use crate::AppError;

/// Executes provider requests.
///
/// Any HTTP status is a successful fetch; only transport failures
/// (connect, timeout, body read) are errors. Status handling belongs to the
/// ingestion loop.
pub trait HttpFetcher: Send + Sync + Clone {
    fn fetch(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<FetchResponse, AppError>> + Send;
}

/// Durable per-source resume position.
pub trait CursorStore: Send + Sync + Clone {
    /// Returns the stored state, or `None` if the source never ran.
    fn get_state(
        &self,
        source: &str,
    ) -> impl Future<Output = Result<Option<IngestionState>, AppError>> + Send;

    /// Overwrites the state for a source.
    fn save_state(
        &self,
        source: &str,
        state: &IngestionState,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Rewinds the cursor to page 1, keeping `since` and `last_run_at`.
    fn reset_cursor(&self, source: &str) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Run and per-source audit records.
pub trait RunStore: Send + Sync + Clone {
    /// Inserts a run in `running` state.
    fn create_run(
        &self,
        sources: &[String],
        started_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<IngestionRun, AppError>> + Send;

    /// Moves a run to a terminal state. Returns `false` when the run was
    /// already terminal; terminal states are never overwritten.
    fn finish_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        totals: &RunTotals,
        finished_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Marks a still-running run as failed. Returns `false` when it had
    /// already finished.
    fn mark_run_failed(
        &self,
        run_id: Uuid,
        error: &str,
        finished_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Runs still in `running` that started before `started_before`.
    fn find_stuck_runs(
        &self,
        started_before: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<IngestionRun>, AppError>> + Send;

    /// Inserts or replaces the record keyed by `(run_id, source)`.
    fn upsert_source_record(
        &self,
        record: &SourceRunRecord,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Rolling health per source.
pub trait HealthStore: Send + Sync + Clone {
    fn get_health(
        &self,
        source: &str,
    ) -> impl Future<Output = Result<Option<SourceHealth>, AppError>> + Send;

    /// Applies an attempt outcome atomically, creating the row if needed.
    fn record_outcome(
        &self,
        source: &str,
        update: &HealthUpdate,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn list_health(&self) -> impl Future<Output = Result<Vec<SourceHealth>, AppError>> + Send;

    /// Sources whose most recent attempt failed.
    fn list_degraded(&self) -> impl Future<Output = Result<Vec<SourceHealth>, AppError>> + Send;

    /// Increments the daily heal counter and stamps the attempt time.
    fn record_heal_attempt(
        &self,
        source: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Zeroes heal counters whose last attempt predates `boundary`.
    /// Returns the number of sources reset.
    fn reset_heal_attempts(
        &self,
        boundary: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;
}

/// Canonical posting store.
pub trait PostingStore: Send + Sync + Clone {
    /// Upserts postings keyed by `(source_slug, external_id)` and returns how
    /// many rows were newly inserted (updates do not count).
    fn upsert_postings(
        &self,
        jobs: &[EnrichedJob],
    ) -> impl Future<Output = Result<usize, AppError>> + Send;
}

/// Operator policy overrides.
pub trait PolicyStore: Send + Sync + Clone {
    fn load_overrides(&self) -> impl Future<Output = Result<Vec<PolicyOverride>, AppError>> + Send;

    /// Sets the `enabled` override for a source, leaving other fields alone.
    fn set_source_enabled(
        &self,
        source: &str,
        enabled: bool,
        reason: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Company targets for ATS-style sources.
pub trait CompanyTargetStore: Send + Sync + Clone {
    /// Inserts targets that do not exist yet; existing rows are untouched.
    /// Returns how many were created.
    fn ensure_targets(
        &self,
        targets: &[CompanyTarget],
    ) -> impl Future<Output = Result<usize, AppError>> + Send;

    /// Up to `limit` targets for `platform` that are not cooling at `now`,
    /// highest velocity first, least recently attempted first among ties.
    fn select_targets(
        &self,
        platform: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<CompanyTarget>, AppError>> + Send;

    /// Persists a target's updated state keyed by `(platform, company_slug)`.
    fn save_target(
        &self,
        target: &CompanyTarget,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Audit log of healing attempts.
pub trait HealingStore: Send + Sync + Clone {
    fn record_attempt(
        &self,
        attempt: &HealingAttempt,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Most recent attempts, newest first.
    fn recent_attempts(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<HealingAttempt>, AppError>> + Send;
}

/// Destination for operator alerts.
pub trait AlertSink: Send + Sync + Clone {
    fn emit(&self, alert: &Alert) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Out-of-band ingestion of one source, used by the healer's retry action.
pub trait IngestionTrigger: Send + Sync {
    fn ingest_one(
        &self,
        source: &str,
    ) -> impl Future<Output = Result<RunSummary, AppError>> + Send;
}

/// Everything the ingestion loop and coordinator persist to.
pub trait IngestionStore:
    CursorStore + RunStore + HealthStore + PostingStore + CompanyTargetStore
{
}

impl<T> IngestionStore for T where
    T: CursorStore + RunStore + HealthStore + PostingStore + CompanyTargetStore
{
}

/// Everything the healer reads and remediates through.
pub trait HealerStore: RunStore + HealthStore + CursorStore + HealingStore + PolicyStore {}

impl<T> HealerStore for T where T: RunStore + HealthStore + CursorStore + HealingStore + PolicyStore {}
