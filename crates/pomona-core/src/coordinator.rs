//! Run coordinator.
//!
//! One invocation selects sources, opens an [`IngestionRun`](crate::run::IngestionRun),
//! executes the sources in groups of `group_size` and closes the run with a
//! write-once status.
//!
//! Groups run one after another; sources inside a group run concurrently and
//! the group waits for all of them. A source that panics becomes a `failed`
//! result for that source only.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use chrono::Utc;
use futures::FutureExt;
use futures::future::join_all;
use tokio::time::Instant;
use uuid::Uuid;

use crate::adapter::AdapterFactory;
use crate::error::AppError;
use crate::health::HealthUpdate;
use crate::ingestion::IngestionService;
use crate::progress::{IngestionEvent, ProgressReporter, TracingReporter};
use crate::registry::{RegisteredSource, SourceRegistry};
use crate::run::{
    IngestionCounts, RunStatus, RunSummary, RunTotals, SourceResult, SourceRunRecord,
    SourceRunStatus,
};
use crate::traits::{HealthStore, HttpFetcher, IngestionStore, IngestionTrigger, RunStore};

/// Executes ingestion runs over a registry.
#[derive(Clone)]
pub struct RunCoordinator<S, F, X>
where
    S: IngestionStore,
    F: AdapterFactory,
    X: HttpFetcher,
{
    ingestion: IngestionService<S, F, X>,
}

impl<S, F, X> RunCoordinator<S, F, X>
where
    S: IngestionStore,
    F: AdapterFactory,
    X: HttpFetcher,
{
    pub fn new(ingestion: IngestionService<S, F, X>) -> Self {
        Self { ingestion }
    }

    pub fn ingestion(&self) -> &IngestionService<S, F, X> {
        &self.ingestion
    }

    /// Runs one source by slug, or every enabled source when `requested` is
    /// `None`.
    ///
    /// Errors only when the selection is invalid or the run row cannot be
    /// created or closed. Source failures are reported in the summary.
    pub async fn run<R: ProgressReporter>(
        &self,
        registry: &SourceRegistry,
        requested: Option<&str>,
        reporter: &R,
    ) -> Result<RunSummary, AppError> {
        let sources = registry.select(requested)?;
        let slugs: Vec<String> = sources.iter().map(|s| s.slug().to_string()).collect();
        let store = self.ingestion.store();
        let config = self.ingestion.config();

        let deadline = Instant::now() + config.time_budget;
        let run = store.create_run(&slugs, Utc::now()).await?;
        let run_id = run.id;
        reporter.report(IngestionEvent::RunStarted {
            run_id,
            sources: sources.len(),
        });

        let mut results = Vec::with_capacity(sources.len());
        for group in sources.chunks(config.group_size.max(1)) {
            let group_results = join_all(
                group
                    .iter()
                    .map(|source| self.run_isolated(source, run_id, deadline, reporter)),
            )
            .await;
            results.extend(group_results);
        }

        let status = RunStatus::from_results(&results);
        let totals = RunTotals::from_results(&results);
        if !store.finish_run(run_id, status, &totals, Utc::now()).await? {
            tracing::warn!(%run_id, "Run was already closed, keeping its terminal status");
        }

        let summary = RunSummary {
            run_id,
            status,
            totals,
            results,
        };
        reporter.report(IngestionEvent::RunCompleted { summary: &summary });
        Ok(summary)
    }

    async fn run_isolated<R: ProgressReporter>(
        &self,
        source: &RegisteredSource,
        run_id: Uuid,
        deadline: Instant,
        reporter: &R,
    ) -> SourceResult {
        let attempt = AssertUnwindSafe(
            self.ingestion
                .ingest_source(source, run_id, deadline, reporter),
        )
        .catch_unwind()
        .await;

        match attempt {
            Ok(result) => result,
            Err(panic) => {
                let error = format!("source task panicked: {}", panic_message(panic.as_ref()));
                tracing::error!(source = source.slug(), %run_id, error = %error, "Source task panicked");
                self.record_panic(source.slug(), run_id, &error).await;
                let result = SourceResult::failed(source.slug(), IngestionCounts::default(), error);
                reporter.report(IngestionEvent::SourceFinished { result: &result });
                result
            }
        }
    }

    /// A panicking attempt never reached its own outcome step; record the
    /// failure on its behalf. The cursor keeps its last checkpoint.
    async fn record_panic(&self, slug: &str, run_id: Uuid, error: &str) {
        let store = self.ingestion.store();
        let now = Utc::now();

        let update = HealthUpdate::Failure {
            at: now,
            error: error.to_string(),
            counts: IngestionCounts::default(),
        };
        if let Err(e) = store.record_outcome(slug, &update).await {
            tracing::warn!(source = slug, error = %e, "Failed to update source health");
        }

        let mut record = SourceRunRecord::start(run_id, slug, now, Default::default());
        record.finished_at = Some(now);
        record.status = SourceRunStatus::Failed;
        record.error_message = Some(error.to_string());
        if let Err(e) = store.upsert_source_record(&record).await {
            tracing::warn!(source = slug, error = %e, "Failed to finalize source run record");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Re-runs single sources for the healer's `retry` action.
///
/// Holds a snapshot of the registry; a slug passed to
/// [`ingest_one`](IngestionTrigger::ingest_one) runs even if disabled.
#[derive(Clone)]
pub struct CoordinatorTrigger<S, F, X>
where
    S: IngestionStore,
    F: AdapterFactory,
    X: HttpFetcher,
{
    coordinator: RunCoordinator<S, F, X>,
    registry: SourceRegistry,
}

impl<S, F, X> CoordinatorTrigger<S, F, X>
where
    S: IngestionStore,
    F: AdapterFactory,
    X: HttpFetcher,
{
    pub fn new(coordinator: RunCoordinator<S, F, X>, registry: SourceRegistry) -> Self {
        Self {
            coordinator,
            registry,
        }
    }
}

impl<S, F, X> IngestionTrigger for CoordinatorTrigger<S, F, X>
where
    S: IngestionStore,
    F: AdapterFactory,
    X: HttpFetcher,
{
    async fn ingest_one(&self, source: &str) -> Result<RunSummary, AppError> {
        self.coordinator
            .run(&self.registry, Some(source), &TracingReporter)
            .await
    }
}
