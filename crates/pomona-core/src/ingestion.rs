//! Per-source ingestion loop.
//!
//! # State machine
//!
//! ```text
//! Idle → Fetching(page) → Normalizing → Filtering → Persisting → NextPage | Stopped
//!
//! terminal: Completed | Failed(error) | Skipped(reason)
//! ```
//!
//! Every exit goes through `record_outcome` exactly once.
//! Completed and failed attempts write the cursor, the source's health and
//! the run record; skipped attempts write only the run record.
//!
//! After each page is persisted the advanced cursor is checkpointed, so an
//! invocation that dies mid-loop resumes where a run that stopped after that
//! page would have.
//!
//! Feed and company sources share the entry and exit guarantees but replace
//! the page loop with one concurrent fetch of every feed, or one rotation
//! pass over company boards.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::time::Instant;
use uuid::Uuid;

use crate::adapter::{
    AdapterFactory, FetchPlan, FetchRequest, PayloadOrigin, RawPayload, SourceAdapter,
};
use crate::config::{IngestionConfig, RotationConfig, SourcePolicy};
use crate::cursor::{IngestionCursor, IngestionState};
use crate::error::AppError;
use crate::freshness::filter_by_freshness;
use crate::health::HealthUpdate;
use crate::models::NormalizedJob;
use crate::progress::{IngestionEvent, ProgressReporter};
use crate::registry::RegisteredSource;
use crate::rotation::RotationService;
use crate::run::{IngestionCounts, SkipReason, SourceResult, SourceRunRecord, SourceRunStatus};
use crate::traits::{CursorStore, HealthStore, HttpFetcher, IngestionStore, RunStore};
use crate::upsert::persist_batch;

/// How an attempt ended, before anything is written.
#[derive(Debug)]
enum LoopExit {
    Completed {
        cursor: IngestionCursor,
        /// Last page requested in this attempt.
        page_end: u32,
        /// The listing was exhausted and the cursor rewound to page 1.
        reached_end: bool,
        counts: IngestionCounts,
    },
    Failed {
        cursor: IngestionCursor,
        page_end: u32,
        counts: IngestionCounts,
        error: String,
    },
    Skipped(SkipReason),
}

/// Counts for one filtered and persisted batch.
struct BatchOutcome {
    counts: IngestionCounts,
    all_stale: bool,
}

/// Runs the ingestion loop for single sources.
#[derive(Clone)]
pub struct IngestionService<S, F, X>
where
    S: IngestionStore,
    F: AdapterFactory,
    X: HttpFetcher,
{
    store: S,
    factory: F,
    fetcher: X,
    config: IngestionConfig,
    rotation: RotationConfig,
}

impl<S, F, X> IngestionService<S, F, X>
where
    S: IngestionStore,
    F: AdapterFactory,
    X: HttpFetcher,
{
    pub fn new(store: S, factory: F, fetcher: X) -> Self {
        Self::with_config(
            store,
            factory,
            fetcher,
            IngestionConfig::default(),
            RotationConfig::default(),
        )
    }

    pub fn with_config(
        store: S,
        factory: F,
        fetcher: X,
        config: IngestionConfig,
        rotation: RotationConfig,
    ) -> Self {
        Self {
            store,
            factory,
            fetcher,
            config,
            rotation,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    /// Ingests one source as part of run `run_id`.
    ///
    /// Never returns an error: every failure ends as a `failed` result and is
    /// recorded on the source's health. Loops stop between pages once
    /// `deadline` has passed.
    pub async fn ingest_source<R: ProgressReporter>(
        &self,
        source: &RegisteredSource,
        run_id: Uuid,
        deadline: Instant,
        reporter: &R,
    ) -> SourceResult {
        let slug = source.slug();
        let started_at = Utc::now();

        let state = match self.store.get_state(slug).await {
            Ok(state) => state.unwrap_or_default(),
            Err(e) => {
                let exit = LoopExit::Failed {
                    cursor: IngestionCursor::first(),
                    page_end: 1,
                    counts: IngestionCounts::default(),
                    error: e.to_string(),
                };
                // Without the stored state the cursor must not be overwritten.
                return self
                    .record_outcome(slug, run_id, started_at, None, exit, reporter)
                    .await;
            }
        };

        if let Some(remaining) = state.cooldown_remaining(started_at, source.policy.cooldown_minutes)
        {
            let reason = SkipReason::Cooldown {
                remaining_minutes: (remaining.num_seconds() + 59) / 60,
            };
            return self
                .record_outcome(
                    slug,
                    run_id,
                    started_at,
                    Some(state),
                    LoopExit::Skipped(reason),
                    reporter,
                )
                .await;
        }

        let mut cursor = state.cursor;
        if source.policy.reset_pagination_each_run {
            cursor = cursor.rewind();
        }

        let record = SourceRunRecord::start(run_id, slug, started_at, cursor);
        if let Err(e) = self.store.upsert_source_record(&record).await {
            tracing::warn!(source = slug, error = %e, "Failed to open source run record");
        }
        reporter.report(IngestionEvent::SourceStarted {
            source: slug,
            page: cursor.page(),
        });

        let exit = match self.factory.create(&source.entry) {
            Ok(adapter) => match adapter.plan() {
                FetchPlan::Paginated => {
                    self.run_pages(&adapter, &source.policy, cursor, started_at, deadline, reporter)
                        .await
                }
                FetchPlan::Feeds => self.run_feeds(&adapter, &source.policy, cursor).await,
                FetchPlan::Companies { platform } => {
                    self.run_companies(&adapter, source, platform, cursor).await
                }
            },
            Err(e) => LoopExit::Failed {
                cursor,
                page_end: cursor.page(),
                counts: IngestionCounts::default(),
                error: e.to_string(),
            },
        };

        let state_in = IngestionState { cursor, ..state };
        self.record_outcome(slug, run_id, started_at, Some(state_in), exit, reporter)
            .await
    }

    // =========================================================================
    // Branches
    // =========================================================================

    async fn run_pages<A: SourceAdapter, R: ProgressReporter>(
        &self,
        adapter: &A,
        policy: &SourcePolicy,
        mut cursor: IngestionCursor,
        started_at: DateTime<Utc>,
        deadline: Instant,
        reporter: &R,
    ) -> LoopExit {
        let slug = adapter.slug();
        let page_size = policy
            .expected_page_size
            .unwrap_or_else(|| adapter.expected_page_size())
            .max(1);
        let mut counts = IngestionCounts::default();
        let mut pages = 0u32;
        let mut page_end = cursor.page();

        loop {
            if pages >= policy.max_pages_per_run {
                tracing::debug!(source = slug, pages, "Page budget exhausted");
                return LoopExit::Completed {
                    cursor,
                    page_end,
                    reached_end: false,
                    counts,
                };
            }
            if pages > 0 && Instant::now() >= deadline {
                reporter.report(IngestionEvent::DeadlineReached {
                    source: slug,
                    page: cursor.page(),
                });
                return LoopExit::Completed {
                    cursor,
                    page_end,
                    reached_end: false,
                    counts,
                };
            }

            let Some(request) = adapter.build_request(&cursor) else {
                if pages == 0 {
                    return LoopExit::Skipped(SkipReason::MissingConfig(adapter.missing_config()));
                }
                return LoopExit::Completed {
                    cursor,
                    page_end,
                    reached_end: false,
                    counts,
                };
            };

            let page = cursor.page();
            page_end = page;
            let jobs = match self
                .fetch_and_normalize(adapter, &request, PayloadOrigin::Page(page))
                .await
            {
                Ok(jobs) => jobs,
                Err(e) => {
                    tracing::warn!(source = slug, page, error = %e, "Page failed");
                    return LoopExit::Failed {
                        cursor,
                        page_end,
                        counts,
                        error: e.to_string(),
                    };
                }
            };
            pages += 1;

            if jobs.is_empty() {
                tracing::debug!(source = slug, page, "Empty page, listing exhausted");
                return LoopExit::Completed {
                    cursor: cursor.rewind(),
                    page_end,
                    reached_end: true,
                    counts,
                };
            }

            let normalized = jobs.len();
            let batch = match self.filter_and_persist(jobs, policy).await {
                Ok(batch) => batch,
                Err(e) => {
                    return LoopExit::Failed {
                        cursor,
                        page_end,
                        counts,
                        error: e.to_string(),
                    };
                }
            };
            counts.add(batch.counts);

            let last_page = batch.all_stale || normalized < page_size;
            cursor = if last_page {
                cursor.rewind()
            } else {
                cursor.next_page()
            };
            self.checkpoint(slug, cursor, started_at).await;

            reporter.report(IngestionEvent::PagePersisted {
                source: slug,
                page,
                normalized,
                inserted: batch.counts.inserted,
                stale: batch.counts.stale,
            });

            if last_page {
                return LoopExit::Completed {
                    cursor,
                    page_end,
                    reached_end: true,
                    counts,
                };
            }
        }
    }

    async fn run_feeds<A: SourceAdapter>(
        &self,
        adapter: &A,
        policy: &SourcePolicy,
        cursor: IngestionCursor,
    ) -> LoopExit {
        let slug = adapter.slug();
        let requests = match adapter.feed_requests() {
            Some(requests) if !requests.is_empty() => requests,
            _ => return LoopExit::Skipped(SkipReason::MissingConfig(adapter.missing_config())),
        };
        let total = requests.len();

        let results: Vec<(String, Result<Vec<NormalizedJob>, AppError>)> = stream::iter(requests)
            .map(|request| async move {
                let result = self
                    .fetch_and_normalize(adapter, &request, PayloadOrigin::Feed(&request.url))
                    .await;
                (request.url, result)
            })
            .buffer_unordered(self.config.feed_concurrency.max(1))
            .collect()
            .await;

        let mut jobs = Vec::new();
        let mut last_error = None;
        let mut failed = 0usize;
        for (url, result) in results {
            match result {
                Ok(items) => jobs.extend(items),
                Err(e) => {
                    tracing::warn!(source = slug, feed = %url, error = %e, "Feed failed, skipping");
                    failed += 1;
                    last_error = Some(e.to_string());
                }
            }
        }

        if failed == total {
            return LoopExit::Failed {
                cursor,
                page_end: cursor.page(),
                counts: IngestionCounts::default(),
                error: format!(
                    "all {} feeds failed: {}",
                    total,
                    last_error.unwrap_or_default()
                ),
            };
        }

        self.finish_batch(jobs, policy, cursor).await
    }

    async fn run_companies<A: SourceAdapter>(
        &self,
        adapter: &A,
        source: &RegisteredSource,
        platform: &str,
        cursor: IngestionCursor,
    ) -> LoopExit {
        let rotation = RotationService::new(
            self.store.clone(),
            self.fetcher.clone(),
            self.rotation.clone(),
        );

        let pass = match rotation.seed(platform, &source.entry.companies).await {
            Ok(_) => rotation.run_pass(adapter, platform, Utc::now()).await,
            Err(e) => Err(e),
        };
        let pass = match pass {
            Ok(pass) => pass,
            Err(e) => {
                return LoopExit::Failed {
                    cursor,
                    page_end: cursor.page(),
                    counts: IngestionCounts::default(),
                    error: e.to_string(),
                };
            }
        };

        if pass.all_failed() {
            return LoopExit::Failed {
                cursor,
                page_end: cursor.page(),
                counts: IngestionCounts::default(),
                error: format!(
                    "all {} company targets failed: {}",
                    pass.selected,
                    pass.last_error.unwrap_or_default()
                ),
            };
        }

        self.finish_batch(pass.jobs, &source.policy, cursor).await
    }

    /// Filters and persists the single batch of a feed or company source.
    async fn finish_batch(
        &self,
        jobs: Vec<NormalizedJob>,
        policy: &SourcePolicy,
        cursor: IngestionCursor,
    ) -> LoopExit {
        match self.filter_and_persist(jobs, policy).await {
            Ok(batch) => LoopExit::Completed {
                cursor: cursor.rewind(),
                page_end: cursor.page(),
                reached_end: true,
                counts: batch.counts,
            },
            Err(e) => LoopExit::Failed {
                cursor,
                page_end: cursor.page(),
                counts: IngestionCounts::default(),
                error: e.to_string(),
            },
        }
    }

    // =========================================================================
    // Steps
    // =========================================================================

    async fn fetch_and_normalize<A: SourceAdapter>(
        &self,
        adapter: &A,
        request: &FetchRequest,
        origin: PayloadOrigin<'_>,
    ) -> Result<Vec<NormalizedJob>, AppError> {
        let response = self
            .fetcher
            .fetch(request)
            .await?
            .error_for_status(&request.url)?;
        adapter.normalize(&RawPayload {
            body: &response.body,
            origin,
        })
    }

    async fn filter_and_persist(
        &self,
        jobs: Vec<NormalizedJob>,
        policy: &SourcePolicy,
    ) -> Result<BatchOutcome, AppError> {
        let normalized = jobs.len();
        let freshness = filter_by_freshness(jobs, policy.max_age_days, Utc::now());
        let all_stale = freshness.all_stale();
        let stale = freshness.stale_count;

        let upsert = persist_batch(&self.store, freshness.fresh, policy.trust_level).await?;

        Ok(BatchOutcome {
            counts: IngestionCounts {
                normalized,
                inserted: upsert.inserted,
                duplicates: upsert.duplicates,
                stale,
            },
            all_stale,
        })
    }

    async fn checkpoint(&self, slug: &str, cursor: IngestionCursor, started_at: DateTime<Utc>) {
        let state = IngestionState::new(cursor, Some(started_at));
        if let Err(e) = self.store.save_state(slug, &state).await {
            tracing::warn!(source = slug, page = cursor.page(), error = %e, "Cursor checkpoint failed");
        }
    }

    // =========================================================================
    // Outcome
    // =========================================================================

    /// Writes the effects of an attempt: state and health for completed and
    /// failed attempts, the run record for all of them.
    ///
    /// `state_in` is `None` when the stored state could not be read; the
    /// cursor is then left alone.
    async fn record_outcome<R: ProgressReporter>(
        &self,
        slug: &str,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        state_in: Option<IngestionState>,
        exit: LoopExit,
        reporter: &R,
    ) -> SourceResult {
        let finished_at = Utc::now();
        let cursor_in = state_in.map(|s| s.cursor).unwrap_or_default();
        let mut record = SourceRunRecord::start(run_id, slug, started_at, cursor_in);
        record.finished_at = Some(finished_at);

        let result = match exit {
            LoopExit::Skipped(reason) => {
                reporter.report(IngestionEvent::SourceSkipped {
                    source: slug,
                    reason: &reason,
                });
                record.status = SourceRunStatus::Skipped;
                record.error_message = Some(reason.to_string());
                SourceResult::skipped(slug, &reason)
            }
            LoopExit::Completed {
                cursor,
                page_end,
                reached_end,
                counts,
            } => {
                let cursor_out = if reached_end {
                    cursor.advance_since(started_at)
                } else {
                    cursor
                };
                if state_in.is_some() {
                    self.save_state(slug, IngestionState::new(cursor_out, Some(started_at)))
                        .await;
                }
                self.update_health(
                    slug,
                    HealthUpdate::Success {
                        at: finished_at,
                        counts,
                    },
                )
                .await;

                record.status = SourceRunStatus::Success;
                record.page_end = Some(page_end);
                record.cursor_out = Some(cursor_out);
                record.counts = counts;
                SourceResult::completed(slug, counts)
            }
            LoopExit::Failed {
                cursor,
                page_end,
                counts,
                error,
            } => {
                if state_in.is_some() {
                    self.save_state(slug, IngestionState::new(cursor, Some(started_at)))
                        .await;
                }
                self.update_health(
                    slug,
                    HealthUpdate::Failure {
                        at: finished_at,
                        error: error.clone(),
                        counts,
                    },
                )
                .await;

                record.status = SourceRunStatus::Failed;
                record.page_end = Some(page_end);
                record.cursor_out = Some(cursor);
                record.counts = counts;
                record.error_message = Some(error.clone());
                SourceResult::failed(slug, counts, error)
            }
        };

        if let Err(e) = self.store.upsert_source_record(&record).await {
            tracing::warn!(source = slug, error = %e, "Failed to finalize source run record");
        }
        reporter.report(IngestionEvent::SourceFinished { result: &result });
        result
    }

    async fn save_state(&self, slug: &str, state: IngestionState) {
        if let Err(e) = self.store.save_state(slug, &state).await {
            tracing::warn!(source = slug, error = %e, "Failed to persist ingestion state");
        }
    }

    async fn update_health(&self, slug: &str, update: HealthUpdate) {
        if let Err(e) = self.store.record_outcome(slug, &update).await {
            tracing::warn!(source = slug, error = %e, "Failed to update source health");
        }
    }
}
