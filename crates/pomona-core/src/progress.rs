//! Progress reporting for ingestion runs.
//!
//! Services emit [`IngestionEvent`]s through a [`ProgressReporter`] instead of
//! logging directly, so a CLI, a daemon or a test can each decide what to do
//! with them.

use tracing::{info, warn};
use uuid::Uuid;

use crate::run::{RunSummary, SkipReason, SourceResult};

// =============================================================================
// Events
// =============================================================================

/// Events emitted while a run progresses.
#[derive(Debug, Clone)]
pub enum IngestionEvent<'a> {
    RunStarted {
        run_id: Uuid,
        sources: usize,
    },
    SourceStarted {
        source: &'a str,
        page: u32,
    },
    /// One page was fetched, filtered and persisted.
    PagePersisted {
        source: &'a str,
        page: u32,
        normalized: usize,
        inserted: usize,
        stale: usize,
    },
    SourceSkipped {
        source: &'a str,
        reason: &'a SkipReason,
    },
    /// The invocation deadline passed between pages.
    DeadlineReached {
        source: &'a str,
        page: u32,
    },
    SourceFinished {
        result: &'a SourceResult,
    },
    RunCompleted {
        summary: &'a RunSummary,
    },
}

// =============================================================================
// Reporters
// =============================================================================

/// Receives ingestion events.
pub trait ProgressReporter: Send + Sync {
    /// Called for every event. The default implementation ignores it.
    fn report(&self, event: IngestionEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that ignores all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Reporter that forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: IngestionEvent<'_>) {
        match event {
            IngestionEvent::RunStarted { run_id, sources } => {
                info!(%run_id, sources, "Ingestion run started");
            }
            IngestionEvent::SourceStarted { source, page } => {
                info!(source, page, "Ingesting source");
            }
            IngestionEvent::PagePersisted {
                source,
                page,
                normalized,
                inserted,
                stale,
            } => {
                tracing::debug!(source, page, normalized, inserted, stale, "Page persisted");
            }
            IngestionEvent::SourceSkipped { source, reason } => {
                info!(source, reason = %reason, "Source skipped");
            }
            IngestionEvent::DeadlineReached { source, page } => {
                warn!(source, page, "Invocation deadline reached, stopping between pages");
            }
            IngestionEvent::SourceFinished { result } => {
                if let Some(error) = result.error.as_deref().filter(|_| result.is_failed()) {
                    warn!(source = %result.source, error, "Source failed");
                } else {
                    info!(
                        source = %result.source,
                        inserted = result.count,
                        normalized = result.normalized,
                        duplicates = result.duplicates,
                        stale = result.stale_filtered,
                        "Source finished"
                    );
                }
            }
            IngestionEvent::RunCompleted { summary } => {
                info!(
                    run_id = %summary.run_id,
                    status = %summary.status,
                    succeeded = summary.totals.succeeded,
                    failed = summary.totals.failed,
                    skipped = summary.totals.skipped,
                    inserted = summary.totals.inserted,
                    "Ingestion run completed"
                );
            }
        }
    }
}
