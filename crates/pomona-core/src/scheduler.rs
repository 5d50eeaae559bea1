//! Long-running scheduler for ingestion runs and healer passes.
//!
//! ```text
//! loop {
//!     select {
//!         cancelled        => stop
//!         ingest interval  => refresh overrides, run all enabled sources
//!         heal interval    => one healer pass
//!     }
//! }
//! ```
//!
//! Cancellation is checked between invocations only; a run that has started
//! finishes (bounded by its own time budget) before the loop exits.

use std::time::Duration;

use chrono::Utc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::adapter::AdapterFactory;
use crate::coordinator::RunCoordinator;
use crate::error::AppError;
use crate::healer::HealerService;
use crate::progress::ProgressReporter;
use crate::registry::SourceRegistry;
use crate::traits::{AlertSink, HealerStore, HttpFetcher, IngestionStore, IngestionTrigger};

/// Intervals for the scheduler loop.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub ingest_every: Duration,
    pub heal_every: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            ingest_every: Duration::from_secs(60 * 60),
            heal_every: Duration::from_secs(15 * 60),
        }
    }
}

/// Drives periodic ingestion and healing until cancelled.
pub struct Scheduler<S, F, X, T, A>
where
    S: IngestionStore + HealerStore,
    F: AdapterFactory,
    X: HttpFetcher,
    T: IngestionTrigger,
    A: AlertSink,
{
    coordinator: RunCoordinator<S, F, X>,
    healer: HealerService<S, T, A>,
    registry: SourceRegistry,
    config: SchedulerConfig,
}

impl<S, F, X, T, A> Scheduler<S, F, X, T, A>
where
    S: IngestionStore + HealerStore,
    F: AdapterFactory,
    X: HttpFetcher,
    T: IngestionTrigger,
    A: AlertSink,
{
    pub fn new(
        coordinator: RunCoordinator<S, F, X>,
        healer: HealerService<S, T, A>,
        registry: SourceRegistry,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            coordinator,
            healer,
            registry,
            config,
        }
    }

    /// Runs until `cancel_token` fires. Both timers tick immediately on start.
    pub async fn run<R: ProgressReporter>(
        mut self,
        cancel_token: CancellationToken,
        reporter: &R,
    ) -> Result<(), AppError> {
        let mut ingest_timer = interval(self.config.ingest_every);
        let mut heal_timer = interval(self.config.heal_every);
        ingest_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heal_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            ingest_every_secs = self.config.ingest_every.as_secs(),
            heal_every_secs = self.config.heal_every.as_secs(),
            "Scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => break,
                _ = ingest_timer.tick() => self.ingest_tick(reporter).await,
                _ = heal_timer.tick() => self.heal_tick().await,
            }
        }

        info!("Scheduler stopped");
        Ok(())
    }

    async fn ingest_tick<R: ProgressReporter>(&mut self, reporter: &R) {
        let store = self.coordinator.ingestion().store();
        if let Err(e) = self.registry.refresh(store, Utc::now()).await {
            error!(error = %e, "Failed to refresh policy overrides, using cached values");
        }
        if let Err(e) = self.coordinator.run(&self.registry, None, reporter).await {
            error!(error = %e, "Scheduled ingestion run failed");
        }
    }

    async fn heal_tick(&mut self) {
        if let Err(e) = self.healer.run_pass(&mut self.registry, Utc::now()).await {
            error!(error = %e, "Healer pass failed");
        }
    }
}
