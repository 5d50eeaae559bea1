//! Rotation queue for company-enumeration sources.
//!
//! ATS-style providers (Greenhouse, Lever) expose one board per company. Each
//! board is a [`CompanyTarget`] tracked independently of the source's health:
//! productive boards are polled first, boards that keep coming back empty cool
//! off with an exponential back-off, and a failing board only marks itself.
//!
//! Fetches for one pass run through a flat worker pool capped at
//! `RotationConfig::workers` concurrent requests and gated by a `governor`
//! quota of `requests_per_minute`.

use std::num::NonZeroU32;

use chrono::{DateTime, TimeDelta, Utc};
use futures::stream::{self, StreamExt};
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};

use crate::adapter::{PayloadOrigin, RawPayload, SourceAdapter};
use crate::config::RotationConfig;
use crate::error::AppError;
use crate::models::NormalizedJob;
use crate::traits::{CompanyTargetStore, HttpFetcher};

// =============================================================================
// Target State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    #[default]
    Active,
    Cooling,
    Failing,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStatus::Active => "active",
            TargetStatus::Cooling => "cooling",
            TargetStatus::Failing => "failing",
        }
    }
}

impl std::fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TargetStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TargetStatus::Active),
            "cooling" => Ok(TargetStatus::Cooling),
            "failing" => Ok(TargetStatus::Failing),
            other => Err(AppError::Generic(format!("invalid target status: {}", other))),
        }
    }
}

/// One company board on an ATS platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyTarget {
    pub company_slug: String,
    pub platform: String,
    /// Provider-side identifier, when it differs from the slug.
    pub company_id: Option<String>,
    pub consecutive_empty_runs: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_jobs_found: u32,
    /// Moving average of postings found per attempt.
    pub velocity: f64,
    pub cooling_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub status: TargetStatus,
}

impl CompanyTarget {
    pub fn new(platform: impl Into<String>, company_slug: impl Into<String>) -> Self {
        Self {
            company_slug: company_slug.into(),
            platform: platform.into(),
            company_id: None,
            consecutive_empty_runs: 0,
            last_attempt_at: None,
            last_success_at: None,
            last_jobs_found: 0,
            velocity: 0.0,
            cooling_until: None,
            last_error: None,
            status: TargetStatus::Active,
        }
    }

    /// Identifier to put in the board URL.
    pub fn board_id(&self) -> &str {
        self.company_id.as_deref().unwrap_or(&self.company_slug)
    }

    /// A target may be selected unless it is cooling past `now`.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.cooling_until.is_none_or(|until| until <= now)
    }

    /// Applies the outcome of one fetch.
    pub fn apply_outcome(
        &mut self,
        outcome: &TargetOutcome,
        now: DateTime<Utc>,
        config: &RotationConfig,
    ) {
        self.last_attempt_at = Some(now);
        match outcome {
            TargetOutcome::Found(n) => {
                let found = u32::try_from(*n).unwrap_or(u32::MAX);
                self.consecutive_empty_runs = 0;
                self.last_success_at = Some(now);
                self.last_jobs_found = found;
                self.velocity = smooth(self.velocity, f64::from(found), config);
                self.cooling_until = None;
                self.last_error = None;
                self.status = TargetStatus::Active;
            }
            TargetOutcome::Empty => {
                self.consecutive_empty_runs = self.consecutive_empty_runs.saturating_add(1);
                self.last_jobs_found = 0;
                self.velocity = smooth(self.velocity, 0.0, config);
                self.last_error = None;
                match cooling_window(self.consecutive_empty_runs, config) {
                    Some(window) => {
                        self.cooling_until = Some(now + window);
                        self.status = TargetStatus::Cooling;
                    }
                    None => {
                        self.cooling_until = None;
                        self.status = TargetStatus::Active;
                    }
                }
            }
            TargetOutcome::Failed(error) => {
                self.last_error = Some(error.clone());
                self.status = TargetStatus::Failing;
            }
        }
    }
}

fn smooth(previous: f64, observed: f64, config: &RotationConfig) -> f64 {
    let alpha = config.velocity_smoothing.clamp(0.0, 1.0);
    alpha * observed + (1.0 - alpha) * previous
}

/// Cooling window after `empty_runs` consecutive empty fetches, or `None`
/// below the threshold. Doubles per extra empty run, capped at `max_cooldown`.
pub fn cooling_window(empty_runs: u32, config: &RotationConfig) -> Option<TimeDelta> {
    let excess = empty_runs.checked_sub(config.cooling_threshold)?;
    // 2^20 days is far past any sane cap.
    let factor = 1i32 << excess.min(20);
    let window = config
        .base_cooldown
        .checked_mul(factor)
        .unwrap_or(config.max_cooldown);
    Some(window.min(config.max_cooldown))
}

/// Result of fetching one board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    Found(usize),
    Empty,
    Failed(String),
}

impl TargetOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, TargetOutcome::Failed(_))
    }
}

// =============================================================================
// Rotation Pass
// =============================================================================

/// What one pass over a platform's targets produced.
#[derive(Debug, Clone, Default)]
pub struct RotationPass {
    pub selected: usize,
    pub found: usize,
    pub empty: usize,
    pub failed: usize,
    /// Postings from every productive board, flattened.
    pub jobs: Vec<NormalizedJob>,
    /// Error of the last failed target, for reporting when all failed.
    pub last_error: Option<String>,
}

impl RotationPass {
    /// True when targets were selected and none of them succeeded.
    pub fn all_failed(&self) -> bool {
        self.selected > 0 && self.failed == self.selected
    }
}

/// Selects eligible targets, fetches them through a rate-limited pool and
/// records each outcome on its target.
#[derive(Clone)]
pub struct RotationService<S, X>
where
    S: CompanyTargetStore,
    X: HttpFetcher,
{
    store: S,
    fetcher: X,
    config: RotationConfig,
}

impl<S, X> RotationService<S, X>
where
    S: CompanyTargetStore,
    X: HttpFetcher,
{
    pub fn new(store: S, fetcher: X, config: RotationConfig) -> Self {
        Self {
            store,
            fetcher,
            config,
        }
    }

    pub fn config(&self) -> &RotationConfig {
        &self.config
    }

    /// Inserts configured companies as targets. Existing targets keep their state.
    pub async fn seed(&self, platform: &str, companies: &[String]) -> Result<usize, AppError> {
        if companies.is_empty() {
            return Ok(0);
        }
        let targets: Vec<CompanyTarget> = companies
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(|c| CompanyTarget::new(platform, c.to_lowercase()))
            .collect();
        let created = self.store.ensure_targets(&targets).await?;
        if created > 0 {
            tracing::info!(platform, created, "Seeded company targets");
        }
        Ok(created)
    }

    /// Runs one pass for `platform` using `adapter` to build and normalize requests.
    ///
    /// Target failures are recorded on the target and counted; they never fail
    /// the pass. Store errors while selecting do.
    pub async fn run_pass<A: SourceAdapter>(
        &self,
        adapter: &A,
        platform: &str,
        now: DateTime<Utc>,
    ) -> Result<RotationPass, AppError> {
        let targets = self
            .store
            .select_targets(platform, self.config.batch_size, now)
            .await?;

        let mut pass = RotationPass {
            selected: targets.len(),
            ..Default::default()
        };
        if targets.is_empty() {
            tracing::info!(platform, "No eligible company targets");
            return Ok(pass);
        }

        let rpm = NonZeroU32::new(self.config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let limiter = RateLimiter::direct(Quota::per_minute(rpm));

        let fetched: Vec<(CompanyTarget, Result<Vec<NormalizedJob>, AppError>)> =
            stream::iter(targets)
                .map(|target| {
                    let limiter = &limiter;
                    async move {
                        limiter.until_ready().await;
                        let result = self.fetch_target(adapter, &target).await;
                        (target, result)
                    }
                })
                .buffer_unordered(self.config.workers.max(1))
                .collect()
                .await;

        for (mut target, result) in fetched {
            let outcome = match result {
                Ok(jobs) if jobs.is_empty() => TargetOutcome::Empty,
                Ok(jobs) => {
                    let n = jobs.len();
                    pass.jobs.extend(jobs);
                    TargetOutcome::Found(n)
                }
                Err(e) => {
                    tracing::warn!(
                        platform,
                        company = %target.company_slug,
                        error = %e,
                        "Company board fetch failed"
                    );
                    TargetOutcome::Failed(e.to_string())
                }
            };

            match &outcome {
                TargetOutcome::Found(_) => pass.found += 1,
                TargetOutcome::Empty => pass.empty += 1,
                TargetOutcome::Failed(e) => {
                    pass.failed += 1;
                    pass.last_error = Some(e.clone());
                }
            }

            target.apply_outcome(&outcome, now, &self.config);
            if let Err(e) = self.store.save_target(&target).await {
                tracing::warn!(
                    platform,
                    company = %target.company_slug,
                    error = %e,
                    "Failed to save company target"
                );
            }
        }

        tracing::info!(
            platform,
            selected = pass.selected,
            found = pass.found,
            empty = pass.empty,
            failed = pass.failed,
            jobs = pass.jobs.len(),
            "Rotation pass complete"
        );
        Ok(pass)
    }

    async fn fetch_target<A: SourceAdapter>(
        &self,
        adapter: &A,
        target: &CompanyTarget,
    ) -> Result<Vec<NormalizedJob>, AppError> {
        let request = adapter.company_request(target).ok_or_else(|| {
            AppError::MissingConfig(format!("board request for '{}'", target.company_slug))
        })?;
        let response = self
            .fetcher
            .fetch(&request)
            .await?
            .error_for_status(&request.url)?;
        adapter.normalize(&RawPayload {
            body: &response.body,
            origin: PayloadOrigin::Company(target),
        })
    }
}
