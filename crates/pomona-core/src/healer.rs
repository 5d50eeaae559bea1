//! Auto-healing control loop.
//!
//! The healer runs independently of ingestion and only reads durable state.
//! One pass does three things:
//!
//! 1. **Reap** runs left in `running` past the stuck threshold.
//! 2. **Reset** daily heal counters that predate today's UTC midnight.
//! 3. **Remediate** degraded sources: classify the last error, decide an
//!    action, apply it and log a [`HealingAttempt`].
//!
//! Classification sniffs the error text with an ordered substring list. This
//! is fragile by nature: a provider that changes its error wording moves a
//! failure into a different class. Keep the rule list and the `AppError`
//! display strings in sync.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::HealerConfig;
use crate::error::AppError;
use crate::registry::SourceRegistry;
use crate::run::RunStatus;
use crate::traits::{AlertSink, HealerStore, IngestionTrigger};

// =============================================================================
// Classification
// =============================================================================

/// Failure class derived from a source's last error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    Timeout,
    RateLimit,
    AuthError,
    ParseError,
    HttpError,
    ConsecutiveFailures,
    StuckRun,
}

impl FailureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureType::Timeout => "timeout",
            FailureType::RateLimit => "rate_limit",
            FailureType::AuthError => "auth_error",
            FailureType::ParseError => "parse_error",
            FailureType::HttpError => "http_error",
            FailureType::ConsecutiveFailures => "consecutive_failures",
            FailureType::StuckRun => "stuck_run",
        }
    }
}

impl std::fmt::Display for FailureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FailureType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timeout" => Ok(FailureType::Timeout),
            "rate_limit" => Ok(FailureType::RateLimit),
            "auth_error" => Ok(FailureType::AuthError),
            "parse_error" => Ok(FailureType::ParseError),
            "http_error" => Ok(FailureType::HttpError),
            "consecutive_failures" => Ok(FailureType::ConsecutiveFailures),
            "stuck_run" => Ok(FailureType::StuckRun),
            other => Err(AppError::Generic(format!("invalid failure type: {}", other))),
        }
    }
}

/// Ordered rules: the first class with a matching marker wins.
const CLASSIFICATION_RULES: &[(FailureType, &[&str])] = &[
    (FailureType::Timeout, &["timed out", "timeout"]),
    (
        FailureType::RateLimit,
        &["http 429", "rate limit", "too many requests"],
    ),
    (
        FailureType::AuthError,
        &[
            "http 401",
            "http 403",
            "unauthorized",
            "forbidden",
            "invalid api key",
        ],
    ),
    (
        FailureType::ParseError,
        &["parse error", "invalid json", "malformed", "deserializ"],
    ),
    (
        FailureType::HttpError,
        &["http ", "status", "server error", "network error"],
    ),
];

/// Classifies an error message. Anything no rule matches counts as a plain
/// run of consecutive failures.
pub fn classify_failure(error: &str) -> FailureType {
    let text = error.to_lowercase();
    CLASSIFICATION_RULES
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| text.contains(m)))
        .map(|(failure_type, _)| *failure_type)
        .unwrap_or(FailureType::ConsecutiveFailures)
}

// =============================================================================
// Actions
// =============================================================================

/// Remediation chosen for a degraded source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingAction {
    Retry,
    /// Logged only; the next scheduled invocation is the retry.
    IncreaseDelay,
    ResetCursor,
    DisableSource,
    Escalate,
    /// Reaper action on a stuck run.
    MarkFailed,
}

impl HealingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealingAction::Retry => "retry",
            HealingAction::IncreaseDelay => "increase_delay",
            HealingAction::ResetCursor => "reset_cursor",
            HealingAction::DisableSource => "disable_source",
            HealingAction::Escalate => "escalate",
            HealingAction::MarkFailed => "mark_failed",
        }
    }
}

impl std::fmt::Display for HealingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HealingAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "retry" => Ok(HealingAction::Retry),
            "increase_delay" => Ok(HealingAction::IncreaseDelay),
            "reset_cursor" => Ok(HealingAction::ResetCursor),
            "disable_source" => Ok(HealingAction::DisableSource),
            "escalate" => Ok(HealingAction::Escalate),
            "mark_failed" => Ok(HealingAction::MarkFailed),
            other => Err(AppError::Generic(format!("invalid healing action: {}", other))),
        }
    }
}

/// Picks the action for a degraded source. Pure: the same inputs always give
/// the same action.
pub fn decide_action(
    failure_type: FailureType,
    consecutive_failures: u32,
    heal_attempts_24h: u32,
    config: &HealerConfig,
) -> HealingAction {
    if heal_attempts_24h >= config.max_attempts_24h {
        return HealingAction::Escalate;
    }
    if consecutive_failures >= config.disable_threshold {
        return HealingAction::DisableSource;
    }
    match failure_type {
        FailureType::Timeout | FailureType::HttpError | FailureType::ConsecutiveFailures => {
            HealingAction::Retry
        }
        FailureType::RateLimit => HealingAction::IncreaseDelay,
        FailureType::AuthError => HealingAction::Escalate,
        FailureType::ParseError => HealingAction::ResetCursor,
        FailureType::StuckRun => HealingAction::MarkFailed,
    }
}

/// Whether an applied action worked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingResult {
    Success,
    Failed,
    /// The action has no effect beyond being recorded.
    Logged,
}

impl HealingResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealingResult::Success => "success",
            HealingResult::Failed => "failed",
            HealingResult::Logged => "logged",
        }
    }
}

impl std::str::FromStr for HealingResult {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(HealingResult::Success),
            "failed" => Ok(HealingResult::Failed),
            "logged" => Ok(HealingResult::Logged),
            other => Err(AppError::Generic(format!("invalid healing result: {}", other))),
        }
    }
}

/// Audit record of one remediation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealingAttempt {
    pub source: String,
    pub failure_type: FailureType,
    pub action: HealingAction,
    pub result: HealingResult,
    pub detail: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

// =============================================================================
// Alerts
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

/// Operator-facing notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    pub source: Option<String>,
}

/// Writes alerts to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    async fn emit(&self, alert: &Alert) -> Result<(), AppError> {
        match alert.severity {
            AlertSeverity::Critical => tracing::error!(
                alert_type = %alert.alert_type,
                source = alert.source.as_deref().unwrap_or("-"),
                description = %alert.description,
                "{}",
                alert.title
            ),
            AlertSeverity::Warning => tracing::warn!(
                alert_type = %alert.alert_type,
                source = alert.source.as_deref().unwrap_or("-"),
                description = %alert.description,
                "{}",
                alert.title
            ),
            AlertSeverity::Info => tracing::info!(
                alert_type = %alert.alert_type,
                source = alert.source.as_deref().unwrap_or("-"),
                description = %alert.description,
                "{}",
                alert.title
            ),
        }
        Ok(())
    }
}

// =============================================================================
// Healer Service
// =============================================================================

/// Outcome of one healer pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealingReport {
    pub stuck_runs_reaped: usize,
    pub counters_reset: u64,
    pub attempts: Vec<HealingAttempt>,
}

/// Runs healer passes against durable state.
pub struct HealerService<S, T, A>
where
    S: HealerStore,
    T: IngestionTrigger,
    A: AlertSink,
{
    store: S,
    trigger: T,
    alerts: A,
    config: HealerConfig,
}

impl<S, T, A> HealerService<S, T, A>
where
    S: HealerStore,
    T: IngestionTrigger,
    A: AlertSink,
{
    pub fn new(store: S, trigger: T, alerts: A, config: HealerConfig) -> Self {
        Self {
            store,
            trigger,
            alerts,
            config,
        }
    }

    /// Runs one pass. Overrides are refreshed from the store first so the
    /// "still enabled" check sees operator changes; the registry's cache is
    /// invalidated after a source is disabled.
    pub async fn run_pass(
        &self,
        registry: &mut SourceRegistry,
        now: DateTime<Utc>,
    ) -> Result<HealingReport, AppError> {
        let mut report = HealingReport::default();

        let (reaped, attempts) = self.reap_stuck_runs(now).await?;
        report.stuck_runs_reaped = reaped;
        report.attempts.extend(attempts);

        let boundary = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        report.counters_reset = self.store.reset_heal_attempts(boundary).await?;
        if report.counters_reset > 0 {
            tracing::info!(count = report.counters_reset, "Reset daily heal counters");
        }

        registry.refresh(&self.store, now).await?;
        let remediated = self.remediate(registry, now).await?;
        if remediated
            .iter()
            .any(|a| a.action == HealingAction::DisableSource)
        {
            registry.invalidate();
        }
        report.attempts.extend(remediated);

        tracing::info!(
            stuck_runs = report.stuck_runs_reaped,
            attempts = report.attempts.len(),
            "Healer pass complete"
        );
        Ok(report)
    }

    /// Marks runs stuck in `running` as failed and logs a `stuck_run` attempt
    /// for every source the run named. Returns the number of runs reaped and
    /// the attempts logged.
    pub async fn reap_stuck_runs(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(usize, Vec<HealingAttempt>), AppError> {
        let threshold = self.config.stuck_run_threshold;
        let stuck = self.store.find_stuck_runs(now - threshold).await?;
        let mut reaped = 0;
        let mut attempts = Vec::new();

        for run in stuck {
            if run.status != RunStatus::Running {
                continue;
            }
            let error = format!(
                "run did not finish within {} minutes; marked failed by healer",
                threshold.num_minutes()
            );
            if !self.store.mark_run_failed(run.id, &error, now).await? {
                tracing::debug!(run_id = %run.id, "Stuck run finished before it was reaped");
                continue;
            }
            reaped += 1;
            tracing::warn!(
                run_id = %run.id,
                started_at = %run.started_at,
                sources = run.sources_requested.len(),
                "Reaped stuck ingestion run"
            );

            for source in &run.sources_requested {
                let attempt = HealingAttempt {
                    source: source.clone(),
                    failure_type: FailureType::StuckRun,
                    action: HealingAction::MarkFailed,
                    result: HealingResult::Success,
                    detail: Some(format!("run {}", run.id)),
                    attempted_at: now,
                };
                self.log_attempt(&attempt).await;
                attempts.push(attempt);
            }
        }

        Ok((reaped, attempts))
    }

    /// Applies one remediation to every degraded source that is still enabled.
    pub async fn remediate(
        &self,
        registry: &SourceRegistry,
        now: DateTime<Utc>,
    ) -> Result<Vec<HealingAttempt>, AppError> {
        let degraded = self.store.list_degraded().await?;
        let mut attempts = Vec::new();

        for health in degraded {
            if !health.is_degraded || health.consecutive_failures == 0 {
                continue;
            }
            let Some(entry) = registry.find(&health.source) else {
                tracing::debug!(source = %health.source, "Degraded source no longer configured");
                continue;
            };
            if !registry.policy(entry).enabled {
                continue;
            }

            let error = health.last_error.as_deref().unwrap_or_default();
            let failure_type = classify_failure(error);
            let action = decide_action(
                failure_type,
                health.consecutive_failures,
                health.heal_attempts_24h,
                &self.config,
            );

            tracing::info!(
                source = %health.source,
                failure_type = %failure_type,
                action = %action,
                consecutive_failures = health.consecutive_failures,
                heal_attempts = health.heal_attempts_24h,
                "Healing degraded source"
            );

            let (result, detail) = self.apply(&health.source, action, error).await;
            let attempt = HealingAttempt {
                source: health.source.clone(),
                failure_type,
                action,
                result,
                detail,
                attempted_at: now,
            };

            if let Err(e) = self.store.record_heal_attempt(&health.source, now).await {
                tracing::warn!(source = %health.source, error = %e, "Failed to count heal attempt");
            }
            self.log_attempt(&attempt).await;

            // The budget escalation was already alerted on the pass that exhausted it.
            let repeat_escalation = action == HealingAction::Escalate
                && health.heal_attempts_24h > self.config.max_attempts_24h;
            if !repeat_escalation
                && let Some(alert) =
                    alert_for(&attempt, &health.source, health.consecutive_failures)
                && let Err(e) = self.alerts.emit(&alert).await
            {
                tracing::warn!(source = %health.source, error = %e, "Failed to emit alert");
            }

            attempts.push(attempt);
        }

        Ok(attempts)
    }

    async fn apply(
        &self,
        source: &str,
        action: HealingAction,
        last_error: &str,
    ) -> (HealingResult, Option<String>) {
        match action {
            HealingAction::Retry => match self.trigger.ingest_one(source).await {
                Ok(summary) if summary.status == RunStatus::Success => (
                    HealingResult::Success,
                    Some(format!("retry run {} succeeded", summary.run_id)),
                ),
                Ok(summary) => {
                    let error = summary
                        .results
                        .iter()
                        .find_map(|r| r.error.clone())
                        .unwrap_or_else(|| summary.status.to_string());
                    (
                        HealingResult::Failed,
                        Some(format!("retry run {}: {}", summary.run_id, error)),
                    )
                }
                Err(e) => (HealingResult::Failed, Some(e.to_string())),
            },
            HealingAction::ResetCursor => match self.store.reset_cursor(source).await {
                Ok(()) => (HealingResult::Success, Some("cursor rewound to page 1".into())),
                Err(e) => (HealingResult::Failed, Some(e.to_string())),
            },
            HealingAction::DisableSource => {
                let reason = format!("disabled by healer: {}", last_error);
                match self.store.set_source_enabled(source, false, &reason).await {
                    Ok(()) => (HealingResult::Success, Some(reason)),
                    Err(e) => (HealingResult::Failed, Some(e.to_string())),
                }
            }
            HealingAction::IncreaseDelay => (
                HealingResult::Logged,
                Some("rate limited; waiting for the next scheduled run".into()),
            ),
            HealingAction::Escalate => (HealingResult::Logged, Some(last_error.to_string())),
            HealingAction::MarkFailed => (HealingResult::Logged, None),
        }
    }

    async fn log_attempt(&self, attempt: &HealingAttempt) {
        if let Err(e) = self.store.record_attempt(attempt).await {
            tracing::warn!(
                source = %attempt.source,
                action = %attempt.action,
                error = %e,
                "Failed to record healing attempt"
            );
        }
    }
}

fn alert_for(attempt: &HealingAttempt, source: &str, failures: u32) -> Option<Alert> {
    match attempt.action {
        HealingAction::DisableSource => Some(Alert {
            alert_type: "source_disabled".into(),
            severity: AlertSeverity::Critical,
            title: format!("Source '{}' disabled", source),
            description: format!(
                "{} consecutive failures; last error: {}",
                failures,
                attempt.detail.as_deref().unwrap_or("unknown")
            ),
            source: Some(source.to_string()),
        }),
        HealingAction::Escalate => {
            let severity = if attempt.failure_type == FailureType::AuthError {
                AlertSeverity::Critical
            } else {
                AlertSeverity::Warning
            };
            Some(Alert {
                alert_type: "healing_escalated".into(),
                severity,
                title: format!("Source '{}' needs attention", source),
                description: format!(
                    "{} failure after {} consecutive failures: {}",
                    attempt.failure_type,
                    failures,
                    attempt.detail.as_deref().unwrap_or("unknown")
                ),
                source: Some(source.to_string()),
            })
        }
        _ => None,
    }
}
