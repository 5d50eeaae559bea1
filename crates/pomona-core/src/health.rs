//! Rolling health state per source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::run::IngestionCounts;

/// Health of one source, updated after every attempt that was not skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceHealth {
    pub source: String,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub last_counts: IngestionCounts,
    /// True iff the most recent attempt failed.
    pub is_degraded: bool,
    pub heal_attempts_24h: u32,
    pub last_heal_attempt_at: Option<DateTime<Utc>>,
}

impl SourceHealth {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            last_run_at: None,
            last_success_at: None,
            last_error_at: None,
            last_error: None,
            consecutive_failures: 0,
            last_counts: IngestionCounts::default(),
            is_degraded: false,
            heal_attempts_24h: 0,
            last_heal_attempt_at: None,
        }
    }

    /// Applies the outcome of an attempt.
    pub fn apply(&mut self, update: &HealthUpdate) {
        match update {
            HealthUpdate::Success { at, counts } => {
                self.last_run_at = Some(*at);
                self.last_success_at = Some(*at);
                self.consecutive_failures = 0;
                self.is_degraded = false;
                self.last_counts = *counts;
            }
            HealthUpdate::Failure { at, error, counts } => {
                self.last_run_at = Some(*at);
                self.last_error_at = Some(*at);
                self.last_error = Some(error.clone());
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.is_degraded = true;
                self.last_counts = *counts;
            }
        }
    }

    pub fn record_heal_attempt(&mut self, at: DateTime<Utc>) {
        self.heal_attempts_24h = self.heal_attempts_24h.saturating_add(1);
        self.last_heal_attempt_at = Some(at);
    }

    /// Zeroes the daily heal counter when the last attempt predates `boundary`.
    /// Returns whether anything changed.
    pub fn reset_heal_attempts_before(&mut self, boundary: DateTime<Utc>) -> bool {
        let stale = self.last_heal_attempt_at.is_none_or(|t| t < boundary);
        if self.heal_attempts_24h > 0 && stale {
            self.heal_attempts_24h = 0;
            true
        } else {
            false
        }
    }
}

/// Outcome of one attempt, as applied to [`SourceHealth`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthUpdate {
    Success {
        at: DateTime<Utc>,
        counts: IngestionCounts,
    },
    Failure {
        at: DateTime<Utc>,
        error: String,
        counts: IngestionCounts,
    },
}

impl HealthUpdate {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            HealthUpdate::Success { at, .. } | HealthUpdate::Failure { at, .. } => *at,
        }
    }

    pub fn counts(&self) -> IngestionCounts {
        match self {
            HealthUpdate::Success { counts, .. } | HealthUpdate::Failure { counts, .. } => *counts,
        }
    }
}
