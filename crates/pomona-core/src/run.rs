//! Run-level and per-source audit types.
//!
//! An invocation of the coordinator produces one [`IngestionRun`] and one
//! [`SourceRunRecord`] per selected source:
//!
//! ```text
//! IngestionRun:     running → success | partial | failed   (write-once)
//! SourceRunRecord:  running → success | failed | skipped
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cursor::IngestionCursor;

// =============================================================================
// Run Status
// =============================================================================

/// Status of a whole ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    /// Some, but not all, sources failed.
    Partial,
    Failed,
}

impl RunStatus {
    /// Returns the string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    /// Overall status from per-source outcomes: failed when every source
    /// failed, partial when some did, success otherwise (including no sources).
    pub fn from_results(results: &[SourceResult]) -> Self {
        let failed = results
            .iter()
            .filter(|r| r.status == SourceRunStatus::Failed)
            .count();
        match failed {
            0 => RunStatus::Success,
            n if n == results.len() => RunStatus::Failed,
            _ => RunStatus::Partial,
        }
    }
}

/// Error type for parsing status enums from their stored string form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError(String);

impl std::fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid run status: {}", self.0)
    }
}

impl std::error::Error for ParseStatusError {}

impl std::str::FromStr for RunStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "partial" => Ok(RunStatus::Partial),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of one source within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceRunStatus {
    Running,
    Success,
    Failed,
    Skipped,
}

impl SourceRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceRunStatus::Running => "running",
            SourceRunStatus::Success => "success",
            SourceRunStatus::Failed => "failed",
            SourceRunStatus::Skipped => "skipped",
        }
    }
}

impl std::str::FromStr for SourceRunStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SourceRunStatus::Running),
            "success" => Ok(SourceRunStatus::Success),
            "failed" => Ok(SourceRunStatus::Failed),
            "skipped" => Ok(SourceRunStatus::Skipped),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

impl std::fmt::Display for SourceRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a source did not run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The source ran too recently.
    Cooldown { remaining_minutes: i64 },
    /// A credential or required setting is absent.
    MissingConfig(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Cooldown { remaining_minutes } => {
                write!(f, "cooldown ({} min remaining)", remaining_minutes)
            }
            SkipReason::MissingConfig(what) => write!(f, "missing-config: {}", what),
        }
    }
}

// =============================================================================
// Counts and Results
// =============================================================================

/// Counters accumulated across the pages of one source attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionCounts {
    pub normalized: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub stale: usize,
}

impl IngestionCounts {
    pub fn add(&mut self, other: IngestionCounts) {
        self.normalized += other.normalized;
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
        self.stale += other.stale;
    }
}

/// Outcome of one source, as returned to the caller of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceResult {
    pub source: String,
    /// Newly inserted postings.
    pub count: usize,
    pub normalized: usize,
    pub duplicates: usize,
    pub stale_filtered: usize,
    pub status: SourceRunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceResult {
    pub fn completed(source: impl Into<String>, counts: IngestionCounts) -> Self {
        Self::with_counts(source, counts, SourceRunStatus::Success, None)
    }

    pub fn failed(source: impl Into<String>, counts: IngestionCounts, error: String) -> Self {
        Self::with_counts(source, counts, SourceRunStatus::Failed, Some(error))
    }

    pub fn skipped(source: impl Into<String>, reason: &SkipReason) -> Self {
        Self::with_counts(
            source,
            IngestionCounts::default(),
            SourceRunStatus::Skipped,
            Some(reason.to_string()),
        )
    }

    fn with_counts(
        source: impl Into<String>,
        counts: IngestionCounts,
        status: SourceRunStatus,
        error: Option<String>,
    ) -> Self {
        Self {
            source: source.into(),
            count: counts.inserted,
            normalized: counts.normalized,
            duplicates: counts.duplicates,
            stale_filtered: counts.stale,
            status,
            error,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == SourceRunStatus::Failed
    }
}

/// Aggregate totals written onto the run row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub sources: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub normalized: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub stale_filtered: usize,
}

impl RunTotals {
    pub fn from_results(results: &[SourceResult]) -> Self {
        let mut totals = RunTotals {
            sources: results.len(),
            ..Default::default()
        };
        for r in results {
            match r.status {
                SourceRunStatus::Success => totals.succeeded += 1,
                SourceRunStatus::Failed => totals.failed += 1,
                SourceRunStatus::Skipped => totals.skipped += 1,
                SourceRunStatus::Running => {}
            }
            totals.normalized += r.normalized;
            totals.inserted += r.count;
            totals.duplicates += r.duplicates;
            totals.stale_filtered += r.stale_filtered;
        }
        totals
    }
}

/// What a finished coordinator invocation hands back.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub totals: RunTotals,
    pub results: Vec<SourceResult>,
}

// =============================================================================
// Persisted Records
// =============================================================================

/// One invocation of the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub sources_requested: Vec<String>,
    pub totals: Option<RunTotals>,
    pub error_message: Option<String>,
}

/// Audit row for one source within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRunRecord {
    pub run_id: Uuid,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: SourceRunStatus,
    pub page_start: u32,
    pub page_end: Option<u32>,
    pub cursor_in: IngestionCursor,
    pub cursor_out: Option<IngestionCursor>,
    pub counts: IngestionCounts,
    pub error_message: Option<String>,
}

impl SourceRunRecord {
    /// A record in `running` state for a source that is about to start.
    pub fn start(
        run_id: Uuid,
        source: impl Into<String>,
        started_at: DateTime<Utc>,
        cursor_in: IngestionCursor,
    ) -> Self {
        Self {
            run_id,
            source: source.into(),
            started_at,
            finished_at: None,
            status: SourceRunStatus::Running,
            page_start: cursor_in.page(),
            page_end: None,
            cursor_in,
            cursor_out: None,
            counts: IngestionCounts::default(),
            error_message: None,
        }
    }
}
