//! Durable per-source resume position.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Pagination position for one source.
///
/// `page` is always at least 1. `since` only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionCursor {
    page: u32,
    since: Option<DateTime<Utc>>,
}

impl Default for IngestionCursor {
    fn default() -> Self {
        Self::first()
    }
}

impl IngestionCursor {
    /// Page 1 with no lower time bound.
    pub fn first() -> Self {
        Self {
            page: 1,
            since: None,
        }
    }

    /// Builds a cursor from stored values. A page below 1 is clamped to 1.
    pub fn new(page: u32, since: Option<DateTime<Utc>>) -> Self {
        Self {
            page: page.max(1),
            since,
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn since(&self) -> Option<DateTime<Utc>> {
        self.since
    }

    /// Zero-based page index, for providers that count from 0.
    pub fn page_index(&self) -> u32 {
        self.page - 1
    }

    pub fn next_page(self) -> Self {
        Self {
            page: self.page.saturating_add(1),
            ..self
        }
    }

    /// Back to page 1, keeping `since`.
    pub fn rewind(self) -> Self {
        Self { page: 1, ..self }
    }

    /// Moves `since` forward to `at` if that is later than the current value.
    pub fn advance_since(self, at: DateTime<Utc>) -> Self {
        let since = match self.since {
            Some(current) if current >= at => current,
            _ => at,
        };
        Self {
            since: Some(since),
            ..self
        }
    }
}

/// Cursor plus the start time of the last attempt that was not skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionState {
    pub cursor: IngestionCursor,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl IngestionState {
    pub fn new(cursor: IngestionCursor, last_run_at: Option<DateTime<Utc>>) -> Self {
        Self {
            cursor,
            last_run_at,
        }
    }

    /// Time left before the source may run again, or `None` when it may run now.
    pub fn cooldown_remaining(
        &self,
        now: DateTime<Utc>,
        cooldown_minutes: Option<u32>,
    ) -> Option<TimeDelta> {
        let minutes = cooldown_minutes.filter(|m| *m > 0)?;
        let last = self.last_run_at?;
        let remaining = TimeDelta::minutes(i64::from(minutes)) - (now - last);
        (remaining > TimeDelta::zero()).then_some(remaining)
    }
}
