//! Freshness filter.
//!
//! Postings older than a source's `max_age_days` are dropped before they reach
//! the store. The filter is biased towards keeping data: a posting whose date
//! is missing or cannot be parsed is always fresh.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};

use crate::models::NormalizedJob;

/// Result of filtering one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FreshnessOutcome {
    pub fresh: Vec<NormalizedJob>,
    pub stale_count: usize,
}

impl FreshnessOutcome {
    /// True when the batch was non-empty and nothing survived.
    pub fn all_stale(&self) -> bool {
        self.fresh.is_empty() && self.stale_count > 0
    }
}

/// Splits a batch into postings within `max_age_days` of `now` and a count of
/// the rest. Order of the fresh postings is preserved.
pub fn filter_by_freshness(
    jobs: Vec<NormalizedJob>,
    max_age_days: u32,
    now: DateTime<Utc>,
) -> FreshnessOutcome {
    // A window reaching past the earliest representable instant keeps everything.
    let cutoff = TimeDelta::try_days(i64::from(max_age_days))
        .and_then(|window| now.checked_sub_signed(window));
    let mut outcome = FreshnessOutcome::default();

    for job in jobs {
        let posted = job.posted_date.as_deref().and_then(parse_posted_date);
        match (posted, cutoff) {
            (Some(at), Some(cutoff)) if at < cutoff => outcome.stale_count += 1,
            _ => outcome.fresh.push(job),
        }
    }

    outcome
}

/// Parses the date formats providers are known to send.
///
/// Accepts RFC 3339, RFC 2822, naive ISO timestamps, `YYYY-MM-DD`,
/// `DD/MM/YYYY` and unix epoch seconds or milliseconds. Naive values are
/// taken as UTC.
pub fn parse_posted_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if s.bytes().all(|b| b.is_ascii_digit()) {
        let n: i64 = s.parse().ok()?;
        // 10^11 seconds is year 5138; anything larger is milliseconds.
        return if n >= 100_000_000_000 {
            DateTime::from_timestamp_millis(n)
        } else {
            DateTime::from_timestamp(n, 0)
        };
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    for fmt in ["%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
        }
    }

    None
}
