//! Plain-text renderings of run summaries, health and the registry.
//!
//! Renderers return `String`s so `main` decides where they go (stdout for
//! data, stderr for logs) and tests can check them directly.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use pomona_core::{
    AppError, HealingReport, IngestionRun, RotationPass, RunSummary, SourceHealth,
    SourceRegistry,
};

const RULE: &str = "═══════════════════════════════════════════════════════════════════════";
const THIN_RULE: &str = "───────────────────────────────────────────────────────────────────────";

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn truncate_text(text: &str, max_len: usize) -> String {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.chars().count() <= max_len {
        cleaned
    } else {
        // Safely truncate text by characters to handle multi-byte UTF-8
        let truncated: String = cleaned.chars().take(max_len).collect();
        format!("{}...", truncated)
    }
}

/// Final error report. Application errors anywhere in the chain are shown with
/// their operator hint; the outermost context line is kept when it adds
/// something.
pub fn render_error(err: &anyhow::Error) -> String {
    let mut out = String::new();
    match err.chain().find_map(|cause| cause.downcast_ref::<AppError>()) {
        Some(app) => {
            let context = err.to_string();
            if context != app.to_string() {
                let _ = writeln!(out, "Error: {}", context);
            }
            let _ = writeln!(out, "Error: {}", app.user_message());
        }
        None => {
            let _ = writeln!(out, "Error: {:#}", err);
        }
    }
    out
}

/// Per-source result table followed by the run totals.
pub fn render_run_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "Run {} finished: {}", summary.run_id, summary.status);
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(
        out,
        "  {:<22} {:<8} {:>8} {:>10} {:>6} {:>6}",
        "SOURCE", "STATUS", "NEW", "NORMALIZED", "DUPS", "STALE"
    );
    for result in &summary.results {
        let _ = writeln!(
            out,
            "  {:<22} {:<8} {:>8} {:>10} {:>6} {:>6}",
            result.source,
            result.status.as_str(),
            result.count,
            result.normalized,
            result.duplicates,
            result.stale_filtered
        );
        if let Some(error) = &result.error {
            let _ = writeln!(out, "    ✗ {}", truncate_text(error, 100));
        }
    }

    let totals = &summary.totals;
    let _ = writeln!(out, "{}", THIN_RULE);
    let _ = writeln!(
        out,
        "  Sources: {} ({} ok, {} failed, {} skipped)",
        totals.sources, totals.succeeded, totals.failed, totals.skipped
    );
    let _ = writeln!(
        out,
        "  Postings: {} new, {} normalized, {} duplicates, {} stale",
        totals.inserted, totals.normalized, totals.duplicates, totals.stale_filtered
    );
    let _ = writeln!(out, "{}", RULE);
    out
}

/// One line per source health row.
pub fn render_health(health: &[SourceHealth]) -> String {
    if health.is_empty() {
        return "No source has run yet.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "  {:<22} {:<9} {:>5} {:>5} {:<16} {:<16}",
        "SOURCE", "STATE", "FAILS", "HEALS", "LAST RUN", "LAST SUCCESS"
    );
    for row in health {
        let state = if row.is_degraded { "degraded" } else { "ok" };
        let _ = writeln!(
            out,
            "  {:<22} {:<9} {:>5} {:>5} {:<16} {:<16}",
            row.source,
            state,
            row.consecutive_failures,
            row.heal_attempts_24h,
            timestamp(row.last_run_at),
            timestamp(row.last_success_at)
        );
        if row.is_degraded
            && let Some(error) = &row.last_error
        {
            let _ = writeln!(out, "    ✗ {}", truncate_text(error, 100));
        }
    }
    out
}

/// Most recent runs, newest first.
pub fn render_runs(runs: &[IngestionRun]) -> String {
    let mut out = String::new();
    for run in runs {
        let inserted = run.totals.map(|t| t.inserted).unwrap_or_default();
        let _ = writeln!(
            out,
            "  {}  {:<8} {:<16} {:>3} sources  {:>6} new",
            run.id,
            run.status.as_str(),
            timestamp(Some(run.started_at)),
            run.sources_requested.len(),
            inserted
        );
        if let Some(error) = &run.error_message {
            let _ = writeln!(out, "    ✗ {}", truncate_text(error, 100));
        }
    }
    out
}

/// Registry entries with their effective policies.
pub fn render_sources(registry: &SourceRegistry) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "  {:<22} {:<11} {:<16} {:<8} {:>8} {:>6} {:<6}",
        "SLUG", "ADAPTER", "MODE", "ENABLED", "MAX AGE", "PAGES", "TRUST"
    );
    for entry in registry.entries() {
        let policy = registry.policy(entry);
        let _ = writeln!(
            out,
            "  {:<22} {:<11} {:<16} {:<8} {:>7}d {:>6} {:<6}",
            entry.slug,
            entry.adapter.as_str(),
            policy.mode.to_string(),
            if policy.enabled { "yes" } else { "no" },
            policy.max_age_days,
            policy.max_pages_per_run,
            policy.trust_level.as_str()
        );
    }
    out
}

/// Healer pass summary with every attempt.
pub fn render_healing_report(report: &HealingReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "HEALER PASS COMPLETE");
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "  Stuck runs reaped:   {}", report.stuck_runs_reaped);
    let _ = writeln!(out, "  Counters reset:      {}", report.counters_reset);
    let _ = writeln!(out, "  Attempts:            {}", report.attempts.len());
    if !report.attempts.is_empty() {
        let _ = writeln!(out, "{}", THIN_RULE);
        for attempt in &report.attempts {
            let _ = writeln!(
                out,
                "  {:<22} {:<22} {:<15} {}",
                attempt.source,
                attempt.failure_type.as_str(),
                attempt.action.as_str(),
                attempt.result.as_str()
            );
        }
    }
    let _ = writeln!(out, "{}", RULE);
    out
}

/// Outcome of a standalone rotation pass.
pub fn render_rotation_pass(platform: &str, pass: &RotationPass, inserted: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Rotation pass: {}", platform);
    let _ = writeln!(out, "  Targets selected:    {}", pass.selected);
    let _ = writeln!(out, "  With postings:       {}", pass.found);
    let _ = writeln!(out, "  Empty:               {}", pass.empty);
    let _ = writeln!(out, "  Failed:              {}", pass.failed);
    let _ = writeln!(out, "  New postings:        {}", inserted);
    if let Some(error) = &pass.last_error {
        let _ = writeln!(out, "  Last error:          {}", truncate_text(error, 100));
    }
    out
}
