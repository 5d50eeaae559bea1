//! Pomona DB - PostgreSQL persistence for the ingestion orchestrator
//!
//! This crate implements every store trait from `pomona_core::traits` on a
//! single pooled [`PgStore`].
//!
//! # Overview
//!
//! The tables and their owners:
//! - `ingestion_state` - per-source resume cursor ([`CursorStore`](pomona_core::CursorStore))
//! - `ingestion_runs`, `ingestion_run_sources` - run audit ([`RunStore`](pomona_core::RunStore))
//! - `source_health` - rolling health and heal counters
//! - `job_postings` - canonical postings keyed by `(source_slug, external_id)`
//! - `source_policy_overrides`, `company_targets`, `healing_attempts`, `alerts`
//!
//! Call [`migrate`] once at startup before using the store.

mod cursor;
mod healing;
mod health;
mod policy;
mod postings;
mod runs;
mod schema;
mod store;
mod targets;

pub use healing::AlertRecord;
pub use schema::{migrate, statements};
pub use store::{PgStore, PostingCount};
