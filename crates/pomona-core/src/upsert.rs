//! Dedup, enrich and persist a batch of fresh postings.

use crate::config::TrustLevel;
use crate::dedup::dedupe_batch;
use crate::enrichment::enrich;
use crate::error::AppError;
use crate::models::{EnrichedJob, NormalizedJob};
use crate::traits::PostingStore;

/// Counts from persisting one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Rows that did not exist before.
    pub inserted: usize,
    /// Batch size minus inserted: in-batch repeats plus already stored postings.
    pub duplicates: usize,
    /// Postings dropped by in-batch dedup (included in `duplicates`).
    pub collapsed: usize,
}

/// Collapses in-batch duplicates, enriches the survivors and upserts them.
///
/// Upserting the same postings twice is idempotent: the second call reports
/// `inserted = 0`.
pub async fn persist_batch<S: PostingStore>(
    store: &S,
    jobs: Vec<NormalizedJob>,
    trust_level: TrustLevel,
) -> Result<UpsertOutcome, AppError> {
    let batch_size = jobs.len();
    if batch_size == 0 {
        return Ok(UpsertOutcome::default());
    }

    let (unique, collapsed) = dedupe_batch(jobs);
    let enriched: Vec<EnrichedJob> = unique
        .into_iter()
        .map(|job| EnrichedJob {
            enrichment: enrich(&job),
            job,
            trust_level,
        })
        .collect();

    let inserted = store.upsert_postings(&enriched).await?;

    Ok(UpsertOutcome {
        inserted,
        duplicates: batch_size.saturating_sub(inserted),
        collapsed,
    })
}
