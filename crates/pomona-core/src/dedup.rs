//! In-batch duplicate collapsing.

use std::collections::HashSet;

use crate::models::NormalizedJob;

/// Collapses postings that share `(source_slug, external_id)`, keeping the
/// first occurrence. Returns the survivors in input order and how many were
/// dropped.
pub fn dedupe_batch(jobs: Vec<NormalizedJob>) -> (Vec<NormalizedJob>, usize) {
    let mut seen: HashSet<(String, String)> = HashSet::with_capacity(jobs.len());
    let before = jobs.len();

    let unique: Vec<NormalizedJob> = jobs
        .into_iter()
        .filter(|job| seen.insert((job.source_slug.clone(), job.external_id.clone())))
        .collect();

    let dropped = before - unique.len();
    (unique, dropped)
}
