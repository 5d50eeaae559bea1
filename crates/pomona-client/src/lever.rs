//! Lever postings API adapter.
//!
//! API reference: <https://github.com/lever/postings-api>

use pomona_core::adapter::{FetchPlan, FetchRequest, PayloadOrigin, RawPayload, SourceAdapter};
use pomona_core::config::SourceEntry;
use pomona_core::cursor::IngestionCursor;
use pomona_core::error::AppError;
use pomona_core::models::NormalizedJob;
use pomona_core::rotation::CompanyTarget;
use serde::Deserialize;

use crate::text::{base_url, detect_remote_type};

const DEFAULT_BASE_URL: &str = "https://api.lever.co/v0/postings";
pub const PLATFORM: &str = "lever";

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Posting {
    id: String,
    text: String,
    hosted_url: Option<String>,
    /// Epoch milliseconds.
    created_at: Option<i64>,
    #[serde(default)]
    categories: Categories,
    description_plain: Option<String>,
    workplace_type: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct Categories {
    location: Option<String>,
    commitment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LeverAdapter {
    slug: String,
    base_url: String,
}

impl LeverAdapter {
    pub fn new(entry: &SourceEntry) -> Self {
        Self {
            slug: entry.slug.clone(),
            base_url: base_url(entry, DEFAULT_BASE_URL),
        }
    }

    fn to_job(
        &self,
        raw: serde_json::Value,
        target: Option<&CompanyTarget>,
    ) -> Result<NormalizedJob, AppError> {
        let item: Posting = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::NormalizationError(format!("lever posting: {}", e)))?;

        let mut job = NormalizedJob::new(&self.slug, item.id, item.text);
        job.company = target.map(|t| t.company_slug.clone());
        job.location = item.categories.location;
        job.employment_type = item.categories.commitment;
        job.remote_type = match item.workplace_type.as_deref() {
            Some("remote") => Some("remote".to_string()),
            Some("hybrid") => Some("hybrid".to_string()),
            Some("onsite") => None,
            _ => detect_remote_type(
                [Some(job.title.as_str()), job.location.as_deref()]
                    .into_iter()
                    .flatten(),
            ),
        };
        job.posted_date = item.created_at.map(|ms| ms.to_string());
        job.external_url = item.hosted_url;
        job.description = item.description_plain.map(|d| d.trim().to_string());
        job.raw = raw;
        Ok(job)
    }
}

impl SourceAdapter for LeverAdapter {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn plan(&self) -> FetchPlan {
        FetchPlan::Companies { platform: PLATFORM }
    }

    fn expected_page_size(&self) -> usize {
        0
    }

    fn build_url(&self, _cursor: &IngestionCursor) -> Option<String> {
        None
    }

    fn normalize(&self, payload: &RawPayload<'_>) -> Result<Vec<NormalizedJob>, AppError> {
        let target = match payload.origin {
            PayloadOrigin::Company(target) => Some(target),
            _ => None,
        };
        // The endpoint returns a bare array.
        let postings: Vec<serde_json::Value> = payload.json()?;
        postings
            .into_iter()
            .map(|raw| self.to_job(raw, target))
            .collect()
    }

    fn missing_config(&self) -> String {
        format!("company boards for source '{}'", self.slug)
    }

    fn company_request(&self, target: &CompanyTarget) -> Option<FetchRequest> {
        Some(FetchRequest::get(format!(
            "{}/{}?mode=json",
            self.base_url,
            target.board_id()
        )))
    }
}
