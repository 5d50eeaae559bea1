//! Greenhouse job board API adapter.
//!
//! API reference: <https://developers.greenhouse.io/job-board.html>
//!
//! Each company publishes one public board, so the source is driven by the
//! rotation queue rather than by pages.

use pomona_core::adapter::{FetchPlan, FetchRequest, PayloadOrigin, RawPayload, SourceAdapter};
use pomona_core::config::SourceEntry;
use pomona_core::cursor::IngestionCursor;
use pomona_core::error::AppError;
use pomona_core::models::NormalizedJob;
use pomona_core::rotation::CompanyTarget;
use serde::Deserialize;

use crate::text::{base_url, de_id, detect_remote_type, strip_html};

const DEFAULT_BASE_URL: &str = "https://boards-api.greenhouse.io/v1/boards";
pub const PLATFORM: &str = "greenhouse";

#[derive(Deserialize)]
struct BoardResponse {
    #[serde(default)]
    jobs: Vec<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
struct BoardJob {
    #[serde(deserialize_with = "de_id")]
    id: String,
    title: String,
    updated_at: Option<String>,
    first_published: Option<String>,
    absolute_url: Option<String>,
    location: Option<Location>,
    company_name: Option<String>,
    /// HTML, entity-escaped once more than usual.
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Location {
    name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GreenhouseAdapter {
    slug: String,
    base_url: String,
}

impl GreenhouseAdapter {
    pub fn new(entry: &SourceEntry) -> Self {
        Self {
            slug: entry.slug.clone(),
            base_url: base_url(entry, DEFAULT_BASE_URL),
        }
    }

    fn board_url(&self, board: &str) -> String {
        format!("{}/{}/jobs?content=true", self.base_url, board)
    }

    fn to_job(
        &self,
        raw: serde_json::Value,
        target: Option<&CompanyTarget>,
    ) -> Result<NormalizedJob, AppError> {
        let item: BoardJob = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::NormalizationError(format!("greenhouse job: {}", e)))?;

        let mut job = NormalizedJob::new(&self.slug, item.id, item.title);
        job.company = item
            .company_name
            .or_else(|| target.map(|t| t.company_slug.clone()));
        job.location = item.location.and_then(|l| l.name);
        job.remote_type = detect_remote_type(
            [Some(job.title.as_str()), job.location.as_deref()]
                .into_iter()
                .flatten(),
        );
        job.posted_date = item.first_published.or(item.updated_at);
        job.external_url = item.absolute_url;
        job.description = item.content.as_deref().map(strip_html);
        job.raw = raw;
        Ok(job)
    }
}

impl SourceAdapter for GreenhouseAdapter {
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
        let board: BoardResponse = payload.json()?;
        board
            .jobs
            .into_iter()
            .map(|raw| self.to_job(raw, target))
            .collect()
    }

    fn missing_config(&self) -> String {
        format!("company boards for source '{}'", self.slug)
    }

    fn company_request(&self, target: &CompanyTarget) -> Option<FetchRequest> {
        Some(FetchRequest::get(self.board_url(target.board_id())))
    }
}
