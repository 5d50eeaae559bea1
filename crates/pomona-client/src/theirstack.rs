//! TheirStack job search API adapter.
//!
//! API reference: <https://api.theirstack.com/>
//!
//! Searches are `POST /v1/jobs/search` with a bearer token. The request body
//! carries the zero-based page, and at least one filter is mandatory, so the
//! age filter is always sent. A cursor `since` adds `posted_at_gte`.

use pomona_core::adapter::{Headers, RawPayload, SourceAdapter};
use pomona_core::config::SourceEntry;
use pomona_core::credentials::CredentialProvider;
use pomona_core::cursor::IngestionCursor;
use pomona_core::error::AppError;
use pomona_core::models::NormalizedJob;
use serde::{Deserialize, Serialize};

use crate::text::{base_url, de_id, detect_remote_type, round_amount, split_list};

const DEFAULT_BASE_URL: &str = "https://api.theirstack.com/v1/jobs/search";
const PAGE_SIZE: usize = 25;

#[derive(Serialize, Debug)]
struct SearchBody<'a> {
    page: u32,
    limit: usize,
    posted_at_max_age_days: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    posted_at_gte: Option<String>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    job_title_or: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    job_country_code_or: &'a [String],
    order_by: [OrderBy; 1],
}

#[derive(Serialize, Debug)]
struct OrderBy {
    field: &'static str,
    desc: bool,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
struct StackJob {
    #[serde(deserialize_with = "de_id")]
    id: String,
    job_title: String,
    url: Option<String>,
    final_url: Option<String>,
    date_posted: Option<String>,
    company: Option<String>,
    location: Option<String>,
    #[serde(default)]
    remote: Option<bool>,
    #[serde(default)]
    hybrid: Option<bool>,
    min_annual_salary: Option<f64>,
    max_annual_salary: Option<f64>,
    description: Option<String>,
    #[serde(default)]
    employment_statuses: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TheirStackAdapter {
    slug: String,
    base_url: String,
    titles: Vec<String>,
    countries: Vec<String>,
    max_age_days: u32,
    api_key: Option<String>,
}

impl TheirStackAdapter {
    pub const API_KEY_ENV: &'static str = "THEIRSTACK_API_KEY";

    pub fn new<C: CredentialProvider>(entry: &SourceEntry, credentials: &C) -> Self {
        Self {
            slug: entry.slug.clone(),
            base_url: base_url(entry, DEFAULT_BASE_URL),
            titles: split_list(entry.param("job_titles")),
            countries: split_list(entry.param("countries")),
            max_age_days: entry.policy().max_age_days,
            api_key: credentials.credential(Self::API_KEY_ENV),
        }
    }

    fn to_job(&self, raw: serde_json::Value) -> Result<NormalizedJob, AppError> {
        let item: StackJob = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::NormalizationError(format!("theirstack job: {}", e)))?;

        let mut job = NormalizedJob::new(&self.slug, item.id, item.job_title);
        job.company = item.company;
        job.location = item.location;
        job.remote_type = match (item.hybrid, item.remote) {
            (Some(true), _) => Some("hybrid".to_string()),
            (_, Some(true)) => Some("remote".to_string()),
            _ => detect_remote_type(job.location.as_deref()),
        };
        job.employment_type = item.employment_statuses.into_iter().next();
        job.posted_date = item.date_posted;
        job.external_url = item.final_url.or(item.url);
        job.salary_min = round_amount(item.min_annual_salary);
        job.salary_max = round_amount(item.max_annual_salary);
        job.description = item.description;
        job.raw = raw;
        Ok(job)
    }
}

impl SourceAdapter for TheirStackAdapter {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn expected_page_size(&self) -> usize {
        PAGE_SIZE
    }

    fn build_url(&self, _cursor: &IngestionCursor) -> Option<String> {
        self.api_key.as_ref()?;
        Some(self.base_url.clone())
    }

    fn build_headers(&self) -> Option<Headers> {
        let key = self.api_key.as_deref()?;
        let mut headers = Headers::new();
        headers.insert("Authorization".into(), format!("Bearer {}", key));
        headers.insert("Content-Type".into(), "application/json".into());
        Some(headers)
    }

    fn build_body(&self, cursor: &IngestionCursor) -> Option<Vec<u8>> {
        let body = SearchBody {
            page: cursor.page_index(),
            limit: PAGE_SIZE,
            posted_at_max_age_days: self.max_age_days,
            posted_at_gte: cursor.since().map(|s| s.format("%Y-%m-%d").to_string()),
            job_title_or: &self.titles,
            job_country_code_or: &self.countries,
            order_by: [OrderBy {
                field: "date_posted",
                desc: true,
            }],
        };
        serde_json::to_vec(&body).ok()
    }

    fn normalize(&self, payload: &RawPayload<'_>) -> Result<Vec<NormalizedJob>, AppError> {
        let page: SearchResponse = payload.json()?;
        page.data.into_iter().map(|raw| self.to_job(raw)).collect()
    }

    fn missing_config(&self) -> String {
        Self::API_KEY_ENV.to_string()
    }
}
