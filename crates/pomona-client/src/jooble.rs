//! Jooble REST API adapter.
//!
//! API reference: <https://jooble.org/api/about>
//!
//! Requests are `POST {base}/{api_key}` with the search and page number in a
//! JSON body.

use pomona_core::adapter::{Headers, RawPayload, SourceAdapter};
use pomona_core::config::SourceEntry;
use pomona_core::credentials::CredentialProvider;
use pomona_core::cursor::IngestionCursor;
use pomona_core::error::AppError;
use pomona_core::models::NormalizedJob;
use serde::{Deserialize, Serialize};

use crate::text::{base_url, de_id, detect_remote_type, parse_amount, strip_html};

const DEFAULT_BASE_URL: &str = "https://jooble.org/api";
const PAGE_SIZE: usize = 20;

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SearchBody<'a> {
    keywords: &'a str,
    location: &'a str,
    page: u32,
    #[serde(rename = "ResultOnPage")]
    result_on_page: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    jobs: Vec<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
struct JoobleJob {
    #[serde(deserialize_with = "de_id")]
    id: String,
    title: String,
    location: Option<String>,
    snippet: Option<String>,
    salary: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    link: Option<String>,
    company: Option<String>,
    updated: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JoobleAdapter {
    slug: String,
    base_url: String,
    keywords: String,
    location: String,
    api_key: Option<String>,
}

impl JoobleAdapter {
    pub const API_KEY_ENV: &'static str = "JOOBLE_API_KEY";

    pub fn new<C: CredentialProvider>(entry: &SourceEntry, credentials: &C) -> Self {
        Self {
            slug: entry.slug.clone(),
            base_url: base_url(entry, DEFAULT_BASE_URL),
            keywords: entry.param("keywords").unwrap_or_default().to_string(),
            location: entry.param("location").unwrap_or_default().to_string(),
            api_key: credentials.credential(Self::API_KEY_ENV),
        }
    }

    fn to_job(&self, raw: serde_json::Value) -> Result<NormalizedJob, AppError> {
        let item: JoobleJob = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::NormalizationError(format!("jooble job: {}", e)))?;

        let mut job = NormalizedJob::new(&self.slug, item.id, strip_html(&item.title));
        job.company = item.company.filter(|c| !c.is_empty());
        job.location = item.location.filter(|l| !l.is_empty());
        job.employment_type = item.kind.filter(|t| !t.is_empty());
        job.description = item.snippet.as_deref().map(strip_html);
        job.remote_type = detect_remote_type(
            [Some(job.title.as_str()), job.location.as_deref()]
                .into_iter()
                .flatten(),
        );
        // Salary is free text such as "£40,000 - £50,000 per annum".
        if let Some(salary) = item.salary.as_deref() {
            let mut parts = salary.split('-').filter_map(parse_amount);
            job.salary_min = parts.next();
            job.salary_max = parts.next().or(job.salary_min);
        }
        job.posted_date = item.updated;
        job.external_url = item.link;
        job.raw = raw;
        Ok(job)
    }
}

impl SourceAdapter for JoobleAdapter {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn expected_page_size(&self) -> usize {
        PAGE_SIZE
    }

    fn build_url(&self, _cursor: &IngestionCursor) -> Option<String> {
        let key = self.api_key.as_deref()?;
        Some(format!("{}/{}", self.base_url, key))
    }

    fn build_headers(&self) -> Option<Headers> {
        let mut headers = Headers::new();
        headers.insert("Content-Type".into(), "application/json".into());
        Some(headers)
    }

    fn build_body(&self, cursor: &IngestionCursor) -> Option<Vec<u8>> {
        let body = SearchBody {
            keywords: &self.keywords,
            location: &self.location,
            page: cursor.page(),
            result_on_page: PAGE_SIZE,
        };
        serde_json::to_vec(&body).ok()
    }

    fn normalize(&self, payload: &RawPayload<'_>) -> Result<Vec<NormalizedJob>, AppError> {
        let page: SearchResponse = payload.json()?;
        page.jobs.into_iter().map(|raw| self.to_job(raw)).collect()
    }

    fn missing_config(&self) -> String {
        Self::API_KEY_ENV.to_string()
    }
}
