//! Reed.co.uk jobseeker API adapter.
//!
//! API reference: <https://www.reed.co.uk/developers/jobseeker>
//!
//! Authentication is HTTP Basic with the API key as the username and an empty
//! password. Pagination is offset based (`resultsToSkip`).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pomona_core::adapter::{Headers, RawPayload, SourceAdapter};
use pomona_core::config::SourceEntry;
use pomona_core::credentials::CredentialProvider;
use pomona_core::cursor::IngestionCursor;
use pomona_core::error::AppError;
use pomona_core::models::NormalizedJob;
use reqwest::Url;
use serde::Deserialize;

use crate::text::{base_url, de_id, detect_remote_type, round_amount, strip_html};

const DEFAULT_BASE_URL: &str = "https://www.reed.co.uk/api/1.0/search";
const PAGE_SIZE: usize = 100;

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ReedJob {
    #[serde(deserialize_with = "de_id")]
    job_id: String,
    job_title: String,
    employer_name: Option<String>,
    location_name: Option<String>,
    minimum_salary: Option<f64>,
    maximum_salary: Option<f64>,
    /// `dd/mm/yyyy`, understood by the freshness parser.
    date: Option<String>,
    job_description: Option<String>,
    job_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReedAdapter {
    slug: String,
    base_url: String,
    keywords: Option<String>,
    location: Option<String>,
    api_key: Option<String>,
}

impl ReedAdapter {
    pub const API_KEY_ENV: &'static str = "REED_API_KEY";

    pub fn new<C: CredentialProvider>(entry: &SourceEntry, credentials: &C) -> Self {
        Self {
            slug: entry.slug.clone(),
            base_url: base_url(entry, DEFAULT_BASE_URL),
            keywords: entry.param("keywords").map(str::to_string),
            location: entry.param("location").map(str::to_string),
            api_key: credentials.credential(Self::API_KEY_ENV),
        }
    }

    fn to_job(&self, raw: serde_json::Value) -> Result<NormalizedJob, AppError> {
        let item: ReedJob = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::NormalizationError(format!("reed result: {}", e)))?;

        let mut job = NormalizedJob::new(&self.slug, item.job_id, item.job_title);
        job.company = item.employer_name;
        job.location = item.location_name;
        job.salary_min = round_amount(item.minimum_salary);
        job.salary_max = round_amount(item.maximum_salary);
        job.posted_date = item.date;
        job.description = item.job_description.as_deref().map(strip_html);
        job.remote_type = detect_remote_type(
            [Some(job.title.as_str()), job.location.as_deref()]
                .into_iter()
                .flatten(),
        );
        job.external_url = item.job_url;
        job.raw = raw;
        Ok(job)
    }
}

impl SourceAdapter for ReedAdapter {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn expected_page_size(&self) -> usize {
        PAGE_SIZE
    }

    fn build_url(&self, cursor: &IngestionCursor) -> Option<String> {
        let skip = cursor.page_index() as usize * PAGE_SIZE;
        let mut params = vec![
            ("resultsToTake", PAGE_SIZE.to_string()),
            ("resultsToSkip", skip.to_string()),
        ];
        if let Some(keywords) = &self.keywords {
            params.push(("keywords", keywords.clone()));
        }
        if let Some(location) = &self.location {
            params.push(("locationName", location.clone()));
        }
        Url::parse_with_params(&self.base_url, &params)
            .ok()
            .map(String::from)
    }

    fn build_headers(&self) -> Option<Headers> {
        let key = self.api_key.as_deref()?;
        let mut headers = Headers::new();
        headers.insert(
            "Authorization".into(),
            format!("Basic {}", STANDARD.encode(format!("{}:", key))),
        );
        Some(headers)
    }

    fn normalize(&self, payload: &RawPayload<'_>) -> Result<Vec<NormalizedJob>, AppError> {
        let page: SearchResponse = payload.json()?;
        page.results
            .into_iter()
            .map(|raw| self.to_job(raw))
            .collect()
    }

    fn missing_config(&self) -> String {
        Self::API_KEY_ENV.to_string()
    }
}
