//! USAJOBS search API adapter.
//!
//! API reference: <https://developer.usajobs.gov/api-reference/get-api-search>
//!
//! Authentication uses three headers: `Host`, a contact e-mail as
//! `User-Agent`, and `Authorization-Key`. `DatePosted` takes a day count
//! between 0 and 60.

use chrono::Utc;
use pomona_core::adapter::{Headers, RawPayload, SourceAdapter};
use pomona_core::config::SourceEntry;
use pomona_core::credentials::CredentialProvider;
use pomona_core::cursor::IngestionCursor;
use pomona_core::error::AppError;
use pomona_core::models::NormalizedJob;
use reqwest::Url;
use serde::Deserialize;

use crate::text::{base_url, detect_remote_type, lookback_days, parse_amount, strip_html};

const DEFAULT_BASE_URL: &str = "https://data.usajobs.gov/api/search";
const PAGE_SIZE: usize = 50;
const MAX_DATE_POSTED_DAYS: u32 = 60;

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchEnvelope {
    search_result: SearchResult,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchResult {
    #[serde(default)]
    search_result_items: Vec<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct SearchItem {
    matched_object_id: String,
    matched_object_descriptor: Descriptor,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct Descriptor {
    position_title: String,
    #[serde(rename = "PositionURI")]
    position_uri: Option<String>,
    organization_name: Option<String>,
    position_location_display: Option<String>,
    publication_start_date: Option<String>,
    #[serde(default)]
    position_remuneration: Vec<Remuneration>,
    #[serde(default)]
    position_schedule: Vec<Named>,
    user_area: Option<UserArea>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct Remuneration {
    minimum_range: Option<String>,
    maximum_range: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct Named {
    name: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct UserArea {
    details: Option<Details>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct Details {
    job_summary: Option<String>,
    remote_indicator: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct UsaJobsAdapter {
    slug: String,
    base_url: String,
    keyword: Option<String>,
    location: Option<String>,
    api_key: Option<String>,
    email: Option<String>,
}

impl UsaJobsAdapter {
    pub const API_KEY_ENV: &'static str = "USAJOBS_API_KEY";
    pub const EMAIL_ENV: &'static str = "USAJOBS_EMAIL";

    pub fn new<C: CredentialProvider>(entry: &SourceEntry, credentials: &C) -> Self {
        Self {
            slug: entry.slug.clone(),
            base_url: base_url(entry, DEFAULT_BASE_URL),
            keyword: entry.param("keyword").map(str::to_string),
            location: entry.param("location").map(str::to_string),
            api_key: credentials.credential(Self::API_KEY_ENV),
            email: credentials.credential(Self::EMAIL_ENV),
        }
    }

    fn to_job(&self, raw: serde_json::Value) -> Result<NormalizedJob, AppError> {
        let item: SearchItem = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::NormalizationError(format!("usajobs item: {}", e)))?;
        let d = item.matched_object_descriptor;

        let mut job = NormalizedJob::new(&self.slug, item.matched_object_id, d.position_title);
        job.company = d.organization_name;
        job.location = d.position_location_display;
        job.employment_type = d.position_schedule.into_iter().find_map(|s| s.name);
        job.posted_date = d.publication_start_date;
        job.external_url = d.position_uri;
        if let Some(pay) = d.position_remuneration.first() {
            job.salary_min = pay.minimum_range.as_deref().and_then(parse_amount);
            job.salary_max = pay.maximum_range.as_deref().and_then(parse_amount);
        }
        let details = d.user_area.and_then(|u| u.details);
        let remote_flag = details.as_ref().and_then(|d| d.remote_indicator);
        job.description = details
            .and_then(|d| d.job_summary)
            .map(|s| strip_html(&s));
        job.remote_type = match remote_flag {
            Some(true) => Some("remote".to_string()),
            _ => detect_remote_type(
                [Some(job.title.as_str()), job.location.as_deref()]
                    .into_iter()
                    .flatten(),
            ),
        };
        job.raw = raw;
        Ok(job)
    }
}

impl SourceAdapter for UsaJobsAdapter {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn expected_page_size(&self) -> usize {
        PAGE_SIZE
    }

    fn build_url(&self, cursor: &IngestionCursor) -> Option<String> {
        let mut params = vec![
            ("ResultsPerPage", PAGE_SIZE.to_string()),
            ("Page", cursor.page().to_string()),
            ("SortField", "opendate".to_string()),
            ("SortDirection", "desc".to_string()),
        ];
        if let Some(keyword) = &self.keyword {
            params.push(("Keyword", keyword.clone()));
        }
        if let Some(location) = &self.location {
            params.push(("LocationName", location.clone()));
        }
        if let Some(days) = lookback_days(cursor.since(), Utc::now()) {
            params.push(("DatePosted", days.min(MAX_DATE_POSTED_DAYS).to_string()));
        }
        Url::parse_with_params(&self.base_url, &params)
            .ok()
            .map(String::from)
    }

    fn build_headers(&self) -> Option<Headers> {
        let key = self.api_key.as_deref()?;
        let email = self.email.as_deref()?;
        let host = Url::parse(&self.base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "data.usajobs.gov".to_string());

        let mut headers = Headers::new();
        headers.insert("Host".into(), host);
        headers.insert("User-Agent".into(), email.to_string());
        headers.insert("Authorization-Key".into(), key.to_string());
        Some(headers)
    }

    fn normalize(&self, payload: &RawPayload<'_>) -> Result<Vec<NormalizedJob>, AppError> {
        let envelope: SearchEnvelope = payload.json()?;
        envelope
            .search_result
            .search_result_items
            .into_iter()
            .map(|raw| self.to_job(raw))
            .collect()
    }

    fn missing_config(&self) -> String {
        format!("{} and {}", Self::API_KEY_ENV, Self::EMAIL_ENV)
    }
}
