//! Adzuna search API adapter.
//!
//! API reference: <https://developer.adzuna.com/docs/search>
//!
//! The page number is part of the path (`/jobs/{country}/search/{page}`) and
//! the `app_id`/`app_key` pair travels in the query string. Once the cursor
//! has a `since`, `max_days_old` narrows to the days elapsed since then.

use chrono::Utc;
use pomona_core::adapter::{RawPayload, SourceAdapter};
use pomona_core::config::SourceEntry;
use pomona_core::credentials::CredentialProvider;
use pomona_core::cursor::IngestionCursor;
use pomona_core::error::AppError;
use pomona_core::models::NormalizedJob;
use reqwest::Url;
use serde::Deserialize;

use crate::text::{base_url, detect_remote_type, lookback_days, param_or, round_amount};

const DEFAULT_BASE_URL: &str = "https://api.adzuna.com/v1/api/jobs";
const PAGE_SIZE: usize = 50;

/// Results are kept as raw values so each posting retains its original record.
#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
struct AdzunaJob {
    id: String,
    title: String,
    description: Option<String>,
    created: Option<String>,
    redirect_url: Option<String>,
    company: Option<DisplayName>,
    location: Option<DisplayName>,
    salary_min: Option<f64>,
    salary_max: Option<f64>,
    contract_time: Option<String>,
}

#[derive(Deserialize, Debug)]
struct DisplayName {
    display_name: Option<String>,
}

/// Adzuna adapter for one country.
#[derive(Debug, Clone)]
pub struct AdzunaAdapter {
    slug: String,
    base_url: String,
    country: String,
    what: Option<String>,
    location: Option<String>,
    max_days_old: Option<u32>,
    app_id: Option<String>,
    app_key: Option<String>,
}

impl AdzunaAdapter {
    pub const APP_ID_ENV: &'static str = "ADZUNA_APP_ID";
    pub const APP_KEY_ENV: &'static str = "ADZUNA_APP_KEY";

    /// Reads `country` (default `gb`), `what`, `where` and `max_days_old`
    /// from the entry's params.
    pub fn new<C: CredentialProvider>(entry: &SourceEntry, credentials: &C) -> Self {
        Self {
            slug: entry.slug.clone(),
            base_url: base_url(entry, DEFAULT_BASE_URL),
            country: param_or(entry, "country", "gb").to_lowercase(),
            what: entry.param("what").map(str::to_string),
            location: entry.param("where").map(str::to_string),
            max_days_old: entry
                .param("max_days_old")
                .and_then(|v| v.trim().parse().ok()),
            app_id: credentials.credential(Self::APP_ID_ENV),
            app_key: credentials.credential(Self::APP_KEY_ENV),
        }
    }

    fn to_job(&self, raw: serde_json::Value) -> Result<NormalizedJob, AppError> {
        let item: AdzunaJob = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::NormalizationError(format!("adzuna result: {}", e)))?;

        let mut job = NormalizedJob::new(&self.slug, item.id, item.title);
        job.company = item.company.and_then(|c| c.display_name);
        job.location = item.location.and_then(|l| l.display_name);
        job.employment_type = item.contract_time;
        job.remote_type = detect_remote_type(
            [Some(job.title.as_str()), job.location.as_deref()]
                .into_iter()
                .flatten(),
        );
        job.posted_date = item.created;
        job.external_url = item.redirect_url;
        job.salary_min = round_amount(item.salary_min);
        job.salary_max = round_amount(item.salary_max);
        job.description = item.description;
        job.raw = raw;
        Ok(job)
    }
}

impl SourceAdapter for AdzunaAdapter {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn expected_page_size(&self) -> usize {
        PAGE_SIZE
    }

    fn build_url(&self, cursor: &IngestionCursor) -> Option<String> {
        let app_id = self.app_id.as_deref()?;
        let app_key = self.app_key.as_deref()?;

        let mut params = vec![
            ("app_id", app_id.to_string()),
            ("app_key", app_key.to_string()),
            ("results_per_page", PAGE_SIZE.to_string()),
            ("sort_by", "date".to_string()),
        ];
        if let Some(what) = &self.what {
            params.push(("what", what.clone()));
        }
        if let Some(location) = &self.location {
            params.push(("where", location.clone()));
        }
        let window = match (self.max_days_old, lookback_days(cursor.since(), Utc::now())) {
            (Some(configured), Some(elapsed)) => Some(configured.min(elapsed)),
            (configured, elapsed) => configured.or(elapsed),
        };
        if let Some(days) = window {
            params.push(("max_days_old", days.to_string()));
        }

        let path = format!(
            "{}/{}/search/{}",
            self.base_url,
            self.country,
            cursor.page()
        );
        Url::parse_with_params(&path, &params)
            .ok()
            .map(String::from)
    }

    fn normalize(&self, payload: &RawPayload<'_>) -> Result<Vec<NormalizedJob>, AppError> {
        let page: SearchResponse = payload.json()?;
        page.results
            .into_iter()
            .map(|raw| self.to_job(raw))
            .collect()
    }

    fn missing_config(&self) -> String {
        format!("{} and {}", Self::APP_ID_ENV, Self::APP_KEY_ENV)
    }
}
