//! The Muse public jobs API adapter.
//!
//! API reference: <https://www.themuse.com/developers/api/v2>
//!
//! Pages are zero-based and the API key is optional; without one the
//! provider applies a lower rate limit.

use pomona_core::adapter::{RawPayload, SourceAdapter};
use pomona_core::config::SourceEntry;
use pomona_core::credentials::CredentialProvider;
use pomona_core::cursor::IngestionCursor;
use pomona_core::error::AppError;
use pomona_core::models::NormalizedJob;
use reqwest::Url;
use serde::Deserialize;

use crate::text::{base_url, de_id, detect_remote_type, split_list, strip_html};

const DEFAULT_BASE_URL: &str = "https://www.themuse.com/api/public/jobs";
const PAGE_SIZE: usize = 20;

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
struct MuseJob {
    #[serde(deserialize_with = "de_id")]
    id: String,
    name: String,
    contents: Option<String>,
    publication_date: Option<String>,
    #[serde(default)]
    locations: Vec<Named>,
    #[serde(default)]
    levels: Vec<Named>,
    company: Option<Named>,
    refs: Option<Refs>,
}

#[derive(Deserialize, Debug)]
struct Named {
    name: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Refs {
    landing_page: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TheMuseAdapter {
    slug: String,
    base_url: String,
    categories: Vec<String>,
    locations: Vec<String>,
    levels: Vec<String>,
    api_key: Option<String>,
}

impl TheMuseAdapter {
    pub const API_KEY_ENV: &'static str = "THEMUSE_API_KEY";

    /// `category`, `location` and `level` params accept comma-separated lists.
    pub fn new<C: CredentialProvider>(entry: &SourceEntry, credentials: &C) -> Self {
        Self {
            slug: entry.slug.clone(),
            base_url: base_url(entry, DEFAULT_BASE_URL),
            categories: split_list(entry.param("category")),
            locations: split_list(entry.param("location")),
            levels: split_list(entry.param("level")),
            api_key: credentials.credential(Self::API_KEY_ENV),
        }
    }

    fn to_job(&self, raw: serde_json::Value) -> Result<NormalizedJob, AppError> {
        let item: MuseJob = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::NormalizationError(format!("themuse result: {}", e)))?;

        let locations: Vec<String> = item.locations.into_iter().filter_map(|l| l.name).collect();

        let mut job = NormalizedJob::new(&self.slug, item.id, item.name);
        job.company = item.company.and_then(|c| c.name);
        job.remote_type = detect_remote_type(locations.iter().map(String::as_str));
        job.location = (!locations.is_empty()).then(|| locations.join("; "));
        job.employment_type = item.levels.into_iter().find_map(|l| l.name);
        job.posted_date = item.publication_date;
        job.external_url = item.refs.and_then(|r| r.landing_page);
        job.description = item.contents.as_deref().map(strip_html);
        job.raw = raw;
        Ok(job)
    }
}

impl SourceAdapter for TheMuseAdapter {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn expected_page_size(&self) -> usize {
        PAGE_SIZE
    }

    fn build_url(&self, cursor: &IngestionCursor) -> Option<String> {
        let mut params = vec![
            ("page", cursor.page_index().to_string()),
            ("descending", "true".to_string()),
        ];
        params.extend(self.categories.iter().map(|c| ("category", c.clone())));
        params.extend(self.locations.iter().map(|l| ("location", l.clone())));
        params.extend(self.levels.iter().map(|l| ("level", l.clone())));
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        Url::parse_with_params(&self.base_url, &params)
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
}
