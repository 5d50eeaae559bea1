//! Source adapter abstraction.
//!
//! A source adapter turns a cursor into an outbound request and a provider
//! payload into [`NormalizedJob`]s. It never performs I/O itself: requests are
//! executed by an [`HttpFetcher`](crate::traits::HttpFetcher), so the ingestion
//! loop can own the fetch, timing and error accounting for every provider the
//! same way.
//!
//! Concrete adapters live in `pomona-client` and are chosen by an
//! [`AdapterFactory`] from the source entry's `adapter` kind.

use std::collections::BTreeMap;

use crate::config::SourceEntry;
use crate::cursor::IngestionCursor;
use crate::error::AppError;
use crate::models::NormalizedJob;
use crate::rotation::CompanyTarget;

/// Outbound header map. Ordered so requests are reproducible in tests and logs.
pub type Headers = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// A fully built provider request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }
}

/// Status and body of a provider response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The transport error a non-2xx response stands for.
    pub fn status_error(&self, url: &str) -> Option<AppError> {
        match self.status {
            s if (200..300).contains(&s) => None,
            429 => Some(AppError::RateLimitExceeded),
            status => Some(AppError::HttpStatus {
                status,
                url: url.to_string(),
            }),
        }
    }

    /// Maps a non-2xx response to the matching transport error.
    pub fn error_for_status(self, url: &str) -> Result<Self, AppError> {
        match self.status_error(url) {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// Where a payload came from, for adapters whose records do not carry it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PayloadOrigin<'a> {
    Page(u32),
    Feed(&'a str),
    Company(&'a CompanyTarget),
}

/// A raw provider payload handed to [`SourceAdapter::normalize`].
#[derive(Debug, Clone, Copy)]
pub struct RawPayload<'a> {
    pub body: &'a [u8],
    pub origin: PayloadOrigin<'a>,
}

impl<'a> RawPayload<'a> {
    pub fn page(body: &'a [u8], page: u32) -> Self {
        Self {
            body,
            origin: PayloadOrigin::Page(page),
        }
    }

    /// Parses the body as JSON, mapping failures to [`AppError::ParseError`].
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, AppError> {
        serde_json::from_slice(self.body)
            .map_err(|e| AppError::ParseError(format!("invalid JSON payload: {}", e)))
    }

    pub fn text(&self) -> Result<&'a str, AppError> {
        std::str::from_utf8(self.body)
            .map_err(|e| AppError::ParseError(format!("payload is not UTF-8: {}", e)))
    }
}

/// How a source's postings are retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPlan {
    /// One request per page, driven by the cursor.
    Paginated,
    /// A fixed list of feeds fetched together each run.
    Feeds,
    /// One request per company target from the rotation queue.
    Companies { platform: &'static str },
}

/// Per-provider strategy: build the request, authenticate, paginate, normalize.
///
/// `build_url` and `build_headers` return `None` when a credential or required
/// setting is absent. The loop treats that as a clean skip, never a failure.
pub trait SourceAdapter: Send + Sync {
    /// Slug of the source this adapter instance was built for.
    fn slug(&self) -> &str;

    fn plan(&self) -> FetchPlan {
        FetchPlan::Paginated
    }

    /// Items on a full page. A shorter page is the last page.
    fn expected_page_size(&self) -> usize;

    /// Page URL for the cursor, including any URL-embedded credential.
    fn build_url(&self, cursor: &IngestionCursor) -> Option<String>;

    /// Authentication and content headers.
    fn build_headers(&self) -> Option<Headers> {
        Some(Headers::new())
    }

    /// Request body for POST-paginated providers.
    fn build_body(&self, _cursor: &IngestionCursor) -> Option<Vec<u8>> {
        None
    }

    /// Maps a payload to postings. Malformed payloads are
    /// [`AppError::ParseError`]; well-formed payloads that cannot be mapped are
    /// [`AppError::NormalizationError`].
    fn normalize(&self, payload: &RawPayload<'_>) -> Result<Vec<NormalizedJob>, AppError>;

    /// Describes what is missing when `build_url`/`build_headers` return `None`.
    fn missing_config(&self) -> String {
        format!("credentials for source '{}'", self.slug())
    }

    /// Assembles the page request, or `None` when configuration is missing.
    fn build_request(&self, cursor: &IngestionCursor) -> Option<FetchRequest> {
        let url = self.build_url(cursor)?;
        let headers = self.build_headers()?;
        let body = self.build_body(cursor);
        let method = if body.is_some() {
            HttpMethod::Post
        } else {
            HttpMethod::Get
        };
        Some(FetchRequest {
            method,
            url,
            headers,
            body,
        })
    }

    /// Requests for every configured feed. Only used with [`FetchPlan::Feeds`].
    fn feed_requests(&self) -> Option<Vec<FetchRequest>> {
        None
    }

    /// Request for one company board. Only used with [`FetchPlan::Companies`].
    fn company_request(&self, _target: &CompanyTarget) -> Option<FetchRequest> {
        None
    }
}

/// Builds adapters from registry entries.
pub trait AdapterFactory: Send + Sync + Clone {
    type Adapter: SourceAdapter;

    /// Creates the adapter for an entry. Unsupported kinds are a
    /// [`AppError::ConfigError`].
    fn create(&self, entry: &SourceEntry) -> Result<Self::Adapter, AppError>;
}
