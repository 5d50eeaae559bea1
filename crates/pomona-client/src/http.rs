//! reqwest-backed [`HttpFetcher`].

use std::time::Duration;

use pomona_core::HttpConfig;
use pomona_core::adapter::{FetchRequest, FetchResponse, HttpMethod};
use pomona_core::error::AppError;
use pomona_core::traits::HttpFetcher;
use reqwest::Client;
use tokio::time::sleep;

/// Executes provider requests with a shared connection pool.
///
/// Transient failures (timeouts, connection errors, 5xx and 429) are retried
/// up to `HttpConfig::max_retries` times with a linearly growing delay. What
/// still fails after that is left to the page loop and the healer.
///
/// # Examples
///
/// ```no_run
/// use pomona_client::ReqwestFetcher;
/// use pomona_core::HttpConfig;
/// use pomona_core::adapter::FetchRequest;
/// use pomona_core::traits::HttpFetcher;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = ReqwestFetcher::new(&HttpConfig::default())?;
/// let response = fetcher
///     .fetch(&FetchRequest::get("https://www.themuse.com/api/public/jobs?page=0"))
///     .await?;
/// println!("HTTP {} ({} bytes)", response.status, response.body.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    timeout_secs: u64,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl ReqwestFetcher {
    /// Builds a client with the configured timeout and user agent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ClientError` if the HTTP client cannot be built.
    pub fn new(config: &HttpConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            timeout_secs: config.timeout.as_secs(),
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay,
        })
    }

    /// Whether another attempt could turn this outcome into a success.
    fn is_transient(result: &Result<FetchResponse, AppError>, url: &str) -> bool {
        match result {
            Ok(response) => response
                .status_error(url)
                .is_some_and(|e| e.is_retryable()),
            Err(e) => e.is_retryable(),
        }
    }

    fn map_error(&self, url: &str, err: reqwest::Error) -> AppError {
        if err.is_timeout() {
            AppError::Timeout(self.timeout_secs)
        } else if err.is_connect() {
            AppError::NetworkError(format!("connection failed for {}: {}", url, err))
        } else if err.is_builder() {
            AppError::InvalidUrl(url.to_string())
        } else {
            AppError::NetworkError(err.to_string())
        }
    }
}

impl HttpFetcher for ReqwestFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, AppError> {
        let mut attempt = 0;
        loop {
            let result = self.send_once(request).await;
            if attempt >= self.max_retries || !Self::is_transient(&result, &request.url) {
                return result;
            }

            attempt += 1;
            let delay = self.retry_base_delay * attempt;
            let outcome = match &result {
                Ok(response) => format!("HTTP {}", response.status),
                Err(e) => e.to_string(),
            };
            tracing::debug!(
                url = %request.url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                %outcome,
                "Retrying provider request"
            );
            sleep(delay).await;
        }
    }
}

impl ReqwestFetcher {
    async fn send_once(&self, request: &FetchRequest) -> Result<FetchResponse, AppError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let started = std::time::Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| self.map_error(&request.url, e))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_error(&request.url, e))?;

        tracing::debug!(
            method = request.method.as_str(),
            status,
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fetched provider response"
        );

        Ok(FetchResponse {
            status,
            body: body.to_vec(),
        })
    }
}
