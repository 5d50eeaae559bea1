use thiserror::Error;

/// Application-wide error types.
///
/// This enum represents all errors that can surface while ingesting job postings.
/// It uses `thiserror` for ergonomic error handling and automatic conversion from
/// underlying library errors.
///
/// # Error Conversion
///
/// - `sqlx::Error` → `AppError::DatabaseError`
///
/// # Failure taxonomy
///
/// The per-source ingestion loop treats the variants in three groups:
///
/// - [`AppError::MissingConfig`] is a clean skip, never a failure.
/// - Transport errors ([`AppError::NetworkError`], [`AppError::Timeout`],
///   [`AppError::HttpStatus`], [`AppError::RateLimitExceeded`]) abort the page loop.
/// - Payload and persistence errors ([`AppError::ParseError`],
///   [`AppError::NormalizationError`], [`AppError::DatabaseError`],
///   [`AppError::PersistenceError`]) abort the page loop and fail the source.
///
/// The `Display` text of each variant is persisted as `last_error` and later
/// classified by the healer, so changing these strings changes healing behaviour.
///
/// # Examples
///
/// ```no_run
/// use pomona_core::error::AppError;
///
/// fn example() -> Result<(), AppError> {
///     Err(AppError::MissingConfig("ADZUNA_APP_KEY".to_string()))
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Database operation failed.
    ///
    /// Wraps all errors from SQLx database operations, including connection
    /// failures, query errors, and constraint violations.
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// A store rejected a write for a reason that is not a driver error.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// HTTP client could not be built or a request could not be sent.
    #[error("API Client error: {0}")]
    ClientError(String),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Requested source slug is not in the registry.
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    /// A credential or required adapter setting is absent.
    ///
    /// Sources that report this are skipped, not failed.
    #[error("Missing configuration: {0}")]
    MissingConfig(String),

    /// Provider answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// Network or connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Provider answered 429.
    #[error("Rate limit exceeded (HTTP 429)")]
    RateLimitExceeded,

    /// Payload was not well-formed JSON/XML or did not match the expected shape.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Payload was well-formed but an adapter could not map it to postings.
    #[error("Normalization failed: {0}")]
    NormalizationError(String),

    /// Configuration file error.
    ///
    /// Occurs when reading or parsing `sources.toml` fails or contains invalid values.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic application error for cases not covered by specific variants.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::DatabaseError(e) => {
                if e.to_string().contains("connection") {
                    "Cannot connect to database. Is PostgreSQL running?\n   Check DATABASE_URL, then run `pomona migrate`.".to_string()
                } else {
                    format!("Database error: {}", e)
                }
            }
            AppError::SourceNotFound(slug) => {
                format!(
                    "Unknown source '{}'.\n   Run `pomona sources` to list configured sources.",
                    slug
                )
            }
            AppError::MissingConfig(what) => {
                format!(
                    "Missing configuration: {}\n   Set the variable in your environment or .env file.",
                    what
                )
            }
            AppError::HttpStatus { status, url } => match status {
                401 | 403 => format!(
                    "Provider rejected the credentials (HTTP {}): {}\n   Check the API key for this source.",
                    status, url
                ),
                _ => format!("Provider returned HTTP {}: {}", status, url),
            },
            AppError::NetworkError(msg) => {
                format!("Network error: {}\n   Check your internet connection.", msg)
            }
            AppError::Timeout(secs) => {
                format!(
                    "Request timed out after {} seconds.\n   The provider may be overloaded. Try again later.",
                    secs
                )
            }
            AppError::RateLimitExceeded => {
                "Too many requests. The provider is throttling this source.".to_string()
            }
            AppError::ConfigError(msg) => {
                format!(
                    "Configuration error: {}\n   Check your sources.toml file.",
                    msg
                )
            }
            _ => self.to_string(),
        }
    }

    /// Returns true if a later invocation could plausibly succeed without
    /// operator intervention.
    ///
    /// # Examples
    ///
    /// ```
    /// use pomona_core::error::AppError;
    ///
    /// assert!(AppError::Timeout(30).is_retryable());
    /// assert!(AppError::HttpStatus { status: 503, url: "https://x".into() }.is_retryable());
    /// assert!(!AppError::HttpStatus { status: 401, url: "https://x".into() }.is_retryable());
    /// assert!(!AppError::ParseError("bad".into()).is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_)
            | AppError::Timeout(_)
            | AppError::RateLimitExceeded
            | AppError::ClientError(_) => true,
            AppError::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
