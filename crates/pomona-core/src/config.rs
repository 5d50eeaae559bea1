//! Configuration types for Pomona components.
//!
//! Two layers live here:
//!
//! - runtime tunables (`IngestionConfig`, `HealerConfig`, `RotationConfig`,
//!   `HttpConfig`, `DbConfig`), each with defaults, `with_*` builders and a
//!   `from_env()` reader;
//! - the source catalog (`sources.toml`), parsed into [`SourcesConfig`].

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// =============================================================================
// Runtime Tunables
// =============================================================================

/// Database connection pool configuration.
pub struct DbConfig {
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self { max_connections: 5 }
    }
}

impl DbConfig {
    /// Reads `DB_MAX_CONNECTIONS`, falling back to the default.
    pub fn from_env() -> Self {
        Self {
            max_connections: env_or("DB_MAX_CONNECTIONS", 5),
        }
    }
}

/// HTTP client configuration for provider calls.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub user_agent: String,
    /// Extra attempts for transient failures (timeouts, 5xx, 429) within one fetch.
    pub max_retries: u32,
    /// Delay before the first retry; later retries wait proportionally longer.
    pub retry_base_delay: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("pomona/{}", env!("CARGO_PKG_VERSION")),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

impl HttpConfig {
    /// Reads `HTTP_TIMEOUT_SECS` and `HTTP_MAX_RETRIES`, falling back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout: Duration::from_secs(env_or("HTTP_TIMEOUT_SECS", 30)),
            max_retries: env_or("HTTP_MAX_RETRIES", defaults.max_retries),
            ..defaults
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self
    }
}

/// Run coordinator and per-source loop configuration.
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Number of sources executed concurrently in one group.
    pub group_size: usize,
    /// Wall-clock budget for a whole invocation. Loops stop between pages once
    /// it has elapsed.
    pub time_budget: Duration,
    /// Maximum number of feeds fetched concurrently for feed-style sources.
    pub feed_concurrency: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            group_size: 3,
            time_budget: Duration::from_secs(270),
            feed_concurrency: 4,
        }
    }
}

impl IngestionConfig {
    /// Reads `INGEST_GROUP_SIZE`, `INGEST_TIME_BUDGET_SECS` and
    /// `INGEST_FEED_CONCURRENCY`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            group_size: env_or("INGEST_GROUP_SIZE", defaults.group_size).max(1),
            time_budget: Duration::from_secs(env_or(
                "INGEST_TIME_BUDGET_SECS",
                defaults.time_budget.as_secs(),
            )),
            feed_concurrency: env_or("INGEST_FEED_CONCURRENCY", defaults.feed_concurrency)
                .max(1),
        }
    }

    pub fn with_group_size(mut self, size: usize) -> Self {
        self.group_size = size.max(1);
        self
    }

    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = budget;
        self
    }
}

/// Auto-healing control loop configuration.
#[derive(Debug, Clone)]
pub struct HealerConfig {
    /// Runs left in `running` longer than this are reaped.
    pub stuck_run_threshold: TimeDelta,
    /// Consecutive failures at which a source is disabled.
    pub disable_threshold: u32,
    /// Healing attempts per source per day before escalating.
    pub max_attempts_24h: u32,
}

impl Default for HealerConfig {
    fn default() -> Self {
        Self {
            stuck_run_threshold: TimeDelta::minutes(15),
            disable_threshold: 5,
            max_attempts_24h: 3,
        }
    }
}

impl HealerConfig {
    /// Reads `HEAL_STUCK_MINUTES`, `HEAL_DISABLE_THRESHOLD` and `HEAL_MAX_ATTEMPTS`.
    pub fn from_env() -> Self {
        Self {
            stuck_run_threshold: TimeDelta::minutes(i64::from(env_or::<u32>(
                "HEAL_STUCK_MINUTES",
                15,
            ))),
            disable_threshold: env_or("HEAL_DISABLE_THRESHOLD", 5),
            max_attempts_24h: env_or("HEAL_MAX_ATTEMPTS", 3),
        }
    }

    pub fn with_stuck_run_threshold(mut self, threshold: TimeDelta) -> Self {
        self.stuck_run_threshold = threshold;
        self
    }

    pub fn with_disable_threshold(mut self, threshold: u32) -> Self {
        self.disable_threshold = threshold.max(1);
        self
    }
}

/// Company-target rotation configuration.
#[derive(Debug, Clone)]
pub struct RotationConfig {
    /// Targets selected per pass.
    pub batch_size: usize,
    /// Concurrent fetch workers.
    pub workers: usize,
    /// Requests allowed per rolling minute across all workers.
    pub requests_per_minute: u32,
    /// Consecutive empty runs before a target starts cooling.
    pub cooling_threshold: u32,
    /// Cooling window at the threshold; doubles for every further empty run.
    pub base_cooldown: TimeDelta,
    /// Upper bound on the cooling window.
    pub max_cooldown: TimeDelta,
    /// Weight of the newest observation in the velocity moving average.
    pub velocity_smoothing: f64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            workers: 4,
            requests_per_minute: 60,
            cooling_threshold: 3,
            base_cooldown: TimeDelta::hours(24),
            max_cooldown: TimeDelta::days(14),
            velocity_smoothing: 0.3,
        }
    }
}

impl RotationConfig {
    /// Reads `ROTATION_BATCH_SIZE`, `ROTATION_WORKERS` and
    /// `ROTATION_REQUESTS_PER_MINUTE`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: env_or("ROTATION_BATCH_SIZE", defaults.batch_size).max(1),
            workers: env_or("ROTATION_WORKERS", defaults.workers).max(1),
            requests_per_minute: env_or(
                "ROTATION_REQUESTS_PER_MINUTE",
                defaults.requests_per_minute,
            )
            .max(1),
            ..defaults
        }
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_requests_per_minute(mut self, rpm: u32) -> Self {
        self.requests_per_minute = rpm.max(1);
        self
    }
}

// =============================================================================
// Source Policy
// =============================================================================

/// Operating mode of a source. Supplies defaults for every policy field the
/// source entry leaves out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyMode {
    /// Only the newest postings matter; always restart from page 1.
    FreshOnly,
    /// A couple of pages of a curated listing per run.
    ShallowCurated,
    /// Walk deep listings across runs, capped per run.
    #[default]
    WideCapped,
}

impl PolicyMode {
    pub fn default_max_age_days(&self) -> u32 {
        match self {
            Self::FreshOnly => 3,
            Self::ShallowCurated => 14,
            Self::WideCapped => 30,
        }
    }

    pub fn default_max_pages(&self) -> u32 {
        match self {
            Self::FreshOnly => 3,
            Self::ShallowCurated => 2,
            Self::WideCapped => 10,
        }
    }

    pub fn default_reset_each_run(&self) -> bool {
        !matches!(self, Self::WideCapped)
    }
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FreshOnly => write!(f, "fresh-only"),
            Self::ShallowCurated => write!(f, "shallow-curated"),
            Self::WideCapped => write!(f, "wide-capped"),
        }
    }
}

/// How much a source's postings are trusted downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl TrustLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully resolved operating policy for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourcePolicy {
    pub mode: PolicyMode,
    pub enabled: bool,
    pub max_age_days: u32,
    pub max_pages_per_run: u32,
    /// Overrides the adapter's page size for last-page detection.
    pub expected_page_size: Option<usize>,
    pub reset_pagination_each_run: bool,
    pub cooldown_minutes: Option<u32>,
    pub trust_level: TrustLevel,
}

// =============================================================================
// Source Catalog (sources.toml)
// =============================================================================

/// Adapter implementation backing a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    Adzuna,
    Jooble,
    UsaJobs,
    Reed,
    TheMuse,
    TheirStack,
    Rss,
    Greenhouse,
    Lever,
}

impl AdapterKind {
    pub const ALL: [AdapterKind; 9] = [
        Self::Adzuna,
        Self::Jooble,
        Self::UsaJobs,
        Self::Reed,
        Self::TheMuse,
        Self::TheirStack,
        Self::Rss,
        Self::Greenhouse,
        Self::Lever,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Adzuna => "adzuna",
            Self::Jooble => "jooble",
            Self::UsaJobs => "usajobs",
            Self::Reed => "reed",
            Self::TheMuse => "themuse",
            Self::TheirStack => "theirstack",
            Self::Rss => "rss",
            Self::Greenhouse => "greenhouse",
            Self::Lever => "lever",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdapterKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::ALL.iter().map(|k| k.as_str()).collect();
                AppError::ConfigError(format!(
                    "Unknown adapter: '{}'. Valid options: {}",
                    s,
                    valid.join(", ")
                ))
            })
    }
}

fn default_enabled() -> bool {
    true
}

/// Root configuration structure for sources.toml.
///
/// # Example
///
/// ```toml
/// [[sources]]
/// slug = "adzuna-gb"
/// name = "Adzuna (UK)"
/// adapter = "adzuna"
/// mode = "wide-capped"
/// max_pages_per_run = 5
/// cooldown_minutes = 60
/// params = { country = "gb", what = "software engineer" }
///
/// [[sources]]
/// slug = "greenhouse"
/// name = "Greenhouse boards"
/// adapter = "greenhouse"
/// companies = ["stripe", "figma"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
}

impl SourcesConfig {
    /// Returns entries enabled in the file. Operator overrides are applied by
    /// the registry, not here.
    pub fn enabled_sources(&self) -> Vec<&SourceEntry> {
        self.sources.iter().filter(|s| s.enabled).collect()
    }

    /// Find a source by slug (case-insensitive).
    pub fn find_by_slug(&self, slug: &str) -> Option<&SourceEntry> {
        self.sources
            .iter()
            .find(|s| s.slug.eq_ignore_ascii_case(slug))
    }

    /// Rejects duplicate slugs, which would share cursor and health rows.
    pub fn validate(&self) -> Result<(), AppError> {
        let mut seen = std::collections::HashSet::new();
        for entry in &self.sources {
            if entry.slug.trim().is_empty() {
                return Err(AppError::ConfigError(format!(
                    "Source '{}' has an empty slug",
                    entry.name
                )));
            }
            if !seen.insert(entry.slug.to_lowercase()) {
                return Err(AppError::ConfigError(format!(
                    "Duplicate source slug: '{}'",
                    entry.slug
                )));
            }
        }
        Ok(())
    }
}

/// A single source entry in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    /// Stable identifier; keys cursor, health and posting rows.
    pub slug: String,

    /// Human-readable name used in logs and reports.
    pub name: String,

    pub adapter: AdapterKind,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub mode: PolicyMode,

    pub max_age_days: Option<u32>,
    pub max_pages_per_run: Option<u32>,
    pub expected_page_size: Option<usize>,
    pub reset_pagination_each_run: Option<bool>,
    pub cooldown_minutes: Option<u32>,

    #[serde(default)]
    pub trust_level: TrustLevel,

    /// Overrides the adapter's default API host.
    pub base_url: Option<String>,

    /// Adapter-specific query settings (search terms, country, ...).
    #[serde(default)]
    pub params: BTreeMap<String, String>,

    /// Feed URLs for feed-style sources.
    #[serde(default)]
    pub feeds: Vec<String>,

    /// Company board slugs seeded into the rotation queue.
    #[serde(default)]
    pub companies: Vec<String>,

    pub description: Option<String>,
}

impl SourceEntry {
    /// Resolves the policy from the entry's explicit values and its mode's
    /// defaults.
    pub fn policy(&self) -> SourcePolicy {
        SourcePolicy {
            mode: self.mode,
            enabled: self.enabled,
            max_age_days: self
                .max_age_days
                .unwrap_or_else(|| self.mode.default_max_age_days()),
            max_pages_per_run: self
                .max_pages_per_run
                .unwrap_or_else(|| self.mode.default_max_pages())
                .max(1),
            expected_page_size: self.expected_page_size,
            reset_pagination_each_run: self
                .reset_pagination_each_run
                .unwrap_or_else(|| self.mode.default_reset_each_run()),
            cooldown_minutes: self.cooldown_minutes,
            trust_level: self.trust_level,
        }
    }

    /// Looks up an adapter parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "sources.toml";

/// Returns the default configuration directory path: `~/.config/pomona/`.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("pomona"))
}

/// Returns the default configuration file path: `~/.config/pomona/sources.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join(CONFIG_FILE_NAME))
}

const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Pomona Source Configuration
#
# Usage:
#   pomona ingest                  # Run all enabled sources
#   pomona ingest --source <slug>  # Run one source
#
# Policy fields left out take the defaults of `mode`:
#   fresh-only       max_age_days = 3,  max_pages_per_run = 3,  reset each run
#   shallow-curated  max_age_days = 14, max_pages_per_run = 2,  reset each run
#   wide-capped      max_age_days = 30, max_pages_per_run = 10, resume across runs
#
# Credentials are read from the environment (see each adapter's variables).

# Public board, no credentials required
[[sources]]
slug = "themuse"
name = "The Muse"
adapter = "themuse"
mode = "shallow-curated"
params = { category = "Software Engineering" }

# Remote-job RSS feeds
[[sources]]
slug = "remote-feeds"
name = "Remote job feeds"
adapter = "rss"
mode = "fresh-only"
feeds = ["https://weworkremotely.com/categories/remote-programming-jobs.rss"]

# Greenhouse boards, one request per company
[[sources]]
slug = "greenhouse"
name = "Greenhouse boards"
adapter = "greenhouse"
mode = "fresh-only"
max_age_days = 14
companies = ["gitlab", "figma"]

# Requires ADZUNA_APP_ID and ADZUNA_APP_KEY
[[sources]]
slug = "adzuna-gb"
name = "Adzuna (UK)"
adapter = "adzuna"
mode = "wide-capped"
max_pages_per_run = 5
cooldown_minutes = 60
params = { country = "gb", what = "software engineer" }
"#;

/// Load source configuration from a TOML file.
///
/// # Returns
/// * `Ok(Some(config))` - Configuration loaded successfully
/// * `Ok(None)` - No configuration file could be located or created
/// * `Err(e)` - Configuration file exists but is invalid
///
/// # Behavior
/// If no configuration file exists at the default path, a template file
/// is created to help users get started.
pub fn load_sources_config(path: Option<PathBuf>) -> Result<Option<SourcesConfig>, AppError> {
    let using_default_path = path.is_none();
    let config_path = match path {
        Some(p) => p,
        None => match default_config_path() {
            Some(p) => p,
            None => return Ok(None),
        },
    };

    if !config_path.exists() {
        if using_default_path {
            if let Err(e) = create_default_config(&config_path) {
                tracing::warn!("Could not create default config template: {}", e);
                return Ok(None);
            }
        } else {
            return Err(AppError::ConfigError(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }
    }

    let content = std::fs::read_to_string(&config_path).map_err(|e| {
        AppError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            config_path.display(),
            e
        ))
    })?;

    let config: SourcesConfig = toml::from_str(&content).map_err(|e| {
        AppError::ConfigError(format!(
            "Invalid TOML in '{}': {}",
            config_path.display(),
            e
        ))
    })?;
    config.validate()?;

    Ok(Some(config))
}

fn create_default_config(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;
    tracing::info!("Created default config template at: {}", path.display());

    Ok(())
}
