use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

static VERSION_INFO: LazyLock<String> = LazyLock::new(|| {
    let version = env!("CARGO_PKG_VERSION");

    // Use VERGEN_GIT_SHA for the commit hash (with safe slicing)
    let commit = option_env!("VERGEN_GIT_SHA")
        .map(|s| s.chars().take(7).collect::<String>())
        .unwrap_or_else(|| "unknown".to_string());

    let built = option_env!("VERGEN_BUILD_DATE").unwrap_or("unknown"); // YYYY-MM-DD
    let target = option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown");
    let rustc = option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown");

    format!("{version}\ncommit: {commit}\nbuilt: {built}\ntarget: {target}\nrustc: {rustc}")
});

pub fn version_info() -> &'static str {
    &VERSION_INFO
}

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "pomona")]
#[command(
    author,
    version = version_info(),
    about = "Job-posting ingestion orchestrator with resumable sources and self-healing"
)]
#[command(after_help = "Examples:
  pomona migrate
  pomona ingest
  pomona ingest adzuna-gb --json
  pomona heal
  pomona schedule --ingest-every 1h --heal-every 15m

Tunables are read from the environment:
  INGEST_GROUP_SIZE, INGEST_TIME_BUDGET_SECS, HEAL_DISABLE_THRESHOLD,
  ROTATION_WORKERS, ROTATION_REQUESTS_PER_MINUTE, HTTP_TIMEOUT_SECS, ...")]
pub struct Config {
    /// PostgreSQL database connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Custom path to sources.toml (default: ~/.config/pomona/sources.toml)
    #[arg(short, long, global = true, value_name = "PATH", env = "POMONA_SOURCES")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one ingestion invocation
    #[command(after_help = "Examples:
  pomona ingest                     # Every enabled source
  pomona ingest reed                # One source, even if disabled
  pomona ingest --json > run.json   # Machine-readable summary")]
    Ingest {
        /// Slug of a single source to run
        #[arg(value_name = "SLUG")]
        source: Option<String>,

        /// Print the run summary as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Run one healer pass over degraded sources and stuck runs
    Heal {
        /// Print the healing report as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Run a standalone rotation pass for a company-board platform
    #[command(after_help = "Example: pomona rotate greenhouse")]
    Rotate {
        /// Platform name, matching the adapter of a configured source
        platform: String,
    },
    /// Show per-source health
    Status {
        /// Also list the most recent runs
        #[arg(long, default_value = "5")]
        runs: usize,
    },
    /// List configured sources with their resolved policies
    Sources,
    /// Run ingestion and healing on timers until interrupted
    #[command(after_help = "Durations accept s, m, h and d suffixes, e.g. 90s, 15m, 1h.")]
    Schedule {
        /// Interval between ingestion runs
        #[arg(long, default_value = "1h", value_parser = parse_duration)]
        ingest_every: Duration,

        /// Interval between healer passes
        #[arg(long, default_value = "15m", value_parser = parse_duration)]
        heal_every: Duration,
    },
    /// Create or update the database schema
    Migrate,
}

/// Parses `90s`, `15m`, `1h`, `2d`, or a bare number of seconds.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    let amount: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{}'", value))?;

    let seconds = match unit {
        "" | "s" => amount,
        "m" => amount * 60,
        "h" => amount * 60 * 60,
        "d" => amount * 24 * 60 * 60,
        other => return Err(format!("unknown duration unit '{}'", other)),
    };
    if seconds == 0 {
        return Err("duration must be greater than zero".to_string());
    }
    Ok(Duration::from_secs(seconds))
}
