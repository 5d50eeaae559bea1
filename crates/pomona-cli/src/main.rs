use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pomona_cli::{
    Command, Config, render_error, render_health, render_healing_report, render_rotation_pass,
    render_run_summary, render_runs, render_sources,
};
use pomona_client::{AdapterFactoryEnum, ReqwestFetcher};
use pomona_core::traits::HealthStore;
use pomona_core::{
    AdapterFactory, CoordinatorTrigger, DbConfig, FetchPlan, HealerConfig, HealerService,
    HttpConfig, IngestionConfig, IngestionService, RotationConfig, RotationService,
    RunCoordinator, RunStatus, Scheduler, SchedulerConfig, SourceAdapter, SourceRegistry,
    TracingReporter, filter_by_freshness, load_sources_config, persist_batch,
};
use pomona_db::PgStore;

type Coordinator = RunCoordinator<PgStore, AdapterFactoryEnum, ReqwestFetcher>;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", render_error(&err));
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!("Connecting to database...");
    let db_config = DbConfig::from_env();
    let store = PgStore::connect(&config.database_url, db_config.max_connections)
        .await
        .context("Failed to connect to database")?;

    match config.command {
        Command::Migrate => {
            pomona_db::migrate(store.pool())
                .await
                .context("Failed to apply schema")?;
            info!("Schema is up to date");
        }
        Command::Status { runs } => {
            show_status(&store, runs).await?;
        }
        Command::Sources => {
            let registry = load_registry(&store, config.config).await?;
            print!("{}", render_sources(&registry));
        }
        Command::Ingest { source, json } => {
            let registry = load_registry(&store, config.config).await?;
            let coordinator = build_coordinator(&store)?;
            ingest(&coordinator, &registry, source.as_deref(), json).await?;
        }
        Command::Heal { json } => {
            let mut registry = load_registry(&store, config.config).await?;
            let coordinator = build_coordinator(&store)?;
            let trigger = CoordinatorTrigger::new(coordinator, registry.clone());
            let healer =
                HealerService::new(store.clone(), trigger, store.clone(), HealerConfig::from_env());

            let report = healer.run_pass(&mut registry, Utc::now()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", render_healing_report(&report));
            }
        }
        Command::Rotate { platform } => {
            let registry = load_registry(&store, config.config).await?;
            rotate(&store, &registry, &platform).await?;
        }
        Command::Schedule {
            ingest_every,
            heal_every,
        } => {
            let registry = load_registry(&store, config.config).await?;
            let coordinator = build_coordinator(&store)?;
            let trigger = CoordinatorTrigger::new(coordinator.clone(), registry.clone());
            let healer =
                HealerService::new(store.clone(), trigger, store.clone(), HealerConfig::from_env());
            let scheduler = Scheduler::new(
                coordinator,
                healer,
                registry,
                SchedulerConfig {
                    ingest_every,
                    heal_every,
                },
            );

            let cancel_token = CancellationToken::new();
            tokio::spawn(shutdown_on_signal(cancel_token.clone()));
            scheduler.run(cancel_token, &TracingReporter).await?;
        }
    }

    Ok(())
}

/// Loads `sources.toml` and layers the stored operator overrides on top.
async fn load_registry(store: &PgStore, path: Option<PathBuf>) -> anyhow::Result<SourceRegistry> {
    let sources = load_sources_config(path)?.ok_or_else(|| {
        anyhow::anyhow!(
            "No configuration file found. Create ~/.config/pomona/sources.toml or use --config"
        )
    })?;
    let mut registry = SourceRegistry::new(sources)?;
    registry
        .refresh(store, Utc::now())
        .await
        .context("Failed to load source policy overrides")?;
    Ok(registry)
}

fn build_coordinator(store: &PgStore) -> anyhow::Result<Coordinator> {
    let fetcher = ReqwestFetcher::new(&HttpConfig::from_env())?;
    let ingestion = IngestionService::with_config(
        store.clone(),
        AdapterFactoryEnum::new(),
        fetcher,
        IngestionConfig::from_env(),
        RotationConfig::from_env(),
    );
    Ok(RunCoordinator::new(ingestion))
}

async fn ingest(
    coordinator: &Coordinator,
    registry: &SourceRegistry,
    source: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let summary = coordinator.run(registry, source, &TracingReporter).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", render_run_summary(&summary));
    }

    if summary.status == RunStatus::Failed {
        anyhow::bail!("every source in run {} failed", summary.run_id);
    }
    Ok(())
}

/// Runs one rotation pass outside a regular ingestion run. Postings go through
/// the same freshness filter and upsert; source health is left untouched.
async fn rotate(store: &PgStore, registry: &SourceRegistry, platform: &str) -> anyhow::Result<()> {
    let factory = AdapterFactoryEnum::new();
    let mut found = None;
    for entry in registry.entries() {
        let adapter = factory.create(entry)?;
        if let FetchPlan::Companies { platform: p } = adapter.plan()
            && p.eq_ignore_ascii_case(platform)
        {
            found = Some((entry, adapter, p));
            break;
        }
    }
    let (entry, adapter, platform) = found.ok_or_else(|| {
        anyhow::anyhow!("No configured source uses the '{}' platform", platform)
    })?;

    let policy = registry.policy(entry);
    let fetcher = ReqwestFetcher::new(&HttpConfig::from_env())?;
    let rotation = RotationService::new(store.clone(), fetcher, RotationConfig::from_env());

    let now = Utc::now();
    rotation.seed(platform, &entry.companies).await?;
    let mut pass = rotation.run_pass(&adapter, platform, now).await?;

    let fresh = filter_by_freshness(std::mem::take(&mut pass.jobs), policy.max_age_days, now);
    let outcome = persist_batch(store, fresh.fresh, policy.trust_level).await?;
    info!(
        source = %entry.slug,
        platform,
        inserted = outcome.inserted,
        stale = fresh.stale_count,
        "Rotation pass persisted"
    );

    print!("{}", render_rotation_pass(platform, &pass, outcome.inserted));
    Ok(())
}

async fn show_status(store: &PgStore, runs: usize) -> anyhow::Result<()> {
    let health = store.list_health().await?;
    println!("\nSource health\n");
    print!("{}", render_health(&health));

    if runs > 0 {
        let recent = store.recent_runs(runs).await?;
        println!("\nRecent runs\n");
        print!("{}", render_runs(&recent));
    }

    let counts = store.posting_counts().await?;
    if !counts.is_empty() {
        println!("\nStored postings\n");
        for row in counts {
            println!("  {:<22} {:>8}", row.source_slug, row.postings);
        }
    }
    println!();
    Ok(())
}

/// Cancels the scheduler on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not install SIGTERM handler, using Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutdown requested, stopping after the current invocation");
    token.cancel();
}
