//! Pomona Core - Domain types, business logic, and services.
//!
//! This crate provides the core functionality for Pomona, a job-posting
//! ingestion orchestrator:
//!
//! - **Domain models**: [`NormalizedJob`], [`IngestionCursor`], [`SourceHealth`], [`CompanyTarget`]
//! - **Business logic**: freshness filtering, in-batch dedup, enrichment, failure classification
//! - **Services**: [`IngestionService`] for the per-source loop, [`RunCoordinator`] for whole
//!   runs, [`HealerService`] for auto-healing, [`RotationService`] for company boards
//! - **Traits**: [`SourceAdapter`], [`HttpFetcher`] and the store traits for dependency injection
//! - **Progress reporting**: [`ProgressReporter`] trait for decoupled logging/UI
//!
//! # Architecture
//!
//! This crate is designed to be reusable by different frontends (CLI, daemon, tests).
//! Business logic is decoupled from I/O concerns through traits:
//!
//! - [`SourceAdapter`] / [`AdapterFactory`] - per-provider request building and normalization
//! - [`HttpFetcher`] - outbound HTTP (e.g., reqwest)
//! - [`IngestionStore`], [`HealerStore`] - persistence (e.g., PostgreSQL)
//! - [`CredentialProvider`] - secrets lookup
//!
//! # Example
//!
//! ```ignore
//! use pomona_core::{IngestionService, RunCoordinator, SourceRegistry, TracingReporter};
//!
//! let ingestion = IngestionService::new(store, factory, fetcher);
//! let coordinator = RunCoordinator::new(ingestion);
//! let registry = SourceRegistry::new(config)?;
//!
//! let summary = coordinator.run(&registry, None, &TracingReporter).await?;
//! println!("{} new postings", summary.totals.inserted);
//! ```

pub mod adapter;
pub mod config;
pub mod coordinator;
pub mod credentials;
pub mod cursor;
pub mod dedup;
pub mod enrichment;
pub mod error;
pub mod freshness;
pub mod healer;
pub mod health;
pub mod ingestion;
pub mod models;
pub mod progress;
pub mod registry;
pub mod rotation;
pub mod run;
pub mod scheduler;
pub mod traits;
pub mod upsert;

// Adapters
pub use adapter::{
    AdapterFactory, FetchPlan, FetchRequest, FetchResponse, Headers, HttpMethod, PayloadOrigin,
    RawPayload, SourceAdapter,
};

// Configuration
pub use config::{
    AdapterKind, DbConfig, HealerConfig, HttpConfig, IngestionConfig, PolicyMode,
    RotationConfig, SourceEntry, SourcePolicy, SourcesConfig, TrustLevel, default_config_path,
    load_sources_config,
};

// Credentials
pub use credentials::{CredentialProvider, EnvCredentials, StaticCredentials};

// Error handling
pub use error::AppError;

// Domain models
pub use cursor::{IngestionCursor, IngestionState};
pub use health::{HealthUpdate, SourceHealth};
pub use models::{EducationLevel, EnrichedJob, JobEnrichment, NormalizedJob, Seniority};
pub use run::{
    IngestionCounts, IngestionRun, RunStatus, RunSummary, RunTotals, SkipReason, SourceResult,
    SourceRunRecord, SourceRunStatus,
};

// Pure business logic
pub use dedup::dedupe_batch;
pub use enrichment::enrich;
pub use freshness::{FreshnessOutcome, filter_by_freshness, parse_posted_date};
pub use upsert::{UpsertOutcome, persist_batch};

// Registry
pub use registry::{PolicyCache, PolicyOverride, RegisteredSource, SourceRegistry};

// Services
pub use coordinator::{CoordinatorTrigger, RunCoordinator};
pub use healer::{
    Alert, AlertSeverity, FailureType, HealerService, HealingAction, HealingAttempt,
    HealingReport, HealingResult, TracingAlertSink, classify_failure, decide_action,
};
pub use ingestion::IngestionService;
pub use rotation::{
    CompanyTarget, RotationPass, RotationService, TargetOutcome, TargetStatus, cooling_window,
};
pub use scheduler::{Scheduler, SchedulerConfig};

// Progress reporting
pub use progress::{IngestionEvent, ProgressReporter, SilentReporter, TracingReporter};

// Traits
pub use traits::{
    AlertSink, CompanyTargetStore, CursorStore, HealerStore, HealingStore, HealthStore,
    HttpFetcher, IngestionStore, IngestionTrigger, PolicyStore, PostingStore, RunStore,
};
