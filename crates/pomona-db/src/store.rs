//! PostgreSQL store shared by every repository impl.

use chrono::{DateTime, Utc};
use pomona_core::error::AppError;
use pomona_core::run::IngestionRun;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Pool, Postgres};

use crate::runs::{RUN_COLUMNS, RunRow};

/// PostgreSQL implementation of every Pomona store trait.
///
/// The trait impls live next to the tables they own (`cursor`, `runs`,
/// `health`, `postings`, `policy`, `targets`, `healing`); this type only holds
/// the pool and the operator queries used by the CLI.
///
/// # Examples
///
/// ```no_run
/// use pomona_db::PgStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PgStore::connect("postgresql://localhost/pomona", 5).await?;
/// pomona_db::migrate(store.pool()).await?;
/// store.health_check().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PgStore {
    pub(crate) pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(AppError::DatabaseError)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Checks database connectivity by executing a simple query.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;
        Ok(())
    }

    /// Most recent runs, newest first.
    pub async fn recent_runs(&self, limit: usize) -> Result<Vec<IngestionRun>, AppError> {
        let query = format!(
            "SELECT {} FROM ingestion_runs ORDER BY started_at DESC LIMIT $1",
            RUN_COLUMNS
        );
        let rows: Vec<RunRow> = sqlx::query_as(&query)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        rows.into_iter().map(IngestionRun::try_from).collect()
    }

    /// Posting totals per source, with the most recent sighting.
    pub async fn posting_counts(&self) -> Result<Vec<PostingCount>, AppError> {
        let rows: Vec<PostingCount> = sqlx::query_as(
            r#"
            SELECT source_slug, COUNT(*) AS postings, MAX(last_seen_at) AS last_seen_at
            FROM job_postings
            GROUP BY source_slug
            ORDER BY source_slug
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows)
    }
}

/// Row of [`PgStore::posting_counts`].
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct PostingCount {
    pub source_slug: String,
    pub postings: i64,
    pub last_seen_at: Option<DateTime<Utc>>,
}
