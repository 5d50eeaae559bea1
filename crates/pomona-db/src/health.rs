//! `source_health` table.
//!
//! Outcomes are applied in a single `INSERT ... ON CONFLICT` so the failure
//! counter increments atomically even when two invocations overlap.

use chrono::{DateTime, Utc};
use pomona_core::error::AppError;
use pomona_core::health::{HealthUpdate, SourceHealth};
use pomona_core::run::IngestionCounts;
use pomona_core::traits::HealthStore;
use sqlx::types::Json;

use crate::store::PgStore;

const HEALTH_COLUMNS: &str = "source, last_run_at, last_success_at, last_error_at, last_error, consecutive_failures, last_counts, is_degraded, heal_attempts_24h, last_heal_attempt_at";

#[derive(sqlx::FromRow)]
struct HealthRow {
    source: String,
    last_run_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    last_error_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    consecutive_failures: i32,
    last_counts: Json<IngestionCounts>,
    is_degraded: bool,
    heal_attempts_24h: i32,
    last_heal_attempt_at: Option<DateTime<Utc>>,
}

impl From<HealthRow> for SourceHealth {
    fn from(row: HealthRow) -> Self {
        Self {
            source: row.source,
            last_run_at: row.last_run_at,
            last_success_at: row.last_success_at,
            last_error_at: row.last_error_at,
            last_error: row.last_error,
            consecutive_failures: row.consecutive_failures.max(0) as u32,
            last_counts: row.last_counts.0,
            is_degraded: row.is_degraded,
            heal_attempts_24h: row.heal_attempts_24h.max(0) as u32,
            last_heal_attempt_at: row.last_heal_attempt_at,
        }
    }
}

impl PgStore {
    async fn query_health(
        &self,
        filter: &str,
        source: Option<&str>,
    ) -> Result<Vec<SourceHealth>, AppError> {
        let query = format!("SELECT {} FROM source_health {}", HEALTH_COLUMNS, filter);
        let mut q = sqlx::query_as::<_, HealthRow>(&query);
        if let Some(source) = source {
            q = q.bind(source);
        }
        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;
        Ok(rows.into_iter().map(SourceHealth::from).collect())
    }
}

impl HealthStore for PgStore {
    async fn get_health(&self, source: &str) -> Result<Option<SourceHealth>, AppError> {
        let mut rows = self
            .query_health("WHERE source = $1", Some(source))
            .await?;
        Ok(rows.pop())
    }

    async fn record_outcome(&self, source: &str, update: &HealthUpdate) -> Result<(), AppError> {
        let query = match update {
            HealthUpdate::Success { at, counts } => sqlx::query(
                r#"
                INSERT INTO source_health (
                    source, last_run_at, last_success_at, consecutive_failures,
                    last_counts, is_degraded, updated_at
                )
                VALUES ($1, $2, $2, 0, $3, FALSE, NOW())
                ON CONFLICT (source)
                DO UPDATE SET
                    last_run_at = EXCLUDED.last_run_at,
                    last_success_at = EXCLUDED.last_success_at,
                    consecutive_failures = 0,
                    last_counts = EXCLUDED.last_counts,
                    is_degraded = FALSE,
                    updated_at = NOW()
                "#,
            )
            .bind(source)
            .bind(*at)
            .bind(Json(*counts)),
            HealthUpdate::Failure { at, error, counts } => sqlx::query(
                r#"
                INSERT INTO source_health (
                    source, last_run_at, last_error_at, last_error, consecutive_failures,
                    last_counts, is_degraded, updated_at
                )
                VALUES ($1, $2, $2, $3, 1, $4, TRUE, NOW())
                ON CONFLICT (source)
                DO UPDATE SET
                    last_run_at = EXCLUDED.last_run_at,
                    last_error_at = EXCLUDED.last_error_at,
                    last_error = EXCLUDED.last_error,
                    consecutive_failures = source_health.consecutive_failures + 1,
                    last_counts = EXCLUDED.last_counts,
                    is_degraded = TRUE,
                    updated_at = NOW()
                "#,
            )
            .bind(source)
            .bind(*at)
            .bind(error.as_str())
            .bind(Json(*counts)),
        };

        query
            .execute(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;
        Ok(())
    }

    async fn list_health(&self) -> Result<Vec<SourceHealth>, AppError> {
        self.query_health("ORDER BY source", None).await
    }

    async fn list_degraded(&self) -> Result<Vec<SourceHealth>, AppError> {
        self.query_health(
            "WHERE is_degraded ORDER BY consecutive_failures DESC, source",
            None,
        )
        .await
    }

    async fn record_heal_attempt(&self, source: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO source_health (source, heal_attempts_24h, last_heal_attempt_at, updated_at)
            VALUES ($1, 1, $2, NOW())
            ON CONFLICT (source)
            DO UPDATE SET
                heal_attempts_24h = source_health.heal_attempts_24h + 1,
                last_heal_attempt_at = EXCLUDED.last_heal_attempt_at,
                updated_at = NOW()
            "#,
        )
        .bind(source)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;
        Ok(())
    }

    async fn reset_heal_attempts(&self, boundary: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE source_health
            SET heal_attempts_24h = 0, updated_at = NOW()
            WHERE heal_attempts_24h > 0
              AND (last_heal_attempt_at IS NULL OR last_heal_attempt_at < $1)
            "#,
        )
        .bind(boundary)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(result.rows_affected())
    }
}
