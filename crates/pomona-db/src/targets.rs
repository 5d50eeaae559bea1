//! `company_targets` table: the rotation queue for ATS boards.

use chrono::{DateTime, Utc};
use pomona_core::error::AppError;
use pomona_core::rotation::{CompanyTarget, TargetStatus};
use pomona_core::traits::CompanyTargetStore;

use crate::store::PgStore;

#[derive(sqlx::FromRow)]
struct TargetRow {
    platform: String,
    company_slug: String,
    company_id: Option<String>,
    consecutive_empty_runs: i32,
    last_attempt_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    last_jobs_found: i32,
    velocity: f64,
    cooling_until: Option<DateTime<Utc>>,
    last_error: Option<String>,
    status: String,
}

impl From<TargetRow> for CompanyTarget {
    fn from(row: TargetRow) -> Self {
        Self {
            company_slug: row.company_slug,
            platform: row.platform,
            company_id: row.company_id,
            consecutive_empty_runs: row.consecutive_empty_runs.max(0) as u32,
            last_attempt_at: row.last_attempt_at,
            last_success_at: row.last_success_at,
            last_jobs_found: row.last_jobs_found.max(0) as u32,
            velocity: row.velocity,
            cooling_until: row.cooling_until,
            last_error: row.last_error,
            status: row.status.parse().unwrap_or(TargetStatus::Active),
        }
    }
}

impl CompanyTargetStore for PgStore {
    async fn ensure_targets(&self, targets: &[CompanyTarget]) -> Result<usize, AppError> {
        if targets.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(AppError::DatabaseError)?;
        let mut created = 0u64;
        for target in targets {
            let result = sqlx::query(
                r#"
                INSERT INTO company_targets (platform, company_slug, company_id, status)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (platform, company_slug) DO NOTHING
                "#,
            )
            .bind(&target.platform)
            .bind(&target.company_slug)
            .bind(&target.company_id)
            .bind(target.status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(AppError::DatabaseError)?;
            created += result.rows_affected();
        }
        tx.commit().await.map_err(AppError::DatabaseError)?;

        Ok(created as usize)
    }

    async fn select_targets(
        &self,
        platform: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<CompanyTarget>, AppError> {
        let rows: Vec<TargetRow> = sqlx::query_as(
            r#"
            SELECT platform, company_slug, company_id, consecutive_empty_runs, last_attempt_at,
                   last_success_at, last_jobs_found, velocity, cooling_until, last_error, status
            FROM company_targets
            WHERE platform = $1
              AND (cooling_until IS NULL OR cooling_until <= $2)
            ORDER BY velocity DESC, last_attempt_at ASC NULLS FIRST, company_slug
            LIMIT $3
            "#,
        )
        .bind(platform)
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows.into_iter().map(CompanyTarget::from).collect())
    }

    async fn save_target(&self, target: &CompanyTarget) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO company_targets (
                platform, company_slug, company_id, consecutive_empty_runs, last_attempt_at,
                last_success_at, last_jobs_found, velocity, cooling_until, last_error, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (platform, company_slug)
            DO UPDATE SET
                company_id = EXCLUDED.company_id,
                consecutive_empty_runs = EXCLUDED.consecutive_empty_runs,
                last_attempt_at = EXCLUDED.last_attempt_at,
                last_success_at = EXCLUDED.last_success_at,
                last_jobs_found = EXCLUDED.last_jobs_found,
                velocity = EXCLUDED.velocity,
                cooling_until = EXCLUDED.cooling_until,
                last_error = EXCLUDED.last_error,
                status = EXCLUDED.status
            "#,
        )
        .bind(&target.platform)
        .bind(&target.company_slug)
        .bind(&target.company_id)
        .bind(i32::try_from(target.consecutive_empty_runs).unwrap_or(i32::MAX))
        .bind(target.last_attempt_at)
        .bind(target.last_success_at)
        .bind(i32::try_from(target.last_jobs_found).unwrap_or(i32::MAX))
        .bind(target.velocity)
        .bind(target.cooling_until)
        .bind(&target.last_error)
        .bind(target.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(())
    }
}

impl PgStore {
    /// Every target of a platform, for operator listings.
    pub async fn list_targets(&self, platform: &str) -> Result<Vec<CompanyTarget>, AppError> {
        let rows: Vec<TargetRow> = sqlx::query_as(
            r#"
            SELECT platform, company_slug, company_id, consecutive_empty_runs, last_attempt_at,
                   last_success_at, last_jobs_found, velocity, cooling_until, last_error, status
            FROM company_targets
            WHERE platform = $1
            ORDER BY velocity DESC, company_slug
            "#,
        )
        .bind(platform)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows.into_iter().map(CompanyTarget::from).collect())
    }
}
