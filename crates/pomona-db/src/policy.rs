//! `source_policy_overrides` table.

use chrono::{DateTime, Utc};
use pomona_core::error::AppError;
use pomona_core::registry::PolicyOverride;
use pomona_core::traits::PolicyStore;

use crate::store::PgStore;

#[derive(sqlx::FromRow)]
struct OverrideRow {
    source: String,
    enabled: Option<bool>,
    max_pages_per_run: Option<i32>,
    max_age_days: Option<i32>,
    cooldown_minutes: Option<i32>,
    reason: Option<String>,
    updated_at: DateTime<Utc>,
}

fn non_negative(value: Option<i32>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

impl From<OverrideRow> for PolicyOverride {
    fn from(row: OverrideRow) -> Self {
        Self {
            source: row.source,
            enabled: row.enabled,
            max_pages_per_run: non_negative(row.max_pages_per_run),
            max_age_days: non_negative(row.max_age_days),
            cooldown_minutes: non_negative(row.cooldown_minutes),
            reason: row.reason,
            updated_at: Some(row.updated_at),
        }
    }
}

impl PolicyStore for PgStore {
    async fn load_overrides(&self) -> Result<Vec<PolicyOverride>, AppError> {
        let rows: Vec<OverrideRow> = sqlx::query_as(
            r#"
            SELECT source, enabled, max_pages_per_run, max_age_days, cooldown_minutes,
                   reason, updated_at
            FROM source_policy_overrides
            ORDER BY source
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows.into_iter().map(PolicyOverride::from).collect())
    }

    async fn set_source_enabled(
        &self,
        source: &str,
        enabled: bool,
        reason: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO source_policy_overrides (source, enabled, reason, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (source)
            DO UPDATE SET
                enabled = EXCLUDED.enabled,
                reason = EXCLUDED.reason,
                updated_at = NOW()
            "#,
        )
        .bind(source)
        .bind(enabled)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        tracing::info!(source, enabled, reason, "Policy override written");
        Ok(())
    }
}
