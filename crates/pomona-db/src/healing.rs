//! `healing_attempts` and `alerts` tables.

use chrono::{DateTime, Utc};
use pomona_core::error::AppError;
use pomona_core::healer::{Alert, AlertSeverity, HealingAttempt, TracingAlertSink};
use pomona_core::traits::{AlertSink, HealingStore};

use crate::store::PgStore;

#[derive(sqlx::FromRow)]
struct AttemptRow {
    source: String,
    failure_type: String,
    action: String,
    result: String,
    detail: Option<String>,
    attempted_at: DateTime<Utc>,
}

impl TryFrom<AttemptRow> for HealingAttempt {
    type Error = AppError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        Ok(HealingAttempt {
            failure_type: row.failure_type.parse()?,
            action: row.action.parse()?,
            result: row.result.parse()?,
            source: row.source,
            detail: row.detail,
            attempted_at: row.attempted_at,
        })
    }
}

impl HealingStore for PgStore {
    async fn record_attempt(&self, attempt: &HealingAttempt) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO healing_attempts (source, failure_type, action, result, detail, attempted_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&attempt.source)
        .bind(attempt.failure_type.as_str())
        .bind(attempt.action.as_str())
        .bind(attempt.result.as_str())
        .bind(&attempt.detail)
        .bind(attempt.attempted_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(())
    }

    async fn recent_attempts(&self, limit: usize) -> Result<Vec<HealingAttempt>, AppError> {
        let rows: Vec<AttemptRow> = sqlx::query_as(
            r#"
            SELECT source, failure_type, action, result, detail, attempted_at
            FROM healing_attempts
            ORDER BY attempted_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        rows.into_iter().map(HealingAttempt::try_from).collect()
    }
}

/// Persists alerts and mirrors them to the log.
impl AlertSink for PgStore {
    async fn emit(&self, alert: &Alert) -> Result<(), AppError> {
        TracingAlertSink.emit(alert).await?;

        sqlx::query(
            r#"
            INSERT INTO alerts (alert_type, severity, title, description, source)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&alert.alert_type)
        .bind(alert.severity.as_str())
        .bind(&alert.title)
        .bind(&alert.description)
        .bind(&alert.source)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(())
    }
}

/// Row of [`PgStore::recent_alerts`].
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct AlertRecord {
    pub alert_type: String,
    pub severity: String,
    pub title: String,
    pub description: String,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PgStore {
    /// Most recent alerts at or above `min_severity`, newest first.
    pub async fn recent_alerts(
        &self,
        min_severity: AlertSeverity,
        limit: usize,
    ) -> Result<Vec<AlertRecord>, AppError> {
        let severities: Vec<&str> = [
            AlertSeverity::Info,
            AlertSeverity::Warning,
            AlertSeverity::Critical,
        ]
        .into_iter()
        .filter(|s| *s >= min_severity)
        .map(|s| s.as_str())
        .collect();

        let rows: Vec<AlertRecord> = sqlx::query_as(
            r#"
            SELECT alert_type, severity, title, description, source, created_at
            FROM alerts
            WHERE severity = ANY($1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(&severities)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(rows)
    }
}
