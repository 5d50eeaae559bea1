//! `ingestion_runs` and `ingestion_run_sources` tables.
//!
//! Terminal run states are write-once: every transition out of `running` is
//! guarded by `WHERE status = 'running'`, so a late finish cannot overwrite a
//! run the healer already reaped and vice versa.

use chrono::{DateTime, Utc};
use pomona_core::error::AppError;
use pomona_core::cursor::IngestionCursor;
use pomona_core::run::{
    IngestionCounts, IngestionRun, RunStatus, RunTotals, SourceRunRecord, SourceRunStatus,
};
use pomona_core::traits::RunStore;
use sqlx::types::Json;
use uuid::Uuid;

use crate::store::PgStore;

/// Column list for run SELECTs. Must remain a const literal since
/// `format!()` bypasses sqlx compile-time validation.
pub(crate) const RUN_COLUMNS: &str =
    "id, started_at, finished_at, status, sources_requested, totals, error_message";

#[derive(sqlx::FromRow)]
pub(crate) struct RunRow {
    id: Uuid,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    status: String,
    sources_requested: Vec<String>,
    totals: Option<Json<RunTotals>>,
    error_message: Option<String>,
}

impl TryFrom<RunRow> for IngestionRun {
    type Error = AppError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        let status: RunStatus = row
            .status
            .parse()
            .map_err(|e| AppError::PersistenceError(format!("run {}: {}", row.id, e)))?;
        Ok(IngestionRun {
            id: row.id,
            started_at: row.started_at,
            finished_at: row.finished_at,
            status,
            sources_requested: row.sources_requested,
            totals: row.totals.map(|t| t.0),
            error_message: row.error_message,
        })
    }
}

fn page_i32(page: u32) -> i32 {
    i32::try_from(page).unwrap_or(i32::MAX)
}

impl RunStore for PgStore {
    async fn create_run(
        &self,
        sources: &[String],
        started_at: DateTime<Utc>,
    ) -> Result<IngestionRun, AppError> {
        let run = IngestionRun {
            id: Uuid::new_v4(),
            started_at,
            finished_at: None,
            status: RunStatus::Running,
            sources_requested: sources.to_vec(),
            totals: None,
            error_message: None,
        };

        sqlx::query(
            r#"
            INSERT INTO ingestion_runs (id, started_at, status, sources_requested)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(run.id)
        .bind(run.started_at)
        .bind(run.status.as_str())
        .bind(&run.sources_requested)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(run)
    }

    async fn finish_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        totals: &RunTotals,
        finished_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE ingestion_runs
            SET status = $2, totals = $3, finished_at = $4
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(run_id)
        .bind(status.as_str())
        .bind(Json(totals))
        .bind(finished_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_run_failed(
        &self,
        run_id: Uuid,
        error: &str,
        finished_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE ingestion_runs
            SET status = 'failed', error_message = $2, finished_at = $3
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(run_id)
        .bind(error)
        .bind(finished_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_stuck_runs(
        &self,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<IngestionRun>, AppError> {
        let query = format!(
            "SELECT {} FROM ingestion_runs WHERE status = 'running' AND started_at < $1 ORDER BY started_at",
            RUN_COLUMNS
        );
        let rows: Vec<RunRow> = sqlx::query_as(&query)
            .bind(started_before)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        rows.into_iter().map(IngestionRun::try_from).collect()
    }

    async fn upsert_source_record(&self, record: &SourceRunRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO ingestion_run_sources (
                run_id, source, started_at, finished_at, status,
                page_start, page_end, cursor_in, cursor_out, counts, error_message
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (run_id, source)
            DO UPDATE SET
                started_at = EXCLUDED.started_at,
                finished_at = EXCLUDED.finished_at,
                status = EXCLUDED.status,
                page_start = EXCLUDED.page_start,
                page_end = EXCLUDED.page_end,
                cursor_in = EXCLUDED.cursor_in,
                cursor_out = EXCLUDED.cursor_out,
                counts = EXCLUDED.counts,
                error_message = EXCLUDED.error_message
            "#,
        )
        .bind(record.run_id)
        .bind(&record.source)
        .bind(record.started_at)
        .bind(record.finished_at)
        .bind(record.status.as_str())
        .bind(page_i32(record.page_start))
        .bind(record.page_end.map(page_i32))
        .bind(Json(&record.cursor_in))
        .bind(record.cursor_out.as_ref().map(Json))
        .bind(Json(&record.counts))
        .bind(&record.error_message)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(())
    }
}

impl PgStore {
    /// Per-source records of one run, in source order.
    pub async fn source_records(&self, run_id: Uuid) -> Result<Vec<SourceRunRecord>, AppError> {
        let rows: Vec<RecordRow> = sqlx::query_as(
            r#"
            SELECT run_id, source, started_at, finished_at, status, page_start, page_end,
                   cursor_in, cursor_out, counts, error_message
            FROM ingestion_run_sources
            WHERE run_id = $1
            ORDER BY source
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        rows.into_iter().map(SourceRunRecord::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    run_id: Uuid,
    source: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    status: String,
    page_start: i32,
    page_end: Option<i32>,
    cursor_in: Json<IngestionCursor>,
    cursor_out: Option<Json<IngestionCursor>>,
    counts: Json<IngestionCounts>,
    error_message: Option<String>,
}

impl TryFrom<RecordRow> for SourceRunRecord {
    type Error = AppError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<SourceRunStatus>().map_err(|e| {
            AppError::PersistenceError(format!("run {} source {}: {}", row.run_id, row.source, e))
        })?;
        Ok(SourceRunRecord {
            run_id: row.run_id,
            source: row.source,
            started_at: row.started_at,
            finished_at: row.finished_at,
            status,
            page_start: u32::try_from(row.page_start).unwrap_or(1),
            page_end: row.page_end.and_then(|p| u32::try_from(p).ok()),
            cursor_in: row.cursor_in.0,
            cursor_out: row.cursor_out.map(|c| c.0),
            counts: row.counts.0,
            error_message: row.error_message,
        })
    }
}
