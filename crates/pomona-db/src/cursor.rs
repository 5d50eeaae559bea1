//! `ingestion_state` table: one resume position per source.

use chrono::{DateTime, Utc};
use pomona_core::cursor::{IngestionCursor, IngestionState};
use pomona_core::error::AppError;
use pomona_core::traits::CursorStore;

use crate::store::PgStore;

#[derive(sqlx::FromRow)]
struct StateRow {
    page: i32,
    since: Option<DateTime<Utc>>,
    last_run_at: Option<DateTime<Utc>>,
}

impl From<StateRow> for IngestionState {
    fn from(row: StateRow) -> Self {
        let page = u32::try_from(row.page).unwrap_or(1);
        IngestionState::new(IngestionCursor::new(page, row.since), row.last_run_at)
    }
}

impl CursorStore for PgStore {
    async fn get_state(&self, source: &str) -> Result<Option<IngestionState>, AppError> {
        let row: Option<StateRow> = sqlx::query_as(
            r#"
            SELECT page, since, last_run_at
            FROM ingestion_state
            WHERE source = $1
            "#,
        )
        .bind(source)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(row.map(IngestionState::from))
    }

    async fn save_state(&self, source: &str, state: &IngestionState) -> Result<(), AppError> {
        let page = i32::try_from(state.cursor.page()).unwrap_or(i32::MAX);

        sqlx::query(
            r#"
            INSERT INTO ingestion_state (source, page, since, last_run_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (source)
            DO UPDATE SET
                page = EXCLUDED.page,
                since = EXCLUDED.since,
                last_run_at = EXCLUDED.last_run_at,
                updated_at = NOW()
            "#,
        )
        .bind(source)
        .bind(page)
        .bind(state.cursor.since())
        .bind(state.last_run_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(())
    }

    async fn reset_cursor(&self, source: &str) -> Result<(), AppError> {
        // No row means the source is already at page 1.
        sqlx::query(
            r#"
            UPDATE ingestion_state
            SET page = 1, updated_at = NOW()
            WHERE source = $1
            "#,
        )
        .bind(source)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(())
    }
}
