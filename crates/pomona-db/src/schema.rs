//! Schema bootstrap.
//!
//! The DDL lives in `migrations/0001_init.sql`. Every statement is idempotent
//! (`IF NOT EXISTS`), so [`migrate`] is safe to run on each startup.

use pomona_core::error::AppError;
use sqlx::PgPool;

const INIT_SQL: &str = include_str!("../migrations/0001_init.sql");

/// Statements of the init script, without comment-only fragments.
pub fn statements() -> Vec<&'static str> {
    INIT_SQL
        .split(';')
        .map(str::trim)
        .filter(|stmt| {
            stmt.lines()
                .any(|line| !line.trim().is_empty() && !line.trim_start().starts_with("--"))
        })
        .collect()
}

/// Applies the schema. Each statement is executed separately since the
/// extended query protocol accepts one statement per query.
pub async fn migrate(pool: &PgPool) -> Result<(), AppError> {
    for statement in statements() {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(AppError::DatabaseError)?;
    }
    tracing::debug!("Database schema is up to date");
    Ok(())
}
