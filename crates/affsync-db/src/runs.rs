//! Database operations for `ingestion_runs`.
//!
//! The run filter and counters are stored as JSONB; they are read and written
//! whole and never queried by field.

use affsync_core::{IngestionRun, RunCounts, RunFilter};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `ingestion_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IngestionRunRow {
    pub id: Uuid,
    pub brand_id: Uuid,
    pub status: String,
    pub filter: Json<RunFilter>,
    pub counts: Json<RunCounts>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<IngestionRunRow> for IngestionRun {
    type Error = DbError;

    fn try_from(row: IngestionRunRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|e: affsync_core::CoreError| {
            DbError::InvalidRow {
                id: row.id.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(IngestionRun {
            id: row.id,
            brand_id: row.brand_id,
            status,
            filter: row.filter.0,
            counts: row.counts.0,
            error_message: row.error_message,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

const RUN_COLUMNS: &str =
    "id, brand_id, status, filter, counts, error_message, started_at, completed_at";

/// Records a newly started run.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] if the id exists, or [`DbError::Sqlx`].
pub async fn insert_run(pool: &PgPool, run: &IngestionRun) -> Result<(), DbError> {
    sqlx::query(&format!(
        "INSERT INTO ingestion_runs ({RUN_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
    ))
    .bind(run.id)
    .bind(run.brand_id)
    .bind(run.status.as_str())
    .bind(Json(&run.filter))
    .bind(Json(&run.counts))
    .bind(&run.error_message)
    .bind(run.started_at)
    .bind(run.completed_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Writes a run's status, counters, and completion fields.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the run does not exist.
pub async fn update_run(pool: &PgPool, run: &IngestionRun) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE ingestion_runs \
         SET status = $2, counts = $3, error_message = $4, completed_at = $5 \
         WHERE id = $1",
    )
    .bind(run.id)
    .bind(run.status.as_str())
    .bind(Json(&run.counts))
    .bind(&run.error_message)
    .bind(run.completed_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Returns a run by id, or `None`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_run(pool: &PgPool, id: Uuid) -> Result<Option<IngestionRun>, DbError> {
    sqlx::query_as::<_, IngestionRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM ingestion_runs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .map(IngestionRun::try_from)
    .transpose()
}

/// Most recent runs of a brand, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_runs_for_brand(
    pool: &PgPool,
    brand_id: Uuid,
    limit: i64,
) -> Result<Vec<IngestionRun>, DbError> {
    let rows = sqlx::query_as::<_, IngestionRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM ingestion_runs \
         WHERE brand_id = $1 ORDER BY started_at DESC LIMIT $2"
    ))
    .bind(brand_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(IngestionRun::try_from).collect()
}
