use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use crmsync_core::error::AppError;
use crmsync_core::models::DataType;
use crmsync_core::state::{ExportState, ExportStatus};
use crmsync_core::traits::ProgressStore;

/// Export state records in PostgreSQL, one row per data type.
///
/// A row only exists once a record has been written. Writes are guarded by the
/// `version` column so concurrent workers never overwrite each other's progress.
#[derive(Clone)]
pub struct ExportStateRepository {
    pool: Pool<Postgres>,
}

impl ExportStateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ExportStateRow {
    data_type: String,
    status: String,
    failure_reason: Option<String>,
    primary_offset: i64,
    secondary_offset: i64,
    tracker_updated: Option<DateTime<Utc>>,
    exported_count: i64,
    total_count: Option<i64>,
    start_time: Option<DateTime<Utc>>,
    completed_time: Option<DateTime<Utc>>,
    run_id: Option<Uuid>,
    request_id: Option<String>,
    last_sync: Option<String>,
    last_sync_at: Option<DateTime<Utc>>,
    version: i64,
}

impl TryFrom<ExportStateRow> for ExportState {
    type Error = AppError;

    fn try_from(row: ExportStateRow) -> Result<Self, Self::Error> {
        Ok(ExportState {
            data_type: row.data_type.parse().map_err(AppError::DatabaseError)?,
            status: ExportStatus::from_parts(&row.status, row.failure_reason)
                .map_err(AppError::DatabaseError)?,
            offset: to_u64(row.primary_offset),
            sub_offset: to_u64(row.secondary_offset),
            tracker_updated: row.tracker_updated,
            exported_count: to_u64(row.exported_count),
            total_count: row.total_count.map(to_u64),
            start_time: row.start_time,
            completed_time: row.completed_time,
            run_id: row.run_id,
            request_id: row.request_id,
            last_sync: row
                .last_sync
                .map(|s| s.parse())
                .transpose()
                .map_err(AppError::DatabaseError)?,
            last_sync_at: row.last_sync_at,
            version: to_u64(row.version),
        })
    }
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl ProgressStore for ExportStateRepository {
    async fn load(&self, data_type: DataType) -> Result<ExportState, AppError> {
        let row = sqlx::query_as::<_, ExportStateRow>(
            r#"SELECT * FROM export_states WHERE data_type = $1"#,
        )
        .bind(data_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        match row {
            Some(row) => row.try_into(),
            None => Ok(ExportState::new(data_type)),
        }
    }

    async fn compare_and_set(
        &self,
        expected_version: u64,
        state: &ExportState,
    ) -> Result<bool, AppError> {
        // Version 0 means "never written": the row must not exist yet.
        let sql = if expected_version == 0 {
            r#"
            INSERT INTO export_states (
                data_type, status, failure_reason, primary_offset, secondary_offset,
                tracker_updated, exported_count, total_count, start_time, completed_time,
                run_id, request_id, last_sync, last_sync_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (data_type) DO NOTHING
            "#
        } else {
            r#"
            UPDATE export_states
            SET status = $2, failure_reason = $3, primary_offset = $4, secondary_offset = $5,
                tracker_updated = $6, exported_count = $7, total_count = $8, start_time = $9,
                completed_time = $10, run_id = $11, request_id = $12, last_sync = $13,
                last_sync_at = $14, version = $15
            WHERE data_type = $1 AND version = $16
            "#
        };

        let mut query = sqlx::query(sql)
            .bind(state.data_type.as_str())
            .bind(state.status.as_str())
            .bind(state.status.reason())
            .bind(to_i64(state.offset))
            .bind(to_i64(state.sub_offset))
            .bind(state.tracker_updated)
            .bind(to_i64(state.exported_count))
            .bind(state.total_count.map(to_i64))
            .bind(state.start_time)
            .bind(state.completed_time)
            .bind(state.run_id)
            .bind(state.request_id.as_deref())
            .bind(state.last_sync.map(|s| s.as_str()))
            .bind(state.last_sync_at)
            .bind(to_i64(state.version));
        if expected_version != 0 {
            query = query.bind(to_i64(expected_version));
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        let written = result.rows_affected() == 1;
        if !written {
            tracing::debug!(
                data_type = %state.data_type,
                expected_version,
                "Export state compare-and-set lost"
            );
        }
        Ok(written)
    }
}
