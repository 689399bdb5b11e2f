use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use crmsync_core::error::AppError;
use crmsync_core::job::{CreateJobRequest, ExportJob, JobArgs, JobStatus};
use crmsync_core::job_queue::JobQueue;

const DEFAULT_MAX_RETRIES: u32 = 3;

/// PostgreSQL-backed job queue using `SELECT FOR UPDATE SKIP LOCKED`.
#[derive(Clone)]
pub struct SyncJobRepository {
    pool: Pool<Postgres>,
}

impl SyncJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SyncJobRow {
    id: Uuid,
    hook: String,
    data_type: String,
    args: serde_json::Value,
    status: String,
    scheduled_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    retry_count: i32,
    max_retries: i32,
    error_message: Option<String>,
    worker_id: Option<String>,
}

impl TryFrom<SyncJobRow> for ExportJob {
    type Error = AppError;

    fn try_from(row: SyncJobRow) -> Result<Self, Self::Error> {
        let args: JobArgs = serde_json::from_value(row.args)?;
        Ok(ExportJob {
            id: row.id,
            hook: row.hook,
            data_type: row.data_type.parse().map_err(AppError::DatabaseError)?,
            args,
            status: row.status.parse().map_err(AppError::DatabaseError)?,
            scheduled_at: row.scheduled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            retry_count: row.retry_count.max(0) as u32,
            max_retries: row.max_retries.max(0) as u32,
            error_message: row.error_message,
            worker_id: row.worker_id,
        })
    }
}

fn db_err(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(e.to_string())
}

const INSERT_JOB: &str = r#"
    INSERT INTO sync_jobs (hook, data_type, args, args_signature, scheduled_at, max_retries)
    VALUES ($1, $2, $3, $4, $5, $6)
    RETURNING *
"#;

impl SyncJobRepository {
    async fn insert<'e, E>(&self, executor: E, request: &CreateJobRequest) -> Result<ExportJob, AppError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let args = serde_json::to_value(&request.args)?;
        let row = sqlx::query_as::<_, SyncJobRow>(INSERT_JOB)
            .bind(request.hook())
            .bind(request.data_type.as_str())
            .bind(args)
            .bind(request.args_signature())
            .bind(request.scheduled_at)
            .bind(request.max_retries.unwrap_or(DEFAULT_MAX_RETRIES) as i32)
            .fetch_one(executor)
            .await
            .map_err(db_err)?;

        row.try_into()
    }
}

impl JobQueue for SyncJobRepository {
    async fn create_job(&self, request: CreateJobRequest) -> Result<ExportJob, AppError> {
        self.insert(&self.pool, &request).await
    }

    async fn create_unique_job(
        &self,
        request: CreateJobRequest,
    ) -> Result<Option<ExportJob>, AppError> {
        let hook = request.hook();
        let signature = request.args_signature();

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Serializes concurrent schedulers of the same job identity until commit.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("{hook}:{signature}"))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM sync_jobs
                WHERE status = 'pending' AND hook = $1 AND args_signature = $2
            )
            "#,
        )
        .bind(&hook)
        .bind(&signature)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        if exists {
            tx.rollback().await.map_err(db_err)?;
            return Ok(None);
        }

        let job = self.insert(&mut *tx, &request).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(Some(job))
    }

    async fn has_pending(&self, hook: &str, args_signature: Option<&str>) -> Result<bool, AppError> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM sync_jobs
                WHERE status = 'pending' AND hook = $1
                  AND ($2::text IS NULL OR args_signature = $2)
            )
            "#,
        )
        .bind(hook)
        .bind(args_signature)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(exists)
    }

    async fn claim_job(&self, worker_id: &str) -> Result<Option<ExportJob>, AppError> {
        let row = sqlx::query_as::<_, SyncJobRow>(
            r#"
            UPDATE sync_jobs
            SET status = 'running', worker_id = $1, started_at = NOW(), updated_at = NOW()
            WHERE id = (
                SELECT id FROM sync_jobs
                WHERE status = 'pending' AND scheduled_at <= NOW()
                ORDER BY scheduled_at ASC, created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(TryInto::try_into).transpose()
    }

    async fn complete_job(&self, job_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE sync_jobs
            SET status = 'completed', completed_at = NOW(), updated_at = NOW(),
                error_message = NULL, worker_id = NULL
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn fail_job(
        &self,
        job_id: Uuid,
        error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE sync_jobs
            SET
                status = CASE WHEN $3::timestamptz IS NOT NULL THEN 'pending' ELSE 'failed' END,
                retry_count = CASE WHEN $3::timestamptz IS NOT NULL THEN retry_count + 1 ELSE retry_count END,
                scheduled_at = COALESCE($3, scheduled_at),
                completed_at = CASE WHEN $3::timestamptz IS NOT NULL THEN NULL ELSE NOW() END,
                error_message = $2,
                updated_at = NOW(),
                worker_id = NULL,
                started_at = CASE WHEN $3::timestamptz IS NOT NULL THEN NULL ELSE started_at END
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(error)
        .bind(next_retry_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn reschedule_job(&self, job_id: Uuid, run_at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE sync_jobs
            SET status = 'pending', scheduled_at = $2, worker_id = NULL,
                started_at = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(job_id)
        .bind(run_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn cancel_job(&self, job_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE sync_jobs
            SET status = 'cancelled', updated_at = NOW(), worker_id = NULL
            WHERE id = $1 AND status NOT IN ('completed', 'cancelled')
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ExportJob>, AppError> {
        let row = sqlx::query_as::<_, SyncJobRow>(r#"SELECT * FROM sync_jobs WHERE id = $1"#)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<ExportJob>, AppError> {
        let rows = sqlx::query_as::<_, SyncJobRow>(
            r#"
            SELECT * FROM sync_jobs
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn release_worker_jobs(&self, worker_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE sync_jobs
            SET status = 'pending', worker_id = NULL, started_at = NULL, updated_at = NOW()
            WHERE worker_id = $1 AND status = 'running'
            "#,
        )
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as(r#"SELECT COUNT(*) FROM sync_jobs WHERE status = $1"#)
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(count)
    }
}
