use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::job::{CreateJobRequest, ExportJob, JobStatus};

/// Persistent queue of deferred sync and export jobs.
///
/// Implementations must support atomic claiming via `SELECT FOR UPDATE SKIP LOCKED`
/// or equivalent to prevent multiple workers from claiming the same job.
pub trait JobQueue: Send + Sync + Clone {
    /// Enqueue a job unconditionally.
    fn create_job(
        &self,
        request: CreateJobRequest,
    ) -> impl Future<Output = Result<ExportJob, AppError>> + Send;

    /// Enqueue a job unless a pending job with the same hook and arguments exists.
    ///
    /// The existence check and the insert must be atomic. Returns `None` when an
    /// equivalent job was already pending.
    fn create_unique_job(
        &self,
        request: CreateJobRequest,
    ) -> impl Future<Output = Result<Option<ExportJob>, AppError>> + Send;

    /// True when a pending job exists for `hook`, optionally restricted to one
    /// argument signature.
    fn has_pending(
        &self,
        hook: &str,
        args_signature: Option<&str>,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Atomically claim the next due pending job for processing.
    ///
    /// Returns `None` if no jobs are due.
    fn claim_job(
        &self,
        worker_id: &str,
    ) -> impl Future<Output = Result<Option<ExportJob>, AppError>> + Send;

    fn complete_job(&self, job_id: Uuid) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Mark a job as failed. If `next_retry_at` is provided, the job is
    /// reset to `pending` for retry; otherwise it is marked as permanently `failed`.
    fn fail_job(
        &self,
        job_id: Uuid,
        error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Put a running job back to `pending`, due at `run_at`, without counting a retry.
    fn reschedule_job(
        &self,
        job_id: Uuid,
        run_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn cancel_job(&self, job_id: Uuid) -> impl Future<Output = Result<(), AppError>> + Send;

    fn get_job(
        &self,
        job_id: Uuid,
    ) -> impl Future<Output = Result<Option<ExportJob>, AppError>> + Send;

    fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ExportJob>, AppError>> + Send;

    /// Release all jobs held by a specific worker (for graceful shutdown).
    fn release_worker_jobs(
        &self,
        worker_id: &str,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    fn count_by_status(
        &self,
        status: JobStatus,
    ) -> impl Future<Output = Result<i64, AppError>> + Send;
}
