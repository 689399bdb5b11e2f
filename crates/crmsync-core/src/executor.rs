//! Runs claimed jobs against the export engine.

use chrono::Utc;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::AppError;
use crate::exporter::BatchExporter;
use crate::handler::{ExportTransition, ResponseHandler};
use crate::job::{ExportJob, JobArgs, JobOutcome};
use crate::job_queue::JobQueue;
use crate::models::{Collection, DataType, TRANSPORT_FAILURE};
use crate::scheduler::Scheduler;
use crate::state::{SyncStatus, modify_state};
use crate::throttle::Throttle;
use crate::traits::{ItemSource, NoticeSink, ProgressStore, Uploader};
use crate::worker::JobHandler;

/// Executes sync and export jobs.
#[derive(Clone)]
pub struct JobExecutor<P, Q, S, U, N>
where
    P: ProgressStore,
    Q: JobQueue,
    S: ItemSource,
    U: Uploader,
    N: NoticeSink,
{
    store: P,
    source: S,
    exporter: BatchExporter<P, S, U>,
    handler: ResponseHandler<P, Q, N>,
    scheduler: Scheduler<Q>,
    throttle: Throttle,
}

impl<P, Q, S, U, N> JobExecutor<P, Q, S, U, N>
where
    P: ProgressStore,
    Q: JobQueue,
    S: ItemSource,
    U: Uploader,
    N: NoticeSink,
{
    pub fn new(
        store: P,
        source: S,
        exporter: BatchExporter<P, S, U>,
        handler: ResponseHandler<P, Q, N>,
        scheduler: Scheduler<Q>,
        throttle: Throttle,
    ) -> Self {
        Self {
            store,
            source,
            exporter,
            handler,
            scheduler,
            throttle,
        }
    }

    /// Upload one item, then sleep out the rate budget before settling.
    ///
    /// A 429 re-schedules the item; any code other than 200, 201 or 429 is fatal.
    pub async fn throttle_single_update(
        &self,
        data_type: DataType,
        item_id: &str,
    ) -> Result<JobOutcome, AppError> {
        let started = Instant::now();
        let result = match self.exporter.single_update(data_type, item_id).await {
            Ok(Some(response)) => Ok(response),
            Ok(None) => {
                self.record_sync(data_type, SyncStatus::Failed).await?;
                return Ok(JobOutcome::Continue);
            }
            Err(e) => Err(e),
        };

        let slept = self.throttle.pace(started).await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(%data_type, %item_id, error = %e, "Single update failed");
                self.record_sync(data_type, SyncStatus::Failed).await?;
                return Ok(JobOutcome::Continue);
            }
        };

        match response.code {
            200 | 201 => {
                self.record_sync(data_type, SyncStatus::Completed).await?;
                tracing::info!(
                    %data_type,
                    %item_id,
                    code = response.code,
                    concurrent_batches = self.throttle.concurrent_batches(),
                    sleep_ms = slept.as_millis() as u64,
                    "Single update uploaded"
                );
                Ok(JobOutcome::Continue)
            }
            429 => {
                tracing::warn!(%data_type, %item_id, "Single update rate limited, rescheduling");
                self.scheduler
                    .schedule_single_update(data_type, item_id, true)
                    .await?;
                self.record_sync(data_type, SyncStatus::Failed).await?;
                Ok(JobOutcome::Continue)
            }
            code => {
                tracing::warn!(%data_type, %item_id, code, body = %response.body, "Unexpected response code");
                self.record_sync(data_type, SyncStatus::Failed).await?;
                Ok(JobOutcome::Fatal(format!(
                    "Upload failed: unexpected response code '{code}'"
                )))
            }
        }
    }

    /// Process the next export page of run `run_id`.
    ///
    /// `job_offset` is the offset the page was scheduled for. The page itself
    /// always resumes from the persisted tracker, so a redelivered job does
    /// not replay or skip items.
    pub async fn run_export_page(
        &self,
        data_type: DataType,
        job_offset: u64,
        run_id: Uuid,
    ) -> Result<JobOutcome, AppError> {
        let state = self.store.load(data_type).await?;
        if !state.is_current_run(run_id) || !state.status.is_in_progress() {
            tracing::warn!(
                %data_type,
                job_offset,
                %run_id,
                current_run = ?state.run_id,
                "Discarding stale export continuation"
            );
            return Ok(ExportTransition::Superseded.into_outcome());
        }

        let total_count = match state.total_count {
            Some(total) => total,
            None => self.count_run(data_type, run_id).await?,
        };

        let Some(report) = self.exporter.batch_update(data_type, run_id).await? else {
            tracing::warn!(%data_type, job_offset, %run_id, "Export run reset mid-page, page dropped");
            return Ok(ExportTransition::Superseded.into_outcome());
        };

        let offset = report.start;
        if offset != job_offset {
            tracing::info!(
                %data_type,
                job_offset,
                tracker_offset = offset,
                "Export page resumed from persisted tracker"
            );
        }

        if report.is_exhausted() {
            return Ok(self
                .handler
                .finish_export(data_type, run_id, offset)
                .await?
                .into_outcome());
        }
        if report.code == TRANSPORT_FAILURE {
            tracing::warn!(%data_type, offset, error = %report.body, "Export page not delivered");
        }

        let count = report.count as u64;
        let transition = self
            .handler
            .handle_export_response(
                data_type,
                run_id,
                offset,
                count,
                count,
                total_count,
                &report.response(),
            )
            .await?;
        Ok(transition.into_outcome())
    }

    /// Count the items of a run on its first page and remember the total.
    async fn count_run(&self, data_type: DataType, run_id: Uuid) -> Result<u64, AppError> {
        let total = self.source.count(data_type, Collection::Primary).await?
            + self.source.count(data_type, Collection::Secondary).await?;
        modify_state(&self.store, data_type, |state| {
            if state.is_current_run(run_id) {
                state.total_count = Some(total);
            }
        })
        .await?;
        tracing::debug!(%data_type, total, "Export size counted");
        Ok(total)
    }

    async fn record_sync(&self, data_type: DataType, status: SyncStatus) -> Result<(), AppError> {
        let now = Utc::now();
        modify_state(&self.store, data_type, |state| state.record_sync(status, now)).await?;
        Ok(())
    }
}

impl<P, Q, S, U, N> JobHandler for JobExecutor<P, Q, S, U, N>
where
    P: ProgressStore,
    Q: JobQueue,
    S: ItemSource,
    U: Uploader,
    N: NoticeSink,
{
    async fn execute(&self, job: &ExportJob) -> Result<JobOutcome, AppError> {
        match &job.args {
            JobArgs::Item { item_id } => self.throttle_single_update(job.data_type, item_id).await,
            JobArgs::Page { offset, run_id } => {
                self.run_export_page(job.data_type, *offset, *run_id).await
            }
        }
    }
}
