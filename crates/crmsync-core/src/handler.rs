//! Export lifecycle state machine.
//!
//! Every processed export page ends in [`ResponseHandler::handle_export_response`],
//! which turns the CRM's answer into an [`ExportTransition`]:
//!
//! | Response | Transition | Status |
//! |---|---|---|
//! | 200/201, items remain | next page scheduled | `in_progress` |
//! | 200/201, nothing remains | run finished | `completed` |
//! | 429 | same page retried after the backoff | unchanged |
//! | 404 | run failed | `failed` |
//! | 400 | run failed, body kept as reason | `failed: <body>` |
//! | other | run failed | `failed: Unknown error` |
//!
//! Notices only flip once no sibling data type is still exporting.

use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::job::JobOutcome;
use crate::job_queue::JobQueue;
use crate::models::{ApiResponse, DataType};
use crate::scheduler::Scheduler;
use crate::state::{ExportStatus, export_in_progress, modify_state};
use crate::traits::{Notice, NoticeSink, ProgressStore};

pub const UNKNOWN_ERROR: &str = "Unknown error";

/// What happened to an export run after one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportTransition {
    Continued { next_offset: u64 },
    Completed,
    /// The page belonged to a run that has since been reset.
    Superseded,
    RateLimited { retry_in: Duration },
    Failed { code: u16, reason: Option<String> },
}

impl ExportTransition {
    pub fn into_outcome(self) -> JobOutcome {
        match self {
            ExportTransition::Continued { .. }
            | ExportTransition::Completed
            | ExportTransition::Superseded => JobOutcome::Continue,
            ExportTransition::RateLimited { retry_in } => JobOutcome::RetryAfter(retry_in),
            ExportTransition::Failed { code, reason } => JobOutcome::Fatal(match reason {
                Some(reason) => format!("Export failed with response code {code}: {reason}"),
                None => format!("Export failed with response code {code}"),
            }),
        }
    }
}

/// Applies export responses to the persisted state, the queue and the notices.
#[derive(Clone)]
pub struct ResponseHandler<P, Q, N>
where
    P: ProgressStore,
    Q: JobQueue,
    N: NoticeSink,
{
    store: P,
    scheduler: Scheduler<Q>,
    notices: N,
    rate_limit_backoff: Duration,
}

impl<P, Q, N> ResponseHandler<P, Q, N>
where
    P: ProgressStore,
    Q: JobQueue,
    N: NoticeSink,
{
    pub fn new(store: P, scheduler: Scheduler<Q>, notices: N, rate_limit_backoff: Duration) -> Self {
        Self {
            store,
            scheduler,
            notices,
            rate_limit_backoff,
        }
    }

    /// Drive the export run `run_id` forward after the page at `offset`.
    ///
    /// `limit` is how far the next page starts past `offset`, `batch_count` how
    /// many items this page exported and `total_count` the size of the run.
    #[allow(clippy::too_many_arguments)]
    pub async fn handle_export_response(
        &self,
        data_type: DataType,
        run_id: Uuid,
        offset: u64,
        limit: u64,
        batch_count: u64,
        total_count: u64,
        response: &ApiResponse,
    ) -> Result<ExportTransition, AppError> {
        tracing::info!(
            %data_type,
            %run_id,
            total_count,
            offset,
            limit,
            batch_count,
            code = response.code,
            "Handling export response"
        );

        match response.code {
            200 | 201 => {
                let next_offset = offset + limit;
                let exported = offset + batch_count;
                if next_offset < total_count {
                    let (_, current) = modify_state(&self.store, data_type, |state| {
                        if !state.is_current_run(run_id) {
                            return false;
                        }
                        state.exported_count = exported;
                        true
                    })
                    .await?;
                    if !current {
                        return Ok(ExportTransition::Superseded);
                    }
                    self.scheduler
                        .schedule_export_page(data_type, next_offset, run_id)
                        .await?;
                    Ok(ExportTransition::Continued { next_offset })
                } else {
                    self.complete(data_type, run_id, exported).await
                }
            }
            429 => {
                tracing::warn!(
                    %data_type,
                    offset,
                    retry_in_secs = self.rate_limit_backoff.as_secs(),
                    "Export rate limited, retrying page"
                );
                Ok(ExportTransition::RateLimited {
                    retry_in: self.rate_limit_backoff,
                })
            }
            404 => self.fail(data_type, run_id, 404, None).await,
            400 => {
                self.fail(data_type, run_id, 400, Some(response.body.clone()))
                    .await
            }
            code => {
                self.fail(data_type, run_id, code, Some(UNKNOWN_ERROR.to_string()))
                    .await
            }
        }
    }

    /// Finish a run whose source is exhausted before `total_count` was reached.
    pub async fn finish_export(
        &self,
        data_type: DataType,
        run_id: Uuid,
        exported_count: u64,
    ) -> Result<ExportTransition, AppError> {
        self.complete(data_type, run_id, exported_count).await
    }

    async fn complete(
        &self,
        data_type: DataType,
        run_id: Uuid,
        exported_count: u64,
    ) -> Result<ExportTransition, AppError> {
        let now = Utc::now();
        let (_, applied) = modify_state(&self.store, data_type, |state| {
            if !state.is_current_run(run_id) {
                return false;
            }
            state.status = ExportStatus::Completed;
            state.completed_time = Some(now);
            state.exported_count = exported_count;
            true
        })
        .await?;

        if !applied {
            return Ok(ExportTransition::Superseded);
        }

        tracing::info!(%data_type, %run_id, exported_count, "Export completed");
        if !export_in_progress(&self.store, &DataType::ALL).await? {
            self.notices.remove(Notice::ExportInProgress).await?;
            self.notices.add(Notice::ExportCompleted).await?;
        }

        Ok(ExportTransition::Completed)
    }

    async fn fail(
        &self,
        data_type: DataType,
        run_id: Uuid,
        code: u16,
        reason: Option<String>,
    ) -> Result<ExportTransition, AppError> {
        tracing::warn!(%data_type, %run_id, code, reason = ?reason, "Export failed");

        let status = match &reason {
            Some(reason) => ExportStatus::failed_with(reason.clone()),
            None => ExportStatus::failed(),
        };
        let (_, applied) = modify_state(&self.store, data_type, |state| {
            if !state.is_current_run(run_id) {
                return false;
            }
            state.status = status.clone();
            true
        })
        .await?;

        if !applied {
            return Ok(ExportTransition::Superseded);
        }

        if !export_in_progress(&self.store, &DataType::ALL).await? {
            self.notices.remove(Notice::ExportInProgress).await?;
        }
        self.notices.add(Notice::ExportFailed).await?;

        Ok(ExportTransition::Failed { code, reason })
    }
}
