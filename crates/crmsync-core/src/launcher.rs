use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::job_queue::JobQueue;
use crate::models::DataType;
use crate::scheduler::Scheduler;
use crate::state::{ExportState, export_in_progress, modify_state};
use crate::traits::{Notice, NoticeSink, ProgressStore};

/// Result of an export launch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LaunchOutcome {
    /// A new run was started and its first page scheduled.
    Started { run_id: Uuid },
    /// The request id matches the one that started the current run.
    Duplicate,
    /// An export page of this data type is already waiting to run.
    AlreadyQueued,
}

/// Export state of every data type.
#[derive(Debug, Clone, Serialize)]
pub struct StatusOverview {
    pub exports: Vec<ExportState>,
    pub export_in_progress: bool,
}

/// Starts full exports on administrator request.
#[derive(Clone)]
pub struct ExportLauncher<P, Q, N>
where
    P: ProgressStore,
    Q: JobQueue,
    N: NoticeSink,
{
    store: P,
    scheduler: Scheduler<Q>,
    notices: N,
}

impl<P, Q, N> ExportLauncher<P, Q, N>
where
    P: ProgressStore,
    Q: JobQueue,
    N: NoticeSink,
{
    pub fn new(store: P, scheduler: Scheduler<Q>, notices: N) -> Self {
        Self {
            store,
            scheduler,
            notices,
        }
    }

    /// Start a full export of `data_type`.
    ///
    /// `request_id` identifies the caller's request so that a resubmitted form
    /// does not restart a run it already started.
    pub async fn launch_export(
        &self,
        data_type: DataType,
        request_id: Option<String>,
    ) -> Result<LaunchOutcome, AppError> {
        let state = self.store.load(data_type).await?;
        if request_id.is_some() && state.request_id == request_id {
            tracing::info!(%data_type, ?request_id, "Ignoring repeated export request");
            return Ok(LaunchOutcome::Duplicate);
        }

        if self.scheduler.has_pending_export(data_type).await? {
            tracing::info!(%data_type, "Export already queued");
            return Ok(LaunchOutcome::AlreadyQueued);
        }

        self.notices.add(Notice::ExportInProgress).await?;
        let run_id = self.reset_export_data(data_type, request_id).await?;
        self.scheduler
            .schedule_export_page(data_type, 0, run_id)
            .await?;

        tracing::info!(%data_type, %run_id, "Export started");
        Ok(LaunchOutcome::Started { run_id })
    }

    /// Begin a new run of `data_type`, superseding any previous one.
    ///
    /// Pages still queued for the old run are discarded when they execute.
    pub async fn reset_export_data(
        &self,
        data_type: DataType,
        request_id: Option<String>,
    ) -> Result<Uuid, AppError> {
        let run_id = Uuid::new_v4();
        let now = Utc::now();
        modify_state(&self.store, data_type, |state| {
            state.reset(run_id, request_id.clone(), now);
        })
        .await?;
        Ok(run_id)
    }

    pub async fn export_status(&self) -> Result<StatusOverview, AppError> {
        let mut exports = Vec::with_capacity(DataType::ALL.len());
        for data_type in DataType::ALL {
            exports.push(self.store.load(data_type).await?);
        }
        Ok(StatusOverview {
            export_in_progress: exports.iter().any(|s| s.status.is_in_progress()),
            exports,
        })
    }

    pub async fn is_export_in_progress(&self) -> Result<bool, AppError> {
        export_in_progress(&self.store, &DataType::ALL).await
    }
}
