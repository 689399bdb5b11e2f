use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crmsync_core::job::ExportJob;
use crmsync_core::launcher::{LaunchOutcome, StatusOverview};
use crmsync_core::state::ExportState;

// ---------------------------------------------------------------------------
// Exports
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct LaunchExportRequest {
    /// Id of the submitting form. Resubmitting the same id does not restart the run.
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LaunchExportResponse {
    pub data_type: String,
    /// One of `started`, `duplicate`, `already_queued`.
    pub outcome: String,
    pub run_id: Option<Uuid>,
}

impl LaunchExportResponse {
    pub fn new(data_type: impl Into<String>, outcome: LaunchOutcome) -> Self {
        let (outcome, run_id) = match outcome {
            LaunchOutcome::Started { run_id } => ("started", Some(run_id)),
            LaunchOutcome::Duplicate => ("duplicate", None),
            LaunchOutcome::AlreadyQueued => ("already_queued", None),
        };
        Self {
            data_type: data_type.into(),
            outcome: outcome.to_string(),
            run_id,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ExportStateResponse {
    pub data_type: String,
    pub status: String,
    pub failure_reason: Option<String>,
    pub offset: u64,
    pub sub_offset: u64,
    pub exported_count: u64,
    pub total_count: Option<u64>,
    pub start_time: Option<DateTime<Utc>>,
    pub completed_time: Option<DateTime<Utc>>,
    pub run_id: Option<Uuid>,
    pub last_sync: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl From<ExportState> for ExportStateResponse {
    fn from(state: ExportState) -> Self {
        Self {
            data_type: state.data_type.to_string(),
            status: state.status.as_str().to_string(),
            failure_reason: state.status.reason().map(str::to_string),
            offset: state.offset,
            sub_offset: state.sub_offset,
            exported_count: state.exported_count,
            total_count: state.total_count,
            start_time: state.start_time,
            completed_time: state.completed_time,
            run_id: state.run_id,
            last_sync: state.last_sync.map(|s| s.as_str().to_string()),
            last_sync_at: state.last_sync_at,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ExportStatusResponse {
    pub exports: Vec<ExportStateResponse>,
    pub export_in_progress: bool,
}

impl From<StatusOverview> for ExportStatusResponse {
    fn from(overview: StatusOverview) -> Self {
        Self {
            exports: overview.exports.into_iter().map(Into::into).collect(),
            export_in_progress: overview.export_in_progress,
        }
    }
}

// ---------------------------------------------------------------------------
// Item sync
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct SyncQuery {
    /// Enqueue even when an equivalent sync is already pending.
    pub force: Option<bool>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SyncResponse {
    /// False when an equivalent sync was already pending.
    pub scheduled: bool,
    pub job_id: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobResponse {
    pub id: Uuid,
    pub hook: String,
    pub data_type: String,
    pub args: serde_json::Value,
    pub status: String,
    pub scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error_message: Option<String>,
    pub worker_id: Option<String>,
}

impl From<ExportJob> for JobResponse {
    fn from(job: ExportJob) -> Self {
        Self {
            id: job.id,
            hook: job.hook,
            data_type: job.data_type.to_string(),
            args: serde_json::to_value(&job.args).unwrap_or(serde_json::Value::Null),
            status: job.status.to_string(),
            scheduled_at: job.scheduled_at,
            created_at: job.created_at,
            updated_at: job.updated_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            retry_count: job.retry_count,
            max_retries: job.max_retries,
            error_message: job.error_message,
            worker_id: job.worker_id,
        }
    }
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobListResponse {
    pub jobs: Vec<JobResponse>,
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Notices
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct NoticeListResponse {
    pub notices: Vec<String>,
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
