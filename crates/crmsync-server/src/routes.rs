use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crmsync_core::job_queue::JobQueue;
use crmsync_core::models::DataType;
use crmsync_core::traits::NoticeSink;

use crate::auth::require_api_key;
use crate::dto::{
    ErrorResponse, ExportStatusResponse, HealthResponse, JobListResponse, JobResponse,
    LaunchExportRequest, LaunchExportResponse, ListJobsQuery, NoticeListResponse, SyncQuery,
    SyncResponse,
};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Build the full router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/v1/exports", get(export_status))
        .route("/v1/exports/{data_type}", post(launch_export))
        .route("/v1/sync/{data_type}/{item_id}", post(schedule_sync))
        .route("/v1/jobs", get(list_jobs))
        .route("/v1/jobs/{id}", get(get_job).delete(cancel_job))
        .route("/v1/notices", get(list_notices))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let public = Router::new()
        .route("/health", get(health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    public.merge(api).with_state(state)
}

fn parse_data_type(raw: &str) -> Result<DataType, ApiError> {
    raw.parse().map_err(ApiError::bad_request)
}

fn not_found(message: String) -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        axum::Json(ErrorResponse::new("not_found", message)),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Exports
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/exports/{data_type}",
    params(
        ("data_type" = String, Path, description = "customer, product or sale")
    ),
    request_body = LaunchExportRequest,
    responses(
        (status = 202, description = "Launch handled", body = LaunchExportResponse),
        (status = 400, description = "Unknown data type", body = ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "exports"
)]
pub async fn launch_export(
    State(state): State<Arc<AppState>>,
    Path(data_type): Path<String>,
    axum::Json(body): axum::Json<LaunchExportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let data_type = parse_data_type(&data_type)?;
    let outcome = state
        .launcher()
        .launch_export(data_type, body.request_id)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        axum::Json(LaunchExportResponse::new(data_type.as_str(), outcome)),
    ))
}

#[utoipa::path(
    get,
    path = "/v1/exports",
    responses(
        (status = 200, description = "Export state of every data type", body = ExportStatusResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "exports"
)]
pub async fn export_status(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let overview = state.launcher().export_status().await?;
    Ok(axum::Json(ExportStatusResponse::from(overview)))
}

// ---------------------------------------------------------------------------
// Item sync
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/sync/{data_type}/{item_id}",
    params(
        ("data_type" = String, Path, description = "customer, product or sale"),
        ("item_id" = String, Path, description = "Id of the changed item"),
        SyncQuery,
    ),
    responses(
        (status = 202, description = "Sync scheduled", body = SyncResponse),
        (status = 200, description = "An equivalent sync is already pending", body = SyncResponse),
        (status = 400, description = "Unknown data type", body = ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "sync"
)]
pub async fn schedule_sync(
    State(state): State<Arc<AppState>>,
    Path((data_type, item_id)): Path<(String, String)>,
    Query(query): Query<SyncQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let data_type = parse_data_type(&data_type)?;
    let job = state
        .scheduler()
        .schedule_single_update(data_type, &item_id, query.force.unwrap_or(false))
        .await?;

    let (status, response) = match job {
        Some(job) => (
            StatusCode::ACCEPTED,
            SyncResponse {
                scheduled: true,
                job_id: Some(job.id),
            },
        ),
        None => (
            StatusCode::OK,
            SyncResponse {
                scheduled: false,
                job_id: None,
            },
        ),
    };

    Ok((status, axum::Json(response)))
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/jobs",
    params(ListJobsQuery),
    responses(
        (status = 200, description = "List of jobs", body = JobListResponse),
        (status = 400, description = "Unknown status", body = ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "jobs"
)]
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListJobsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status_filter = query
        .status
        .map(|s| s.parse().map_err(ApiError::bad_request))
        .transpose()?;

    let limit = query.limit.unwrap_or(20).min(100);
    let jobs = state.db.job_repo().list_jobs(status_filter, limit).await?;
    let total = jobs.len();

    let response = JobListResponse {
        jobs: jobs.into_iter().map(JobResponse::from).collect(),
        total,
    };

    Ok(axum::Json(response))
}

#[utoipa::path(
    get,
    path = "/v1/jobs/{id}",
    params(
        ("id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job details", body = JobResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "jobs"
)]
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    match state.db.job_repo().get_job(id).await? {
        Some(job) => Ok(axum::Json(JobResponse::from(job)).into_response()),
        None => Ok(not_found(format!("Job not found: {id}"))),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/jobs/{id}",
    params(
        ("id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 204, description = "Job cancelled"),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 409, description = "Conflict", body = ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "jobs"
)]
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = state.db.job_repo();
    match repo.get_job(id).await? {
        Some(job) if job.status.is_terminal() => {
            let body = ErrorResponse::new(
                "conflict",
                format!("Job {id} is already in terminal state: {}", job.status),
            );
            Ok((StatusCode::CONFLICT, axum::Json(body)).into_response())
        }
        Some(_) => {
            repo.cancel_job(id).await?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        None => Ok(not_found(format!("Job not found: {id}"))),
    }
}

// ---------------------------------------------------------------------------
// Notices
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/notices",
    responses(
        (status = 200, description = "Active admin notices", body = NoticeListResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "exports"
)]
pub async fn list_notices(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let notices = state.db.notice_repo().list().await?;
    Ok(axum::Json(NoticeListResponse {
        notices: notices.iter().map(|n| n.as_str().to_string()).collect(),
    }))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let healthy = state.db.health_check().await.is_ok();

    let (status, response) = if healthy {
        (
            StatusCode::OK,
            HealthResponse {
                status: "healthy",
                database: "ok",
            },
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            HealthResponse {
                status: "unhealthy",
                database: "error",
            },
        )
    };

    (status, axum::Json(response))
}
