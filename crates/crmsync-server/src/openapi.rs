use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "crmsync API",
        version = "0.1.0",
        description = "Rate-limited synchronization of commerce data into a CRM."
    ),
    paths(
        crate::routes::launch_export,
        crate::routes::export_status,
        crate::routes::schedule_sync,
        crate::routes::list_jobs,
        crate::routes::get_job,
        crate::routes::cancel_job,
        crate::routes::list_notices,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::LaunchExportRequest,
        crate::dto::LaunchExportResponse,
        crate::dto::ExportStateResponse,
        crate::dto::ExportStatusResponse,
        crate::dto::SyncResponse,
        crate::dto::JobResponse,
        crate::dto::JobListResponse,
        crate::dto::NoticeListResponse,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "exports", description = "Full exports and their notices"),
        (name = "sync", description = "Single-item synchronization"),
        (name = "jobs", description = "Queued job inspection"),
        (name = "system", description = "Health and system status"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Adds the bearer security scheme referenced by the protected routes.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("token")
                        .description(Some("Set via the CRMSYNC_SERVER_API_KEY environment variable."))
                        .build(),
                ),
            );
        }
    }
}
