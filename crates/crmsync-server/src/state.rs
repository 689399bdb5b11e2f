use crmsync_core::{ExportLauncher, Scheduler};
use crmsync_db::{Database, ExportStateRepository, NoticeRepository, SyncJobRepository};

pub type PgLauncher = ExportLauncher<ExportStateRepository, SyncJobRepository, NoticeRepository>;

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    pub db: Database,
    /// Bearer token required on every `/v1` route.
    pub api_key: String,
}

impl AppState {
    pub fn new(db: Database, api_key: impl Into<String>) -> Self {
        Self {
            db,
            api_key: api_key.into(),
        }
    }

    pub fn scheduler(&self) -> Scheduler<SyncJobRepository> {
        Scheduler::new(self.db.job_repo())
    }

    pub fn launcher(&self) -> PgLauncher {
        ExportLauncher::new(
            self.db.progress_repo(),
            self.scheduler(),
            self.db.notice_repo(),
        )
    }
}
