pub mod config;
pub mod error;
pub mod executor;
pub mod exporter;
pub mod handler;
pub mod job;
pub mod job_queue;
pub mod launcher;
pub mod models;
pub mod scheduler;
pub mod state;
pub mod throttle;
pub mod traits;
pub mod worker;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use config::SyncConfig;
pub use error::AppError;
pub use executor::JobExecutor;
pub use exporter::BatchExporter;
pub use handler::{ExportTransition, ResponseHandler};
pub use job::{CreateJobRequest, ExportJob, JobArgs, JobOutcome, JobStatus};
pub use job_queue::JobQueue;
pub use launcher::{ExportLauncher, LaunchOutcome, StatusOverview};
pub use models::{ApiResponse, BatchReport, Collection, DataType, SourceItem, compute_hash};
pub use scheduler::Scheduler;
pub use state::{ExportState, ExportStatus, SyncStatus};
pub use throttle::Throttle;
pub use traits::{Formatter, ItemSource, Notice, NoticeSink, ProgressStore, Uploader};
pub use worker::{JobHandler, WorkerService};
