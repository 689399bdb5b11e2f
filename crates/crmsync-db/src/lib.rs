pub mod config;
pub mod database;
pub mod job_repository;
pub mod notice_repository;
pub mod progress_repository;

pub use config::DatabaseConfig;
pub use database::Database;
pub use job_repository::SyncJobRepository;
pub use notice_repository::NoticeRepository;
pub use progress_repository::ExportStateRepository;
