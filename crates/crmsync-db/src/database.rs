use crmsync_core::AppError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::DatabaseConfig;
use crate::job_repository::SyncJobRepository;
use crate::notice_repository::NoticeRepository;
use crate::progress_repository::ExportStateRepository;

/// Owns the connection pool, runs migrations and hands out repositories.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL with the given configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect: {e}")))?;

        Ok(Self { pool })
    }

    /// Create a `Database` from an existing pool (useful for testing).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get a [`SyncJobRepository`] backed by this pool.
    pub fn job_repo(&self) -> SyncJobRepository {
        SyncJobRepository::new(self.pool.clone())
    }

    /// Get an [`ExportStateRepository`] backed by this pool.
    pub fn progress_repo(&self) -> ExportStateRepository {
        ExportStateRepository::new(self.pool.clone())
    }

    /// Get a [`NoticeRepository`] backed by this pool.
    pub fn notice_repo(&self) -> NoticeRepository {
        NoticeRepository::new(self.pool.clone())
    }

    /// Round-trip a trivial query to verify the pool can reach the database.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
