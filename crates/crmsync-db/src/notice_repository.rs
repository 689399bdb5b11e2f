use sqlx::{PgPool, Pool, Postgres};

use crmsync_core::error::AppError;
use crmsync_core::traits::{Notice, NoticeSink};

/// Admin notices stored in PostgreSQL.
#[derive(Clone)]
pub struct NoticeRepository {
    pool: Pool<Postgres>,
}

impl NoticeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl NoticeSink for NoticeRepository {
    async fn add(&self, notice: Notice) -> Result<(), AppError> {
        sqlx::query(
            r#"INSERT INTO notices (notice) VALUES ($1) ON CONFLICT (notice) DO NOTHING"#,
        )
        .bind(notice.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn remove(&self, notice: Notice) -> Result<(), AppError> {
        sqlx::query(r#"DELETE FROM notices WHERE notice = $1"#)
            .bind(notice.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<Notice>, AppError> {
        let rows: Vec<(String,)> =
            sqlx::query_as(r#"SELECT notice FROM notices ORDER BY created_at ASC, notice ASC"#)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(|(notice,)| notice.parse().map_err(AppError::DatabaseError))
            .collect()
    }
}
