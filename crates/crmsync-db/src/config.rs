use std::time::Duration;

use crmsync_core::AppError;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for the store holding the job queue, export states and notices.
///
/// Every crmsync worker holds a connection while it claims and settles a job,
/// so `max_connections` should be at least `CRMSYNC_CONCURRENT_BATCHES`.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// How long a caller waits for a free pooled connection.
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    /// Read configuration from environment variables.
    ///
    /// - `DATABASE_URL` (required)
    /// - `DATABASE_MAX_CONNECTIONS` (optional, defaults to 5)
    /// - `DATABASE_ACQUIRE_TIMEOUT_SECS` (optional, defaults to 30)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                AppError::ConfigError(
                    "DATABASE_URL not set. crmsync keeps its queue and export state in PostgreSQL."
                        .into(),
                )
            })?;

        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            None => DEFAULT_MAX_CONNECTIONS,
            Some(raw) => {
                let parsed: u32 = raw.trim().parse().map_err(|_| {
                    AppError::ConfigError(format!(
                        "Invalid DATABASE_MAX_CONNECTIONS '{raw}': must be a positive integer"
                    ))
                })?;
                if parsed == 0 {
                    return Err(AppError::ConfigError(
                        "DATABASE_MAX_CONNECTIONS must be at least 1".into(),
                    ));
                }
                parsed
            }
        };

        let acquire_timeout = match lookup("DATABASE_ACQUIRE_TIMEOUT_SECS") {
            None => DEFAULT_ACQUIRE_TIMEOUT,
            Some(raw) => raw
                .trim()
                .parse()
                .map(Duration::from_secs)
                .map_err(|_| {
                    AppError::ConfigError(format!(
                        "Invalid DATABASE_ACQUIRE_TIMEOUT_SECS '{raw}': must be a whole number of seconds"
                    ))
                })?,
        };

        Ok(Self {
            url,
            max_connections,
            acquire_timeout,
        })
    }
}
