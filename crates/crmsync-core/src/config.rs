use std::time::Duration;

use crate::error::AppError;
use crate::traits::RateConfig;

pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 180;
pub const DEFAULT_CONCURRENT_BATCHES: u32 = 1;
pub const DEFAULT_PAGE_SIZE: usize = 500;
pub const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(60);

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Request budget of the CRM API.
    pub requests_per_minute: u32,
    /// Workers running jobs in parallel.
    pub concurrent_batches: u32,
    /// Items per export page.
    pub page_size: usize,
    /// Delay before a rate-limited export page is retried.
    pub rate_limit_backoff: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            concurrent_batches: DEFAULT_CONCURRENT_BATCHES,
            page_size: DEFAULT_PAGE_SIZE,
            rate_limit_backoff: DEFAULT_RATE_LIMIT_BACKOFF,
        }
    }
}

impl SyncConfig {
    /// Read configuration from environment variables.
    ///
    /// - `CRMSYNC_REQUESTS_PER_MINUTE` (optional, defaults to 180)
    /// - `CRMSYNC_CONCURRENT_BATCHES` (optional, defaults to 1)
    /// - `CRMSYNC_PAGE_SIZE` (optional, defaults to 500)
    /// - `CRMSYNC_RATE_LIMIT_BACKOFF_SECS` (optional, defaults to 60)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let requests_per_minute = positive(
            &lookup,
            "CRMSYNC_REQUESTS_PER_MINUTE",
            DEFAULT_REQUESTS_PER_MINUTE,
        )?;
        let concurrent_batches = positive(
            &lookup,
            "CRMSYNC_CONCURRENT_BATCHES",
            DEFAULT_CONCURRENT_BATCHES,
        )?;
        let page_size = positive(&lookup, "CRMSYNC_PAGE_SIZE", DEFAULT_PAGE_SIZE)?;
        let backoff_secs = positive(
            &lookup,
            "CRMSYNC_RATE_LIMIT_BACKOFF_SECS",
            DEFAULT_RATE_LIMIT_BACKOFF.as_secs(),
        )?;

        Ok(Self {
            requests_per_minute,
            concurrent_batches,
            page_size,
            rate_limit_backoff: Duration::from_secs(backoff_secs),
        })
    }

    pub fn with_requests_per_minute(mut self, rpm: u32) -> Self {
        self.requests_per_minute = rpm;
        self
    }

    pub fn with_concurrent_batches(mut self, batches: u32) -> Self {
        self.concurrent_batches = batches;
        self
    }

    /// Apply a worker count chosen at launch, so pacing follows the workers
    /// that actually run. `None` keeps the configured count.
    pub fn with_workers(self, workers: Option<u32>) -> Self {
        let batches = workers.unwrap_or(self.concurrent_batches).max(1);
        self.with_concurrent_batches(batches)
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

impl RateConfig for SyncConfig {
    fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    fn concurrent_batches(&self) -> u32 {
        self.concurrent_batches
    }
}

fn positive<T: TryFrom<u64>>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError> {
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    let parsed: u64 = raw.trim().parse().map_err(|_| {
        AppError::ConfigError(format!(
            "Invalid {key} '{raw}': must be a positive integer"
        ))
    })?;
    if parsed == 0 {
        return Err(AppError::ConfigError(format!("{key} must be at least 1")));
    }
    T::try_from(parsed)
        .map_err(|_| AppError::ConfigError(format!("{key} '{raw}' is out of range")))
}
