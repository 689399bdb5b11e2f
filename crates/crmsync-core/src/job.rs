use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{DataType, compute_hash};

/// Status of a job in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// Arguments carried by a job. Together with the hook they form the job identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobArgs {
    /// Upload a single changed item.
    Item { item_id: String },
    /// Process the next export page of run `run_id`.
    Page { offset: u64, run_id: Uuid },
}

impl JobArgs {
    pub fn item(item_id: impl Into<String>) -> Self {
        JobArgs::Item {
            item_id: item_id.into(),
        }
    }

    pub fn page(offset: u64, run_id: Uuid) -> Self {
        JobArgs::Page { offset, run_id }
    }

    /// Stable digest of the arguments, used to find equivalent pending jobs.
    pub fn signature(&self) -> String {
        let canonical = match self {
            JobArgs::Item { item_id } => format!("item:{item_id}"),
            JobArgs::Page { offset, run_id } => format!("page:{offset}:{run_id}"),
        };
        compute_hash(&canonical)
    }

    pub fn hook(&self, data_type: DataType) -> String {
        match self {
            JobArgs::Item { .. } => data_type.sync_hook(),
            JobArgs::Page { .. } => data_type.export_hook(),
        }
    }
}

/// Retry configuration with exponential backoff.
///
/// Delay schedule: 1min, 5min, 30min, 60min (capped).
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub max_delay: TimeDelta,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_delay: TimeDelta::minutes(60),
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt number (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> TimeDelta {
        let delay = match attempt {
            0 | 1 => TimeDelta::minutes(1),
            2 => TimeDelta::minutes(5),
            3 => TimeDelta::minutes(30),
            _ => TimeDelta::minutes(60),
        };
        std::cmp::min(delay, self.max_delay)
    }
}

/// A deferred unit of work in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportJob {
    pub id: Uuid,
    pub hook: String,
    pub data_type: DataType,
    pub args: JobArgs,
    pub status: JobStatus,
    /// Earliest time the job may be claimed.
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

impl ExportJob {
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn calculate_next_retry(&self, config: &RetryConfig) -> DateTime<Utc> {
        let delay = config.delay_for_attempt(self.retry_count + 1);
        Utc::now() + delay
    }

    pub fn args_signature(&self) -> String {
        self.args.signature()
    }
}

/// Request to enqueue a new job.
#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    pub data_type: DataType,
    pub args: JobArgs,
    pub scheduled_at: DateTime<Utc>,
    pub max_retries: Option<u32>,
}

impl CreateJobRequest {
    pub fn new(data_type: DataType, args: JobArgs) -> Self {
        Self {
            data_type,
            args,
            scheduled_at: Utc::now(),
            max_retries: None,
        }
    }

    pub fn sync_item(data_type: DataType, item_id: impl Into<String>) -> Self {
        Self::new(data_type, JobArgs::item(item_id))
    }

    pub fn export_page(data_type: DataType, offset: u64, run_id: Uuid) -> Self {
        Self::new(data_type, JobArgs::page(offset, run_id))
    }

    /// Delay the earliest execution time by `delay` from now.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.scheduled_at = Utc::now() + TimeDelta::from_std(delay).unwrap_or(TimeDelta::zero());
        self
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = Some(max);
        self
    }

    pub fn hook(&self) -> String {
        self.args.hook(self.data_type)
    }

    pub fn args_signature(&self) -> String {
        self.args.signature()
    }
}

/// How a finished job execution should be settled in the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job is done; any follow-up work has already been scheduled.
    Continue,
    /// Run the same job again after the delay.
    RetryAfter(Duration),
    /// The job failed for good and must not be retried.
    Fatal(String),
}

/// Configuration for a worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub poll_interval: Duration,
    pub retry_config: RetryConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", &Uuid::new_v4().to_string()[..8]),
            poll_interval: Duration::from_secs(5),
            retry_config: RetryConfig::default(),
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
