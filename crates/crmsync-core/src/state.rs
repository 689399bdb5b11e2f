//! Persisted per-data-type export state.
//!
//! One [`ExportState`] record exists per [`DataType`]. It is created defaulted on
//! first read and only ever replaced as a whole through
//! [`ProgressStore::compare_and_set`], so the tracker offsets and the lifecycle
//! fields always move together.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{DataType, Tracker};
use crate::traits::ProgressStore;

/// Attempts made by [`modify_state`] before giving up on a contended record.
const MAX_CAS_ATTEMPTS: u32 = 5;

/// Lifecycle of one data type's export.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExportStatus {
    #[default]
    Idle,
    InProgress,
    Completed,
    Failed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl ExportStatus {
    pub fn failed() -> Self {
        ExportStatus::Failed { reason: None }
    }

    pub fn failed_with(reason: impl Into<String>) -> Self {
        ExportStatus::Failed {
            reason: Some(reason.into()),
        }
    }

    /// Storage name, without the failure reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStatus::Idle => "idle",
            ExportStatus::InProgress => "in_progress",
            ExportStatus::Completed => "completed",
            ExportStatus::Failed { .. } => "failed",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ExportStatus::Failed { reason } => reason.as_deref(),
            _ => None,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, ExportStatus::InProgress)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportStatus::Completed | ExportStatus::Failed { .. })
    }

    /// Rebuild a status from its storage name and optional failure reason.
    pub fn from_parts(status: &str, reason: Option<String>) -> Result<Self, String> {
        match status {
            "idle" => Ok(ExportStatus::Idle),
            "in_progress" => Ok(ExportStatus::InProgress),
            "completed" => Ok(ExportStatus::Completed),
            "failed" => Ok(ExportStatus::Failed { reason }),
            _ => Err(format!("Unknown export status: {}", status)),
        }
    }
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportStatus::Failed {
                reason: Some(reason),
            } => write!(f, "failed: {}", reason),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// Outcome of the most recent single-item synchronization of a data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(SyncStatus::Completed),
            "failed" => Ok(SyncStatus::Failed),
            _ => Err(format!("Unknown sync status: {}", s)),
        }
    }
}

/// Persisted export record of one data type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportState {
    pub data_type: DataType,
    pub status: ExportStatus,
    /// Primary collection offset.
    pub offset: u64,
    /// Secondary collection offset.
    pub sub_offset: u64,
    pub tracker_updated: Option<DateTime<Utc>>,
    pub exported_count: u64,
    pub total_count: Option<u64>,
    pub start_time: Option<DateTime<Utc>>,
    pub completed_time: Option<DateTime<Utc>>,
    /// Export generation. Continuation jobs carrying another run id are stale.
    pub run_id: Option<Uuid>,
    /// Caller-supplied id of the launch request that started the current run.
    pub request_id: Option<String>,
    pub last_sync: Option<SyncStatus>,
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Compare-and-set token. 0 means the record has never been written.
    pub version: u64,
}

impl ExportState {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            status: ExportStatus::Idle,
            offset: 0,
            sub_offset: 0,
            tracker_updated: None,
            exported_count: 0,
            total_count: None,
            start_time: None,
            completed_time: None,
            run_id: None,
            request_id: None,
            last_sync: None,
            last_sync_at: None,
            version: 0,
        }
    }

    pub fn tracker(&self) -> Tracker {
        Tracker {
            offset: self.offset,
            sub_offset: self.sub_offset,
            updated: self.tracker_updated,
        }
    }

    pub fn is_current_run(&self, run_id: Uuid) -> bool {
        self.run_id == Some(run_id)
    }

    /// Start a new export generation, superseding whatever run came before.
    pub fn reset(&mut self, run_id: Uuid, request_id: Option<String>, now: DateTime<Utc>) {
        self.status = ExportStatus::InProgress;
        self.offset = 0;
        self.sub_offset = 0;
        self.tracker_updated = None;
        self.exported_count = 0;
        self.total_count = None;
        self.start_time = Some(now);
        self.completed_time = None;
        self.run_id = Some(run_id);
        self.request_id = request_id;
    }

    pub fn record_sync(&mut self, status: SyncStatus, now: DateTime<Utc>) {
        self.last_sync = Some(status);
        self.last_sync_at = Some(now);
    }
}

/// Read-modify-write an export record with compare-and-set.
///
/// `mutate` is applied to a fresh copy of the stored record on every attempt and
/// must therefore be safe to run more than once. When it leaves the record
/// unchanged nothing is written.
pub async fn modify_state<P, F, T>(
    store: &P,
    data_type: DataType,
    mut mutate: F,
) -> Result<(ExportState, T), AppError>
where
    P: ProgressStore,
    F: FnMut(&mut ExportState) -> T + Send,
    T: Send,
{
    for attempt in 1..=MAX_CAS_ATTEMPTS {
        let current = store.load(data_type).await?;
        let mut next = current.clone();
        let output = mutate(&mut next);

        if next == current {
            return Ok((current, output));
        }

        next.version = current.version + 1;
        if store.compare_and_set(current.version, &next).await? {
            return Ok((next, output));
        }

        tracing::debug!(%data_type, attempt, "Export state changed underneath us, retrying");
    }

    Err(AppError::StateConflict(data_type.to_string()))
}

/// True when any of `data_types` has an export in progress.
pub async fn export_in_progress<P: ProgressStore>(
    store: &P,
    data_types: &[DataType],
) -> Result<bool, AppError> {
    for data_type in data_types {
        if store.load(*data_type).await?.status.is_in_progress() {
            return Ok(true);
        }
    }
    Ok(false)
}
