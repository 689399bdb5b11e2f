use std::fmt;
use std::future::Future;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{ApiResponse, Collection, DataType, SourceItem};
use crate::state::ExportState;

/// Persists one [`ExportState`] record per data type.
pub trait ProgressStore: Send + Sync + Clone {
    /// Load the record, or a defaulted one (version 0) if none was ever written.
    fn load(
        &self,
        data_type: DataType,
    ) -> impl Future<Output = Result<ExportState, AppError>> + Send;

    /// Replace the stored record with `state` if its version is still `expected_version`.
    ///
    /// Returns `false` without writing when another writer got there first.
    fn compare_and_set(
        &self,
        expected_version: u64,
        state: &ExportState,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;
}

/// Reads items from the commerce platform.
///
/// Pages must be stable-ordered (ascending id) so that offsets resume correctly,
/// and a page shorter than `limit` means the collection is exhausted.
pub trait ItemSource: Send + Sync + Clone {
    fn fetch_page(
        &self,
        data_type: DataType,
        collection: Collection,
        offset: u64,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<SourceItem>, AppError>> + Send;

    fn fetch_item(
        &self,
        data_type: DataType,
        item_id: &str,
    ) -> impl Future<Output = Result<Option<SourceItem>, AppError>> + Send;

    fn count(
        &self,
        data_type: DataType,
        collection: Collection,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;
}

/// Turns a source item into the payload record uploaded to the CRM.
pub trait Formatter: Send + Sync {
    fn format_item(&self, data_type: DataType, item: &SourceItem)
    -> Result<serde_json::Value, AppError>;

    /// Format a secondary item, adding a back-reference to its parent.
    fn format_secondary(
        &self,
        data_type: DataType,
        item: &SourceItem,
    ) -> Result<serde_json::Value, AppError> {
        let mut record = self.format_item(data_type, item)?;
        if let (Some(parent_id), Some(object)) = (&item.parent_id, record.as_object_mut()) {
            object.insert(
                data_type.parent_reference_key().to_string(),
                serde_json::json!([parent_id]),
            );
        }
        Ok(record)
    }
}

/// Uploads the item fields unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughFormatter;

impl Formatter for PassthroughFormatter {
    fn format_item(
        &self,
        _data_type: DataType,
        item: &SourceItem,
    ) -> Result<serde_json::Value, AppError> {
        match &item.fields {
            serde_json::Value::Object(_) => Ok(item.fields.clone()),
            other => Err(AppError::SourceError(format!(
                "Item {} is not a JSON object: {}",
                item.id, other
            ))),
        }
    }
}

/// Sends an upload body to a CRM endpoint.
///
/// Any HTTP status is a successful call here; only failures that leave no
/// status code (connection, timeout, unreadable body) are errors.
pub trait Uploader: Send + Sync + Clone {
    fn upload(
        &self,
        endpoint: &str,
        payload: &serde_json::Value,
    ) -> impl Future<Output = Result<ApiResponse, AppError>> + Send;
}

/// Rate budget shared by all workers.
pub trait RateConfig: Send + Sync {
    fn requests_per_minute(&self) -> u32;

    /// Workers the job queue runs in parallel.
    fn concurrent_batches(&self) -> u32;
}

/// Admin-facing notices about exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    ExportInProgress,
    ExportCompleted,
    ExportFailed,
}

impl Notice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Notice::ExportInProgress => "export_in_progress",
            Notice::ExportCompleted => "export_completed",
            Notice::ExportFailed => "export_failed",
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Notice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "export_in_progress" => Ok(Notice::ExportInProgress),
            "export_completed" => Ok(Notice::ExportCompleted),
            "export_failed" => Ok(Notice::ExportFailed),
            _ => Err(format!("Unknown notice: {}", s)),
        }
    }
}

/// Where export notices are shown to administrators.
pub trait NoticeSink: Send + Sync + Clone {
    /// Show a notice. Adding an already visible notice is a no-op.
    fn add(&self, notice: Notice) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Hide a notice. Removing an absent notice is a no-op.
    fn remove(&self, notice: Notice) -> impl Future<Output = Result<(), AppError>> + Send;

    fn list(&self) -> impl Future<Output = Result<Vec<Notice>, AppError>> + Send;
}
