use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Sentinel code reported by a page run when neither collection has items left.
pub const NOTHING_TO_EXPORT: u16 = 220;

/// Sentinel code reported by a page run when the upload never produced a response.
pub const TRANSPORT_FAILURE: u16 = 444;

/// An entity category synchronized to the CRM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Customer,
    Product,
    Sale,
}

impl DataType {
    /// Every data type, in the order exports are listed.
    pub const ALL: [DataType; 3] = [DataType::Customer, DataType::Product, DataType::Sale];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Customer => "customer",
            DataType::Product => "product",
            DataType::Sale => "sale",
        }
    }

    /// Upload endpoint path on the CRM API.
    pub fn endpoint(&self) -> &'static str {
        match self {
            DataType::Customer => "/customers/upload/",
            DataType::Product => "/products/upload/",
            DataType::Sale => "/sales/upload/",
        }
    }

    /// Top-level key wrapping the item list in an upload body.
    pub fn payload_key(&self) -> &'static str {
        match self {
            DataType::Customer => "customers",
            DataType::Product => "products",
            DataType::Sale => "sales",
        }
    }

    /// Field a secondary item uses to point back at its parent.
    pub fn parent_reference_key(&self) -> &'static str {
        match self {
            DataType::Product => "main_product_ids",
            DataType::Customer | DataType::Sale => "parent_ids",
        }
    }

    /// Queue hook for single-item synchronization jobs.
    pub fn sync_hook(&self) -> String {
        format!("crmsync_{}_sync", self.as_str())
    }

    /// Queue hook for paginated export jobs.
    pub fn export_hook(&self) -> String {
        format!("crmsync_{}_export", self.as_str())
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "customer" | "customers" => Ok(DataType::Customer),
            "product" | "products" => Ok(DataType::Product),
            "sale" | "sales" => Ok(DataType::Sale),
            _ => Err(format!("Unknown data type: {}", s)),
        }
    }
}

/// Which collection of a data type a page is read from.
///
/// Products have variants as their secondary collection; the other data types
/// only have a primary one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Primary,
    Secondary,
}

/// A raw item as read from the commerce platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceItem {
    pub id: String,
    /// Parent item id, set for secondary items (e.g. a variant's product).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub fields: serde_json::Value,
}

impl SourceItem {
    pub fn new(id: impl Into<String>, fields: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            fields,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// Response of the CRM upload transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub code: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(code: u16, body: impl Into<String>) -> Self {
        Self {
            code,
            body: body.into(),
        }
    }

    /// 200 and 201 both mean the CRM accepted the upload.
    pub fn is_success(&self) -> bool {
        matches!(self.code, 200 | 201)
    }
}

/// Formatted items for one upload call.
#[derive(Debug, Clone)]
pub struct UploadBatch {
    pub data_type: DataType,
    pub items: Vec<serde_json::Value>,
}

impl UploadBatch {
    pub fn new(data_type: DataType, items: Vec<serde_json::Value>) -> Self {
        Self { data_type, items }
    }

    pub fn single(data_type: DataType, item: serde_json::Value) -> Self {
        Self::new(data_type, vec![item])
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Wire body: `{ "<data type>s": [ ... ] }`.
    pub fn into_payload(self) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        body.insert(
            self.data_type.payload_key().to_string(),
            serde_json::Value::Array(self.items),
        );
        serde_json::Value::Object(body)
    }
}

/// Pagination position of an export, persisted after every accepted page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracker {
    pub offset: u64,
    #[serde(rename = "variant_offset")]
    pub sub_offset: u64,
    pub updated: Option<DateTime<Utc>>,
}

impl Tracker {
    /// Items exported so far across both collections.
    pub fn position(&self) -> u64 {
        self.offset + self.sub_offset
    }
}

/// Result of processing one export page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub code: u16,
    pub body: String,
    /// Items exported before this page (primary plus secondary offset).
    pub start: u64,
    /// Items included in the page (primary plus secondary).
    pub count: usize,
    /// Tracker after the page, when it was persisted.
    pub tracker: Option<Tracker>,
}

impl BatchReport {
    pub fn nothing_to_export(start: u64) -> Self {
        Self {
            code: NOTHING_TO_EXPORT,
            body: String::new(),
            start,
            count: 0,
            tracker: None,
        }
    }

    pub fn transport_failure(start: u64, message: impl Into<String>) -> Self {
        Self {
            code: TRANSPORT_FAILURE,
            body: message.into(),
            start,
            count: 0,
            tracker: None,
        }
    }

    pub fn uploaded(
        response: ApiResponse,
        start: u64,
        count: usize,
        tracker: Option<Tracker>,
    ) -> Self {
        Self {
            code: response.code,
            body: response.body,
            start,
            count,
            tracker,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.code == NOTHING_TO_EXPORT
    }

    pub fn response(&self) -> ApiResponse {
        ApiResponse::new(self.code, self.body.clone())
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
