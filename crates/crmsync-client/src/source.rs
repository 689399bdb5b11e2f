//! Item source backed by JSON Lines exports of the commerce platform.
//!
//! A source directory holds one file per collection:
//!
//! | Data type | Primary | Secondary |
//! |---|---|---|
//! | customer | `customers.jsonl` | `customer_variants.jsonl` |
//! | product | `products.jsonl` | `product_variants.jsonl` |
//! | sale | `sales.jsonl` | `sale_variants.jsonl` |
//!
//! Each line is a JSON object with an `id` (string or number). Secondary items
//! also carry a `parent_id`. Missing files are empty collections.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use crmsync_core::error::AppError;
use crmsync_core::models::{Collection, DataType, SourceItem};
use crmsync_core::traits::ItemSource;

#[derive(Debug, Clone)]
pub struct JsonlSource {
    dir: PathBuf,
}

impl JsonlSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, data_type: DataType, collection: Collection) -> PathBuf {
        let file = match collection {
            Collection::Primary => format!("{}.jsonl", data_type.payload_key()),
            Collection::Secondary => format!("{}_variants.jsonl", data_type.as_str()),
        };
        self.dir.join(file)
    }

    /// All items of a collection, sorted by id.
    async fn read_all(
        &self,
        data_type: DataType,
        collection: Collection,
    ) -> Result<Vec<SourceItem>, AppError> {
        let path = self.path(data_type, collection);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => {
                return Err(AppError::SourceError(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        let mut items = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            items.push(parse_line(line).map_err(|e| {
                AppError::SourceError(format!("{}:{}: {e}", path.display(), index + 1))
            })?);
        }
        items.sort_by(|a, b| compare_ids(&a.id, &b.id));
        Ok(items)
    }
}

fn parse_line(line: &str) -> Result<SourceItem, String> {
    let fields: serde_json::Value = serde_json::from_str(line).map_err(|e| e.to_string())?;
    let id = id_field(&fields, "id").ok_or("missing 'id'")?;
    let parent_id = id_field(&fields, "parent_id");
    Ok(SourceItem {
        id,
        parent_id,
        fields,
    })
}

fn id_field(fields: &serde_json::Value, key: &str) -> Option<String> {
    match fields.get(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numeric ids sort numerically, before any non-numeric ones.
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

impl ItemSource for JsonlSource {
    async fn fetch_page(
        &self,
        data_type: DataType,
        collection: Collection,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<SourceItem>, AppError> {
        let items = self.read_all(data_type, collection).await?;
        Ok(items
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(limit)
            .collect())
    }

    async fn fetch_item(
        &self,
        data_type: DataType,
        item_id: &str,
    ) -> Result<Option<SourceItem>, AppError> {
        for collection in [Collection::Primary, Collection::Secondary] {
            let items = self.read_all(data_type, collection).await?;
            if let Some(item) = items.into_iter().find(|item| item.id == item_id) {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    async fn count(&self, data_type: DataType, collection: Collection) -> Result<u64, AppError> {
        Ok(self.read_all(data_type, collection).await?.len() as u64)
    }
}
