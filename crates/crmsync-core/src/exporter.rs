//! Paginated export of a data type, one page per call.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ApiResponse, BatchReport, Collection, DataType, UploadBatch};
use crate::traits::{Formatter, ItemSource, ProgressStore, Uploader};

/// Reads pages from an [`ItemSource`], uploads them and advances the tracker.
#[derive(Clone)]
pub struct BatchExporter<P, S, U>
where
    P: ProgressStore,
    S: ItemSource,
    U: Uploader,
{
    store: P,
    source: S,
    uploader: U,
    formatter: Arc<dyn Formatter>,
    page_size: usize,
}

impl<P, S, U> BatchExporter<P, S, U>
where
    P: ProgressStore,
    S: ItemSource,
    U: Uploader,
{
    pub fn new(
        store: P,
        source: S,
        uploader: U,
        formatter: Arc<dyn Formatter>,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            source,
            uploader,
            formatter,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Export the next page of run `run_id`.
    ///
    /// Primary items are read first; once the primary collection comes back
    /// short, the page is topped up from the secondary collection. Offsets are
    /// only advanced when the CRM accepted the upload.
    ///
    /// Returns `None` without uploading when `run_id` is no longer the
    /// in-progress run.
    pub async fn batch_update(
        &self,
        data_type: DataType,
        run_id: Uuid,
    ) -> Result<Option<BatchReport>, AppError> {
        let state = self.store.load(data_type).await?;
        if !state.is_current_run(run_id) || !state.status.is_in_progress() {
            tracing::debug!(%data_type, %run_id, current_run = ?state.run_id, "Run superseded, page skipped");
            return Ok(None);
        }
        let start = state.tracker().position();
        let limit = self.page_size;

        let mut records = Vec::new();
        let mut primary_count = 0usize;
        let mut secondary_count = 0usize;

        // A non-zero secondary offset means the primary collection is already done.
        if state.sub_offset == 0 {
            let primary = self
                .source
                .fetch_page(data_type, Collection::Primary, state.offset, limit)
                .await?;
            primary_count = primary.len();
            for item in &primary {
                records.push(self.formatter.format_item(data_type, item)?);
            }
        }

        if primary_count < limit {
            let secondary = self
                .source
                .fetch_page(data_type, Collection::Secondary, state.sub_offset, limit)
                .await?;
            secondary_count = secondary.len();
            for item in &secondary {
                records.push(self.formatter.format_secondary(data_type, item)?);
            }
        }

        if records.is_empty() {
            tracing::debug!(%data_type, offset = state.offset, sub_offset = state.sub_offset, "Nothing left to export");
            return Ok(Some(BatchReport::nothing_to_export(start)));
        }

        let count = records.len();
        let payload = UploadBatch::new(data_type, records).into_payload();
        let response = match self.uploader.upload(data_type.endpoint(), &payload).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(%data_type, error = %e, "Export upload failed");
                return Ok(Some(BatchReport::transport_failure(start, e.to_string())));
            }
        };

        if !response.is_success() {
            return Ok(Some(BatchReport::uploaded(response, start, count, None)));
        }

        let mut next = state.clone();
        next.offset += primary_count as u64;
        next.sub_offset += secondary_count as u64;
        next.tracker_updated = Some(Utc::now());
        next.version = state.version + 1;

        if !self.store.compare_and_set(state.version, &next).await? {
            return Err(AppError::StateConflict(data_type.to_string()));
        }

        tracing::debug!(
            %data_type,
            offset = next.offset,
            sub_offset = next.sub_offset,
            count,
            "Tracker saved"
        );

        Ok(Some(BatchReport::uploaded(
            response,
            start,
            count,
            Some(next.tracker()),
        )))
    }

    /// Upload one item as a single-record batch.
    ///
    /// Returns `None` without making a request when the item does not exist.
    pub async fn single_update(
        &self,
        data_type: DataType,
        item_id: &str,
    ) -> Result<Option<ApiResponse>, AppError> {
        let Some(item) = self.source.fetch_item(data_type, item_id).await? else {
            tracing::warn!(%data_type, %item_id, "Item not found, nothing uploaded");
            return Ok(None);
        };

        let record = if item.parent_id.is_some() {
            self.formatter.format_secondary(data_type, &item)?
        } else {
            self.formatter.format_item(data_type, &item)?
        };
        let payload = UploadBatch::single(data_type, record).into_payload();

        let response = self.uploader.upload(data_type.endpoint(), &payload).await?;
        Ok(Some(response))
    }
}
