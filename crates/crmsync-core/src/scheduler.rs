use uuid::Uuid;

use crate::error::AppError;
use crate::job::{CreateJobRequest, ExportJob};
use crate::job_queue::JobQueue;
use crate::models::DataType;

/// Enqueues sync and export jobs, suppressing duplicates of pending work.
#[derive(Clone)]
pub struct Scheduler<Q: JobQueue> {
    queue: Q,
}

impl<Q: JobQueue> Scheduler<Q> {
    pub fn new(queue: Q) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Schedule an upload of one changed item.
    ///
    /// Without `force`, nothing is enqueued while an equivalent job is still
    /// pending. Returns the new job, or `None` when the call was deduplicated.
    pub async fn schedule_single_update(
        &self,
        data_type: DataType,
        item_id: &str,
        force: bool,
    ) -> Result<Option<ExportJob>, AppError> {
        let request = CreateJobRequest::sync_item(data_type, item_id);
        let job = if force {
            Some(self.queue.create_job(request).await?)
        } else {
            self.queue.create_unique_job(request).await?
        };

        match &job {
            Some(job) => {
                tracing::info!(
                    %data_type,
                    %item_id,
                    job_id = %job.id,
                    force,
                    "Sync scheduled"
                );
            }
            None => {
                tracing::debug!(%data_type, %item_id, "Sync already pending");
            }
        }

        Ok(job)
    }

    /// Schedule the export page starting at `offset` for run `run_id`.
    pub async fn schedule_export_page(
        &self,
        data_type: DataType,
        offset: u64,
        run_id: Uuid,
    ) -> Result<Option<ExportJob>, AppError> {
        let request = CreateJobRequest::export_page(data_type, offset, run_id);
        let job = self.queue.create_unique_job(request).await?;

        if let Some(job) = &job {
            tracing::info!(%data_type, offset, %run_id, job_id = %job.id, "Export page scheduled");
        }

        Ok(job)
    }

    /// True when any export page of `data_type` is waiting to run.
    pub async fn has_pending_export(&self, data_type: DataType) -> Result<bool, AppError> {
        self.queue
            .has_pending(&data_type.export_hook(), None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobArgs;
    use crate::testutil::MockJobQueue;

    #[tokio::test]
    async fn test_identical_calls_yield_one_pending_job() {
        let queue = MockJobQueue::empty();
        let scheduler = Scheduler::new(queue.clone());

        let first = scheduler
            .schedule_single_update(DataType::Product, "42", false)
            .await
            .unwrap();
        assert!(first.is_some());

        for _ in 0..4 {
            let again = scheduler
                .schedule_single_update(DataType::Product, "42", false)
                .await
                .unwrap();
            assert!(again.is_none());
        }

        assert_eq!(queue.pending().len(), 1);
        assert_eq!(queue.pending()[0].args, JobArgs::item("42"));
    }

    #[tokio::test]
    async fn test_force_always_enqueues() {
        let queue = MockJobQueue::empty();
        let scheduler = Scheduler::new(queue.clone());

        scheduler
            .schedule_single_update(DataType::Customer, "7", false)
            .await
            .unwrap();
        let forced = scheduler
            .schedule_single_update(DataType::Customer, "7", true)
            .await
            .unwrap();

        assert!(forced.is_some());
        assert_eq!(queue.pending().len(), 2);
    }

    #[tokio::test]
    async fn test_different_items_and_types_are_not_duplicates() {
        let queue = MockJobQueue::empty();
        let scheduler = Scheduler::new(queue.clone());

        scheduler
            .schedule_single_update(DataType::Product, "1", false)
            .await
            .unwrap();
        scheduler
            .schedule_single_update(DataType::Product, "2", false)
            .await
            .unwrap();
        scheduler
            .schedule_single_update(DataType::Sale, "1", false)
            .await
            .unwrap();

        assert_eq!(queue.pending().len(), 3);
    }

    #[tokio::test]
    async fn test_completed_job_does_not_block_new_schedule() {
        let queue = MockJobQueue::empty();
        let scheduler = Scheduler::new(queue.clone());

        let job = scheduler
            .schedule_single_update(DataType::Sale, "5", false)
            .await
            .unwrap()
            .unwrap();
        queue.complete_job(job.id).await.unwrap();

        let again = scheduler
            .schedule_single_update(DataType::Sale, "5", false)
            .await
            .unwrap();
        assert!(again.is_some());
    }

    #[tokio::test]
    async fn test_pending_export_detection() {
        let queue = MockJobQueue::empty();
        let scheduler = Scheduler::new(queue.clone());
        let run_id = Uuid::new_v4();

        assert!(!scheduler.has_pending_export(DataType::Product).await.unwrap());

        scheduler
            .schedule_export_page(DataType::Product, 0, run_id)
            .await
            .unwrap();
        let duplicate = scheduler
            .schedule_export_page(DataType::Product, 0, run_id)
            .await
            .unwrap();

        assert!(duplicate.is_none());
        assert!(scheduler.has_pending_export(DataType::Product).await.unwrap());
        assert!(!scheduler.has_pending_export(DataType::Sale).await.unwrap());
    }
}
