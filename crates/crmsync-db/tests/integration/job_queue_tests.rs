use std::time::Duration;

use chrono::{TimeDelta, Utc};
use crmsync_core::job::{CreateJobRequest, JobArgs, JobStatus};
use crmsync_core::job_queue::JobQueue;
use crmsync_core::models::DataType;
use crmsync_db::SyncJobRepository;
use uuid::Uuid;

use crate::integration::common::setup_test_db;

#[tokio::test]
async fn create_job_and_verify_fields() {
    let (pool, _container) = setup_test_db().await;
    let repo = SyncJobRepository::new(pool);

    let job = repo
        .create_job(CreateJobRequest::sync_item(DataType::Product, "42"))
        .await
        .unwrap();

    assert_eq!(job.hook, "crmsync_product_sync");
    assert_eq!(job.data_type, DataType::Product);
    assert_eq!(job.args, JobArgs::item("42"));
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 0);
    assert_eq!(job.max_retries, 3);
    assert!(job.worker_id.is_none());
    assert!(job.started_at.is_none());
}

#[tokio::test]
async fn create_job_with_custom_max_retries() {
    let (pool, _container) = setup_test_db().await;
    let repo = SyncJobRepository::new(pool);

    let req = CreateJobRequest::sync_item(DataType::Sale, "1").with_max_retries(10);
    let job = repo.create_job(req).await.unwrap();

    assert_eq!(job.max_retries, 10);
}

#[tokio::test]
async fn page_args_survive_storage() {
    let (pool, _container) = setup_test_db().await;
    let repo = SyncJobRepository::new(pool);
    let run_id = Uuid::new_v4();

    let job = repo
        .create_job(CreateJobRequest::export_page(DataType::Customer, 1000, run_id))
        .await
        .unwrap();
    let fetched = repo.get_job(job.id).await.unwrap().unwrap();

    assert_eq!(fetched.hook, "crmsync_customer_export");
    assert_eq!(fetched.args, JobArgs::page(1000, run_id));
}

#[tokio::test]
async fn unique_job_is_not_duplicated_while_pending() {
    let (pool, _container) = setup_test_db().await;
    let repo = SyncJobRepository::new(pool);

    let first = repo
        .create_unique_job(CreateJobRequest::sync_item(DataType::Product, "7"))
        .await
        .unwrap();
    let second = repo
        .create_unique_job(CreateJobRequest::sync_item(DataType::Product, "7"))
        .await
        .unwrap();
    let other_item = repo
        .create_unique_job(CreateJobRequest::sync_item(DataType::Product, "8"))
        .await
        .unwrap();

    assert!(first.is_some());
    assert!(second.is_none());
    assert!(other_item.is_some());
    assert_eq!(repo.count_by_status(JobStatus::Pending).await.unwrap(), 2);
}

#[tokio::test]
async fn unique_job_is_accepted_again_once_claimed() {
    let (pool, _container) = setup_test_db().await;
    let repo = SyncJobRepository::new(pool);

    repo.create_unique_job(CreateJobRequest::sync_item(DataType::Sale, "3"))
        .await
        .unwrap();
    repo.claim_job("worker-1").await.unwrap().unwrap();

    let again = repo
        .create_unique_job(CreateJobRequest::sync_item(DataType::Sale, "3"))
        .await
        .unwrap();
    assert!(again.is_some());
}

#[tokio::test]
async fn concurrent_unique_jobs_insert_once() {
    let (pool, _container) = setup_test_db().await;
    let repo = SyncJobRepository::new(pool);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            repo.create_unique_job(CreateJobRequest::sync_item(DataType::Customer, "99"))
                .await
                .unwrap()
        }));
    }

    let mut inserted = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            inserted += 1;
        }
    }

    assert_eq!(inserted, 1);
    assert_eq!(repo.count_by_status(JobStatus::Pending).await.unwrap(), 1);
}

#[tokio::test]
async fn has_pending_by_hook_and_signature() {
    let (pool, _container) = setup_test_db().await;
    let repo = SyncJobRepository::new(pool);
    let run_id = Uuid::new_v4();

    let request = CreateJobRequest::export_page(DataType::Product, 0, run_id);
    let hook = request.hook();
    let signature = request.args_signature();
    repo.create_job(request).await.unwrap();

    assert!(repo.has_pending(&hook, None).await.unwrap());
    assert!(repo.has_pending(&hook, Some(&signature)).await.unwrap());
    assert!(
        !repo
            .has_pending(&hook, Some(&JobArgs::page(500, run_id).signature()))
            .await
            .unwrap()
    );
    assert!(
        !repo
            .has_pending(&DataType::Sale.export_hook(), None)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn claim_job_sets_running_and_worker() {
    let (pool, _container) = setup_test_db().await;
    let repo = SyncJobRepository::new(pool);

    repo.create_job(CreateJobRequest::sync_item(DataType::Product, "1"))
        .await
        .unwrap();

    let claimed = repo
        .claim_job("worker-1")
        .await
        .unwrap()
        .expect("Should claim the job");

    assert_eq!(claimed.status, JobStatus::Running);
    assert_eq!(claimed.worker_id.as_deref(), Some("worker-1"));
    assert!(claimed.started_at.is_some());
}

#[tokio::test]
async fn claim_job_returns_none_when_empty() {
    let (pool, _container) = setup_test_db().await;
    let repo = SyncJobRepository::new(pool);

    assert!(repo.claim_job("worker-1").await.unwrap().is_none());
}

#[tokio::test]
async fn claim_job_skips_future_jobs() {
    let (pool, _container) = setup_test_db().await;
    let repo = SyncJobRepository::new(pool);

    repo.create_job(
        CreateJobRequest::sync_item(DataType::Product, "1").with_delay(Duration::from_secs(3600)),
    )
    .await
    .unwrap();

    assert!(repo.claim_job("worker-1").await.unwrap().is_none());
}

#[tokio::test]
async fn claim_job_skips_running_jobs() {
    let (pool, _container) = setup_test_db().await;
    let repo = SyncJobRepository::new(pool);

    repo.create_job(CreateJobRequest::sync_item(DataType::Product, "1"))
        .await
        .unwrap();

    assert!(repo.claim_job("worker-1").await.unwrap().is_some());
    assert!(repo.claim_job("worker-2").await.unwrap().is_none());
}

#[tokio::test]
async fn claim_job_takes_earliest_scheduled_first() {
    let (pool, _container) = setup_test_db().await;
    let repo = SyncJobRepository::new(pool);

    let mut later = CreateJobRequest::sync_item(DataType::Product, "later");
    later.scheduled_at = Utc::now() - TimeDelta::seconds(5);
    let mut earlier = CreateJobRequest::sync_item(DataType::Product, "earlier");
    earlier.scheduled_at = Utc::now() - TimeDelta::seconds(60);

    repo.create_job(later).await.unwrap();
    repo.create_job(earlier).await.unwrap();

    let claimed = repo.claim_job("worker-1").await.unwrap().unwrap();
    assert_eq!(claimed.args, JobArgs::item("earlier"));
}

#[tokio::test]
async fn complete_job_sets_completed() {
    let (pool, _container) = setup_test_db().await;
    let repo = SyncJobRepository::new(pool);

    let job = repo
        .create_job(CreateJobRequest::sync_item(DataType::Sale, "1"))
        .await
        .unwrap();
    repo.claim_job("worker-1").await.unwrap();
    repo.complete_job(job.id).await.unwrap();

    let job = repo.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.completed_at.is_some());
    assert!(job.worker_id.is_none());
}

#[tokio::test]
async fn fail_job_with_retry_resets_to_pending() {
    let (pool, _container) = setup_test_db().await;
    let repo = SyncJobRepository::new(pool);

    let job = repo
        .create_job(CreateJobRequest::sync_item(DataType::Sale, "1"))
        .await
        .unwrap();
    repo.claim_job("worker-1").await.unwrap();

    let retry_at = Utc::now() + TimeDelta::minutes(5);
    repo.fail_job(job.id, "connection reset", Some(retry_at))
        .await
        .unwrap();

    let job = repo.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 1);
    assert_eq!(job.error_message.as_deref(), Some("connection reset"));
    assert!((job.scheduled_at - retry_at).num_seconds().abs() <= 1);
    assert!(job.worker_id.is_none());
}

#[tokio::test]
async fn fail_job_without_retry_is_permanent() {
    let (pool, _container) = setup_test_db().await;
    let repo = SyncJobRepository::new(pool);

    let job = repo
        .create_job(CreateJobRequest::sync_item(DataType::Sale, "1"))
        .await
        .unwrap();
    repo.claim_job("worker-1").await.unwrap();
    repo.fail_job(job.id, "Upload failed", None).await.unwrap();

    let job = repo.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 0);
}

#[tokio::test]
async fn reschedule_job_does_not_count_a_retry() {
    let (pool, _container) = setup_test_db().await;
    let repo = SyncJobRepository::new(pool);

    let job = repo
        .create_job(CreateJobRequest::export_page(DataType::Product, 0, Uuid::new_v4()))
        .await
        .unwrap();
    repo.claim_job("worker-1").await.unwrap();

    let run_at = Utc::now() + TimeDelta::seconds(60);
    repo.reschedule_job(job.id, run_at).await.unwrap();

    let job = repo.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 0);
    assert!(job.scheduled_at > Utc::now());
    assert!(repo.claim_job("worker-2").await.unwrap().is_none());
}

#[tokio::test]
async fn cancel_job_leaves_completed_jobs_alone() {
    let (pool, _container) = setup_test_db().await;
    let repo = SyncJobRepository::new(pool);

    let pending = repo
        .create_job(CreateJobRequest::sync_item(DataType::Customer, "1"))
        .await
        .unwrap();
    repo.cancel_job(pending.id).await.unwrap();
    assert_eq!(
        repo.get_job(pending.id).await.unwrap().unwrap().status,
        JobStatus::Cancelled
    );

    let done = repo
        .create_job(CreateJobRequest::sync_item(DataType::Customer, "2"))
        .await
        .unwrap();
    repo.claim_job("worker-1").await.unwrap();
    repo.complete_job(done.id).await.unwrap();
    repo.cancel_job(done.id).await.unwrap();
    assert_eq!(
        repo.get_job(done.id).await.unwrap().unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn list_jobs_filters_by_status() {
    let (pool, _container) = setup_test_db().await;
    let repo = SyncJobRepository::new(pool);

    for id in ["1", "2", "3"] {
        repo.create_job(CreateJobRequest::sync_item(DataType::Product, id))
            .await
            .unwrap();
    }
    repo.claim_job("worker-1").await.unwrap();

    assert_eq!(repo.list_jobs(None, 10).await.unwrap().len(), 3);
    assert_eq!(repo.list_jobs(None, 2).await.unwrap().len(), 2);
    assert_eq!(
        repo.list_jobs(Some(JobStatus::Pending), 10)
            .await
            .unwrap()
            .len(),
        2
    );
    assert_eq!(
        repo.list_jobs(Some(JobStatus::Running), 10)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn release_worker_jobs_returns_them_to_pending() {
    let (pool, _container) = setup_test_db().await;
    let repo = SyncJobRepository::new(pool);

    for id in ["1", "2"] {
        repo.create_job(CreateJobRequest::sync_item(DataType::Product, id))
            .await
            .unwrap();
    }
    repo.claim_job("worker-1").await.unwrap();
    repo.claim_job("worker-1").await.unwrap();

    assert_eq!(repo.release_worker_jobs("worker-1").await.unwrap(), 2);
    assert_eq!(repo.count_by_status(JobStatus::Pending).await.unwrap(), 2);
    assert_eq!(repo.count_by_status(JobStatus::Running).await.unwrap(), 0);
}
