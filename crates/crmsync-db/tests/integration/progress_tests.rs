use chrono::Utc;
use crmsync_core::models::DataType;
use crmsync_core::state::{ExportState, ExportStatus, SyncStatus, modify_state};
use crmsync_core::traits::ProgressStore;
use crmsync_db::ExportStateRepository;
use uuid::Uuid;

use crate::integration::common::setup_test_db;

#[tokio::test]
async fn load_defaults_unwritten_record() {
    let (pool, _container) = setup_test_db().await;
    let repo = ExportStateRepository::new(pool);

    let state = repo.load(DataType::Product).await.unwrap();
    assert_eq!(state, ExportState::new(DataType::Product));
}

#[tokio::test]
async fn first_write_inserts_and_roundtrips() {
    let (pool, _container) = setup_test_db().await;
    let repo = ExportStateRepository::new(pool);

    let mut state = ExportState::new(DataType::Product);
    state.reset(Uuid::new_v4(), Some("req-1".into()), Utc::now());
    state.offset = 1000;
    state.sub_offset = 200;
    state.total_count = Some(1240);
    state.record_sync(SyncStatus::Failed, Utc::now());
    state.version = 1;

    assert!(repo.compare_and_set(0, &state).await.unwrap());

    let loaded = repo.load(DataType::Product).await.unwrap();
    assert_eq!(loaded.status, ExportStatus::InProgress);
    assert_eq!(loaded.offset, 1000);
    assert_eq!(loaded.sub_offset, 200);
    assert_eq!(loaded.total_count, Some(1240));
    assert_eq!(loaded.run_id, state.run_id);
    assert_eq!(loaded.request_id.as_deref(), Some("req-1"));
    assert_eq!(loaded.last_sync, Some(SyncStatus::Failed));
    assert_eq!(loaded.version, 1);
}

#[tokio::test]
async fn stale_version_is_rejected() {
    let (pool, _container) = setup_test_db().await;
    let repo = ExportStateRepository::new(pool);

    let mut state = ExportState::new(DataType::Sale);
    state.version = 1;
    assert!(repo.compare_and_set(0, &state).await.unwrap());

    // A second "first write" loses against the existing row.
    assert!(!repo.compare_and_set(0, &state).await.unwrap());

    let mut next = state.clone();
    next.offset = 500;
    next.version = 2;
    assert!(repo.compare_and_set(1, &next).await.unwrap());

    let mut stale = state.clone();
    stale.offset = 999;
    stale.version = 2;
    assert!(!repo.compare_and_set(1, &stale).await.unwrap());

    assert_eq!(repo.load(DataType::Sale).await.unwrap().offset, 500);
}

#[tokio::test]
async fn failure_reason_is_kept() {
    let (pool, _container) = setup_test_db().await;
    let repo = ExportStateRepository::new(pool);

    modify_state(&repo, DataType::Customer, |s| {
        s.status = ExportStatus::failed_with("Unknown error")
    })
    .await
    .unwrap();

    let loaded = repo.load(DataType::Customer).await.unwrap();
    assert_eq!(loaded.status, ExportStatus::failed_with("Unknown error"));
}

#[tokio::test]
async fn concurrent_modifications_are_not_lost() {
    let (pool, _container) = setup_test_db().await;
    let repo = ExportStateRepository::new(pool);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            modify_state(&repo, DataType::Product, |s| s.exported_count += 1).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }

    let loaded = repo.load(DataType::Product).await.unwrap();
    assert_eq!(loaded.exported_count, succeeded);
    assert_eq!(loaded.version, succeeded);
}
