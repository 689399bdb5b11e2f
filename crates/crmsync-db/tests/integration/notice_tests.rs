use crmsync_core::traits::{Notice, NoticeSink};
use crmsync_db::NoticeRepository;

use crate::integration::common::setup_test_db;

#[tokio::test]
async fn add_is_idempotent_and_remove_tolerates_absent() {
    let (pool, _container) = setup_test_db().await;
    let repo = NoticeRepository::new(pool);

    repo.add(Notice::ExportInProgress).await.unwrap();
    repo.add(Notice::ExportInProgress).await.unwrap();
    repo.add(Notice::ExportCompleted).await.unwrap();

    let notices = repo.list().await.unwrap();
    assert_eq!(notices.len(), 2);
    assert!(notices.contains(&Notice::ExportInProgress));

    repo.remove(Notice::ExportInProgress).await.unwrap();
    repo.remove(Notice::ExportFailed).await.unwrap();

    assert_eq!(repo.list().await.unwrap(), vec![Notice::ExportCompleted]);
}
