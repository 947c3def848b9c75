//! Database-touching integration tests (schema bootstrap, Progress Store
//! CRUD). Gated behind `DATABASE_URL` since no live SQL Server instance is
//! assumed in CI (SPEC_FULL §8 "[ADDED — test tooling]").

use fulfillment_sync_engine::entity::EntityKind;
use fulfillment_sync_engine::progress_store::{ProgressStore, SyncMode};
use fulfillment_sync_engine::schema;

fn dsn() -> Option<String> {
    std::env::var("DATABASE_URL").ok()
}

#[tokio::test]
#[ignore]
async fn ensure_schema_is_idempotent() {
    let Some(dsn) = dsn() else { return };
    let pool = shared::db::connect(&dsn, 2).await.expect("connect");

    schema::ensure_schema(&pool).await.expect("first bootstrap");
    schema::ensure_schema(&pool).await.expect("second bootstrap is a no-op");
}

#[tokio::test]
#[ignore]
async fn progress_store_resumes_in_progress_row() {
    let Some(dsn) = dsn() else { return };
    let pool = shared::db::connect(&dsn, 2).await.expect("connect");
    schema::ensure_schema(&pool).await.expect("bootstrap");

    let store = ProgressStore::new(pool);

    let created = store
        .get_or_create(EntityKind::Products, SyncMode::Incremental)
        .await;
    assert_eq!(created.current_offset, 0);

    let resumed = store
        .get_or_create(EntityKind::Products, SyncMode::Incremental)
        .await;
    assert_eq!(resumed.sync_id, created.sync_id, "incremental resumes the same row");
}

#[tokio::test]
#[ignore]
async fn retry_resumes_by_sync_id() {
    let Some(dsn) = dsn() else { return };
    let pool = shared::db::connect(&dsn, 2).await.expect("connect");
    schema::ensure_schema(&pool).await.expect("bootstrap");

    let store = ProgressStore::new(pool);
    let created = store.get_or_create(EntityKind::Products, SyncMode::Full).await;

    let resumed = store
        .resume(EntityKind::Products, &created.sync_id)
        .await
        .expect("progress row exists");
    assert_eq!(resumed.sync_id, created.sync_id);
    assert_eq!(resumed.mode, SyncMode::Full);
}
