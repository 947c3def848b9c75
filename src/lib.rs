use std::sync::Arc;

use tracing::info;

pub mod cancellation;
pub mod entity;
pub mod http_client;
pub mod mapper;
pub mod progress_store;
pub mod rate_limiter;
pub mod schema;
pub mod scheduler;
pub mod sync_engine;
pub mod upsert_writer;

use cancellation::SyncCancellation;
use entity::EntityKind;
use http_client::HttpClient;
use progress_store::{ProgressStore, SyncMode};
use rate_limiter::{RateLimiter, RateLimiterConfig};
use scheduler::Scheduler;
use sync_engine::SyncEngine;
use upsert_writer::UpsertWriter;

use shared::error::{Result, SyncOutcome};
use shared::Config;

/// The in-process entry points an admin HTTP surface (not part of this
/// crate, see spec §6) would call into: `sync_all`, `sync_entity`, `retry`,
/// `status`, `count`, `last_sync_date`.
pub struct SyncCoordinator {
    scheduler: Scheduler,
    progress: Arc<ProgressStore>,
}

impl SyncCoordinator {
    pub async fn new(config: &Config) -> Result<Self> {
        let pool = shared::db::connect(&config.db_dsn, 10).await?;
        schema::ensure_schema(&pool).await?;

        let http = Arc::new(HttpClient::new(config.base_url.clone(), config.api_key.clone())?);
        let limiter = Arc::new(RateLimiter::new(RateLimiterConfig {
            requests_per_minute: config.requests_per_minute,
            max_retries: config.max_retries,
            rate_limit_sleep: config.rate_limit_sleep(),
        }));
        let progress = Arc::new(ProgressStore::new(pool.clone()));
        let writer = Arc::new(UpsertWriter::new(pool));

        let engine = Arc::new(SyncEngine::new(
            http,
            limiter,
            progress.clone(),
            writer,
            config.batch_size,
            config.inter_parent_pause(),
        ));

        let scheduler = Scheduler::new(engine, progress.clone());

        info!("sync coordinator ready");
        Ok(Self { scheduler, progress })
    }

    pub async fn sync_all(&self, full: bool, cancel: SyncCancellation) -> Vec<(EntityKind, Result<SyncOutcome>)> {
        self.scheduler.sync_all(full, cancel).await
    }

    pub async fn sync_entity(
        &self,
        entity_kind: EntityKind,
        mode: SyncMode,
        cancel: SyncCancellation,
    ) -> Result<SyncOutcome> {
        self.scheduler.sync_entity(entity_kind, mode, cancel).await
    }

    pub async fn retry(&self, sync_id: &str, cancel: SyncCancellation) -> Result<SyncOutcome> {
        self.scheduler.retry(sync_id, cancel).await
    }

    pub async fn last_sync_date(&self, entity_kind: EntityKind) -> chrono::DateTime<chrono::Utc> {
        self.progress.get_last_sync_date(entity_kind).await
    }

    pub async fn status(&self, entity_kind: EntityKind) -> Option<progress_store::SyncStatusKind> {
        self.progress.latest_status(entity_kind).await
    }

    pub async fn count(&self, entity_kind: EntityKind) -> u64 {
        self.progress.total_count(entity_kind).await
    }
}
