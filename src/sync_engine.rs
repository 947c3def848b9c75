//! Sync Engine (spec §4.F).
//!
//! Orchestrates one entity's sync end to end: resolve mode, acquire
//! progress, stream pages, map, write, checkpoint, complete. Expressed as a
//! plain linear `async fn` rather than a literal state-machine enum, with
//! tracing spans marking each transition.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::StreamExt;
use serde_json::Value;
use tracing::{info, info_span, warn, Instrument};

use crate::cancellation::SyncCancellation;
use crate::entity::EntityKind;
use crate::http_client::{HasUpdatedAt, HttpClient};
use crate::mapper;
use crate::progress_store::{Progress, ProgressPatch, ProgressStore, SyncMode, SyncStatusKind};
use crate::rate_limiter::RateLimiter;
use crate::upsert_writer::UpsertWriter;
use shared::error::{Error, Result, SyncOutcome};

const ROLLING_WINDOW_DAYS: i64 = 30;
const PAGE_LIMIT: u32 = 100;

/// Thin wrapper so the Mapper's pure `Value` input can also report the
/// `updated_at` the HTTP Client's cutoff logic needs (§4.B).
#[derive(Debug, Clone)]
pub struct RawRecord(pub Value);

impl HasUpdatedAt for RawRecord {
    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.0
            .get("updated")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl<'de> serde::Deserialize<'de> for RawRecord {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(RawRecord)
    }
}

pub struct SyncEngine {
    http: Arc<HttpClient>,
    limiter: Arc<RateLimiter>,
    progress: Arc<ProgressStore>,
    writer: Arc<UpsertWriter>,
    batch_size: usize,
    inter_parent_pause: Duration,
}

impl SyncEngine {
    pub fn new(
        http: Arc<HttpClient>,
        limiter: Arc<RateLimiter>,
        progress: Arc<ProgressStore>,
        writer: Arc<UpsertWriter>,
        batch_size: usize,
        inter_parent_pause: Duration,
    ) -> Self {
        Self {
            http,
            limiter,
            progress,
            writer,
            batch_size,
            inter_parent_pause,
        }
    }

    /// Operation sequence 1-7 of spec §4.F.
    pub async fn run(
        &self,
        entity_kind: EntityKind,
        mode: SyncMode,
        cancel: SyncCancellation,
    ) -> SyncOutcome {
        let span = info_span!("sync", entity_kind = %entity_kind);
        let progress = self.progress.get_or_create(entity_kind, mode).await;
        self.drive_to_outcome(entity_kind, progress, cancel).instrument(span).await
    }

    /// Resumes an existing, already-marked-`in_progress` row (spec §4.G
    /// "Retry-of-failed") instead of calling `get_or_create`.
    pub async fn resume(&self, progress: Progress, cancel: SyncCancellation) -> SyncOutcome {
        let entity_kind = progress.entity_kind;
        let span = info_span!("sync", entity_kind = %entity_kind, resumed = true);
        self.drive_to_outcome(entity_kind, progress, cancel).instrument(span).await
    }

    async fn drive_to_outcome(
        &self,
        entity_kind: EntityKind,
        mut progress: Progress,
        cancel: SyncCancellation,
    ) -> SyncOutcome {
        let mode = progress.mode;
        info!(sync_id = %progress.sync_id, offset = progress.current_offset, "starting");

        let since = self.determine_since(entity_kind, mode).await;
        let cutoff = match mode {
            SyncMode::DaysWindow(days) => Some(Utc::now() - ChronoDuration::days(days)),
            _ => None,
        };

        match self.drive(entity_kind, &mut progress, since, cutoff, &cancel).await {
            Ok(()) => {
                progress.total_items.get_or_insert(progress.items_processed);
                self.progress.complete(&mut progress, SyncStatusKind::Completed).await;
                let now = Utc::now();
                self.progress
                    .set_last_sync(entity_kind, now, progress.items_processed)
                    .await;
                info!(sync_id = %progress.sync_id, items = progress.items_processed, "completed");
                SyncOutcome::success(progress.items_processed)
            }
            Err(e) if e.is_recoverable() => {
                warn!(sync_id = %progress.sync_id, error = %e, "recoverable failure, leaving resumable");
                self.progress.complete(&mut progress, SyncStatusKind::ErrorRecoverable).await;
                SyncOutcome::failure(progress.items_processed, e.to_string())
            }
            Err(e) => {
                warn!(sync_id = %progress.sync_id, error = %e, "unrecoverable failure");
                self.progress.complete(&mut progress, SyncStatusKind::Failed).await;
                SyncOutcome::failure(progress.items_processed, e.to_string())
            }
        }
    }

    async fn determine_since(&self, entity_kind: EntityKind, mode: SyncMode) -> Option<DateTime<Utc>> {
        match mode {
            SyncMode::Full => None,
            SyncMode::DaysWindow(_) => None,
            SyncMode::Incremental | SyncMode::Retry => {
                let last = self.progress.get_last_sync_date(entity_kind).await;
                Some(last - ChronoDuration::days(ROLLING_WINDOW_DAYS))
            }
        }
    }

    async fn drive(
        &self,
        entity_kind: EntityKind,
        progress: &mut Progress,
        since: Option<DateTime<Utc>>,
        cutoff: Option<DateTime<Utc>>,
        cancel: &SyncCancellation,
    ) -> Result<()> {
        let mut seen_keys: HashSet<i64> = HashSet::new();
        let mut stream = self.http.paginate::<RawRecord>(
            &self.limiter,
            cancel,
            entity_kind.list_endpoint(),
            Vec::new(),
            since,
            cutoff,
            progress.current_offset,
            PAGE_LIMIT,
        );

        while let Some(page_result) = stream.next().await {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let mut page = page_result?;
            page.sort_by(|a, b| b.updated_at().cmp(&a.updated_at()));

            let mut mapped = Vec::with_capacity(page.len());
            for raw in &page {
                let pk_field = entity_kind.primary_key_field();
                let Some(pk) = raw.0.get(pk_field).and_then(Value::as_i64) else {
                    warn!(entity_kind = %entity_kind, "record missing primary key, skipping");
                    continue;
                };
                if !seen_keys.insert(pk) {
                    continue;
                }

                let record = self.resolve_detail(entity_kind, raw, cancel).await?;
                match mapper::map(entity_kind, &record) {
                    Ok(mapped_record) => mapped.push(mapped_record),
                    Err(e) => warn!(entity_kind = %entity_kind, error = %e, "mapping error, skipping record"),
                }
            }

            for chunk in mapped.chunks(self.batch_size) {
                self.writer.write_chunk(chunk).await?;
            }

            self.progress
                .update(
                    progress,
                    ProgressPatch {
                        offset_advance: PAGE_LIMIT,
                        items_advance: mapped.len() as u64,
                        batches_advance: 1,
                    },
                )
                .await;
        }

        Ok(())
    }

    /// §4.F per-entity specializations: picklists conditionally, batches
    /// always, fetch their detail response through the same limiter/client
    /// pair, with a small inter-parent pause to smooth database load.
    async fn resolve_detail(
        &self,
        entity_kind: EntityKind,
        raw: &RawRecord,
        cancel: &SyncCancellation,
    ) -> Result<Value> {
        let needs_detail = match entity_kind {
            EntityKind::Batches => true,
            EntityKind::Picklists => mapper::picklists::needs_detail(&raw.0),
            _ => false,
        };

        if !needs_detail {
            return Ok(raw.0.clone());
        }

        let pk_field = entity_kind.primary_key_field();
        let Some(id) = raw.0.get(pk_field).and_then(Value::as_i64) else {
            return Ok(raw.0.clone());
        };

        let endpoint = entity_kind.detail_endpoint(id);
        let http = &self.http;
        let detail: Value = self
            .limiter
            .execute(cancel, || async { http.fetch_detail(&endpoint).await })
            .await?;

        if !cancel.is_cancelled() && !self.inter_parent_pause.is_zero() {
            tokio::time::sleep(self.inter_parent_pause).await;
        }

        Ok(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_record_reads_updated_at() {
        let raw = RawRecord(json!({"updated": "2025-03-04T17:08:09Z"}));
        assert!(raw.updated_at().is_some());
    }

    #[test]
    fn raw_record_missing_updated_is_none() {
        let raw = RawRecord(json!({}));
        assert!(raw.updated_at().is_none());
    }
}
