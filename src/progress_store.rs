//! Progress Store (spec §4.C).
//!
//! Durable bookkeeping for `SyncStatus` (one row per entity, last-sync
//! summary) and `SyncProgress` (one row per attempt, resumable offset). On a
//! pool/connection error every operation here degrades to an in-memory
//! sentinel and logs a warning rather than propagating — the one component
//! explicitly allowed to swallow its own errors.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tiberius::Query;
use tracing::warn;
use uuid::Uuid;

use crate::entity::EntityKind;
use shared::db::DbPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Full,
    Incremental,
    DaysWindow(i64),
    Retry,
}

impl SyncMode {
    /// Persisted alongside the progress row so `retry(sync_id)` can reuse
    /// the mode recorded on the original sync (spec §4.F step 3), rather
    /// than guessing it from the current status.
    fn to_sql(self) -> String {
        match self {
            SyncMode::Full => "full".to_string(),
            SyncMode::Incremental => "incremental".to_string(),
            SyncMode::DaysWindow(days) => format!("days_window:{days}"),
            SyncMode::Retry => "retry".to_string(),
        }
    }

    fn from_sql(raw: &str) -> Self {
        if let Some(days) = raw.strip_prefix("days_window:") {
            return SyncMode::DaysWindow(days.parse().unwrap_or(30));
        }
        match raw {
            "full" => SyncMode::Full,
            "retry" => SyncMode::Retry,
            _ => SyncMode::Incremental,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatusKind {
    InProgress,
    Completed,
    Failed,
    ErrorRecoverable,
    Abandoned,
}

impl SyncStatusKind {
    fn as_str(&self) -> &'static str {
        match self {
            SyncStatusKind::InProgress => "in_progress",
            SyncStatusKind::Completed => "completed",
            SyncStatusKind::Failed => "failed",
            SyncStatusKind::ErrorRecoverable => "error_recoverable",
            SyncStatusKind::Abandoned => "abandoned",
        }
    }

    fn from_sql(raw: &str) -> Self {
        match raw {
            "completed" => SyncStatusKind::Completed,
            "failed" => SyncStatusKind::Failed,
            "error_recoverable" => SyncStatusKind::ErrorRecoverable,
            "abandoned" => SyncStatusKind::Abandoned,
            _ => SyncStatusKind::InProgress,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Progress {
    pub entity_kind: EntityKind,
    pub sync_id: String,
    pub mode: SyncMode,
    pub current_offset: u32,
    pub batch_number: u32,
    pub items_processed: u64,
    pub total_items: Option<u64>,
    pub total_batches: Option<u32>,
    pub status: SyncStatusKind,
    pub started_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Progress {
    fn fresh(entity_kind: EntityKind, mode: SyncMode, now: DateTime<Utc>) -> Self {
        Self {
            entity_kind,
            sync_id: format!("{}-{}", entity_kind.as_str(), Uuid::new_v4()),
            mode,
            current_offset: 0,
            batch_number: 0,
            items_processed: 0,
            total_items: None,
            total_batches: None,
            status: SyncStatusKind::InProgress,
            started_at: now,
            last_updated: now,
            completed_at: None,
        }
    }
}

/// Fields the Sync Engine updates after each page (spec §4.F step 5).
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressPatch {
    pub offset_advance: u32,
    pub items_advance: u64,
    pub batches_advance: u32,
}

pub struct ProgressStore {
    pool: DbPool,
}

impl ProgressStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// §4.C `get_or_create`. `full`/`days_window` abandon any in-progress row
    /// for the entity (preserving the at-most-one invariant) and start fresh;
    /// `incremental` resumes the most recent in-progress row if present.
    pub async fn get_or_create(&self, entity_kind: EntityKind, mode: SyncMode) -> Progress {
        let now = Utc::now();
        match self.try_get_or_create(entity_kind, mode, now).await {
            Ok(progress) => progress,
            Err(e) => {
                warn!(entity_kind = %entity_kind, error = %e, "progress store unreachable, using in-memory sentinel");
                Progress::fresh(entity_kind, mode, now)
            }
        }
    }

    /// §4.G `retry(sync_id)`: locates the progress row by `sync_id`,
    /// re-marks it `in_progress` with a fresh `last_updated`, and returns it
    /// so the Scheduler can hand it to a fresh Sync Engine resuming from the
    /// stored offset and recorded mode.
    pub async fn resume(&self, entity_kind: EntityKind, sync_id: &str) -> Option<Progress> {
        match self.try_resume(entity_kind, sync_id).await {
            Ok(progress) => progress,
            Err(e) => {
                warn!(sync_id, error = %e, "progress store unreachable, cannot resume");
                None
            }
        }
    }

    async fn try_resume(
        &self,
        entity_kind: EntityKind,
        sync_id: &str,
    ) -> shared::Result<Option<Progress>> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;

        let mut select = Query::new(
            "SELECT sync_mode, current_offset, batch_number, items_processed, \
             total_items, total_batches, started_at \
             FROM SyncProgress WHERE entity_type = @P1 AND sync_id = @P2",
        );
        select.bind(entity_kind.as_str());
        select.bind(sync_id);
        let stream = select
            .query(&mut conn)
            .await
            .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;
        let rows = stream
            .into_first_result()
            .await
            .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;

        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };

        let now = Utc::now();
        let progress = Progress {
            entity_kind,
            sync_id: sync_id.to_string(),
            mode: row
                .get::<&str, _>("sync_mode")
                .map(SyncMode::from_sql)
                .unwrap_or(SyncMode::Retry),
            current_offset: row.get::<i32, _>("current_offset").unwrap_or(0) as u32,
            batch_number: row.get::<i32, _>("batch_number").unwrap_or(0) as u32,
            items_processed: row.get::<i64, _>("items_processed").unwrap_or(0) as u64,
            total_items: row.get::<i64, _>("total_items").map(|v| v as u64),
            total_batches: row.get::<i32, _>("total_batches").map(|v| v as u32),
            status: SyncStatusKind::InProgress,
            started_at: row.get("started_at").unwrap_or(now),
            last_updated: now,
            completed_at: None,
        };

        let mut update = Query::new(
            "UPDATE SyncProgress SET status = @P1, last_updated = @P2 WHERE sync_id = @P3",
        );
        update.bind(SyncStatusKind::InProgress.as_str());
        update.bind(now);
        update.bind(sync_id);
        update
            .execute(&mut conn)
            .await
            .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;

        Ok(Some(progress))
    }

    async fn try_get_or_create(
        &self,
        entity_kind: EntityKind,
        mode: SyncMode,
        now: DateTime<Utc>,
    ) -> shared::Result<Progress> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;

        if matches!(mode, SyncMode::Full | SyncMode::DaysWindow(_)) {
            let mut abandon = Query::new(
                "UPDATE SyncProgress SET status = @P1, last_updated = @P2 \
                 WHERE entity_type = @P3 AND status = @P4",
            );
            abandon.bind(SyncStatusKind::Abandoned.as_str());
            abandon.bind(now);
            abandon.bind(entity_kind.as_str());
            abandon.bind(SyncStatusKind::InProgress.as_str());
            abandon
                .execute(&mut conn)
                .await
                .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;

            let progress = Progress::fresh(entity_kind, mode, now);
            self.insert_progress_row(&mut conn, &progress).await?;
            return Ok(progress);
        }

        if mode == SyncMode::Incremental {
            if let Some(existing) = self.select_in_progress(&mut conn, entity_kind).await? {
                return Ok(existing);
            }
        }

        let progress = Progress::fresh(entity_kind, mode, now);
        self.insert_progress_row(&mut conn, &progress).await?;
        Ok(progress)
    }

    async fn select_in_progress(
        &self,
        conn: &mut shared::db::DbConnection<'_>,
        entity_kind: EntityKind,
    ) -> shared::Result<Option<Progress>> {
        let mut query = Query::new(
            "SELECT TOP 1 sync_id, sync_mode, current_offset, batch_number, items_processed, \
             total_items, total_batches, started_at, last_updated \
             FROM SyncProgress WHERE entity_type = @P1 AND status = @P2 \
             ORDER BY started_at DESC",
        );
        query.bind(entity_kind.as_str());
        query.bind(SyncStatusKind::InProgress.as_str());

        let stream = query
            .query(conn)
            .await
            .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;
        let rows = stream
            .into_first_result()
            .await
            .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;

        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };

        Ok(Some(Progress {
            entity_kind,
            sync_id: row.get::<&str, _>("sync_id").unwrap_or_default().to_string(),
            mode: row
                .get::<&str, _>("sync_mode")
                .map(SyncMode::from_sql)
                .unwrap_or(SyncMode::Incremental),
            current_offset: row.get::<i32, _>("current_offset").unwrap_or(0) as u32,
            batch_number: row.get::<i32, _>("batch_number").unwrap_or(0) as u32,
            items_processed: row.get::<i64, _>("items_processed").unwrap_or(0) as u64,
            total_items: row.get::<i64, _>("total_items").map(|v| v as u64),
            total_batches: row.get::<i32, _>("total_batches").map(|v| v as u32),
            status: SyncStatusKind::InProgress,
            started_at: row.get("started_at").unwrap_or_else(Utc::now),
            last_updated: row.get("last_updated").unwrap_or_else(Utc::now),
            completed_at: None,
        }))
    }

    async fn insert_progress_row(
        &self,
        conn: &mut shared::db::DbConnection<'_>,
        progress: &Progress,
    ) -> shared::Result<()> {
        let mut query = Query::new(
            "INSERT INTO SyncProgress \
             (sync_id, entity_type, sync_mode, current_offset, batch_number, items_processed, \
              total_items, total_batches, status, started_at, last_updated) \
             VALUES (@P1, @P2, @P3, @P4, @P5, @P6, @P7, @P8, @P9, @P10, @P11)",
        );
        query.bind(progress.sync_id.clone());
        query.bind(progress.entity_kind.as_str());
        query.bind(progress.mode.to_sql());
        query.bind(progress.current_offset as i32);
        query.bind(progress.batch_number as i32);
        query.bind(progress.items_processed as i64);
        query.bind(progress.total_items.map(|v| v as i64));
        query.bind(progress.total_batches.map(|v| v as i32));
        query.bind(progress.status.as_str());
        query.bind(progress.started_at);
        query.bind(progress.last_updated);
        query
            .execute(conn)
            .await
            .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;
        Ok(())
    }

    /// §4.C `update`. `current_offset` only ever moves forward (spec §3
    /// invariant 3).
    pub async fn update(&self, progress: &mut Progress, patch: ProgressPatch) {
        progress.current_offset += patch.offset_advance;
        progress.items_processed += patch.items_advance;
        progress.batch_number += patch.batches_advance;
        progress.last_updated = Utc::now();

        if let Err(e) = self.persist_update(progress).await {
            warn!(sync_id = %progress.sync_id, error = %e, "progress store unreachable, continuing in-memory");
        }
    }

    async fn persist_update(&self, progress: &Progress) -> shared::Result<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;

        let mut query = Query::new(
            "UPDATE SyncProgress SET current_offset = @P1, batch_number = @P2, \
             items_processed = @P3, last_updated = @P4 WHERE sync_id = @P5",
        );
        query.bind(progress.current_offset as i32);
        query.bind(progress.batch_number as i32);
        query.bind(progress.items_processed as i64);
        query.bind(progress.last_updated);
        query.bind(progress.sync_id.clone());
        query
            .execute(&mut conn)
            .await
            .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;
        Ok(())
    }

    /// §4.C `complete`. `success = false` without a recoverable classification
    /// (the caller decides `Failed` vs `ErrorRecoverable` before calling this).
    pub async fn complete(&self, progress: &mut Progress, status: SyncStatusKind) {
        progress.status = status;
        let now = Utc::now();
        progress.last_updated = now;
        if status == SyncStatusKind::Completed {
            progress.completed_at = Some(now);
        }

        if let Err(e) = self.persist_completion(progress).await {
            warn!(sync_id = %progress.sync_id, error = %e, "progress store unreachable while completing");
        }
    }

    async fn persist_completion(&self, progress: &Progress) -> shared::Result<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;

        let mut query = Query::new(
            "UPDATE SyncProgress SET status = @P1, last_updated = @P2, completed_at = @P3 \
             WHERE sync_id = @P4",
        );
        query.bind(progress.status.as_str());
        query.bind(progress.last_updated);
        query.bind(progress.completed_at);
        query.bind(progress.sync_id.clone());
        query
            .execute(&mut conn)
            .await
            .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;
        Ok(())
    }

    /// §4.C `get_last_sync_date`: sync-status row, else `max(last_sync_date)`
    /// over the parent table, else "30 days ago".
    pub async fn get_last_sync_date(&self, entity_kind: EntityKind) -> DateTime<Utc> {
        match self.try_get_last_sync_date(entity_kind).await {
            Ok(Some(date)) => date,
            Ok(None) => Utc::now() - ChronoDuration::days(30),
            Err(e) => {
                warn!(entity_kind = %entity_kind, error = %e, "progress store unreachable, defaulting to 30 days ago");
                Utc::now() - ChronoDuration::days(30)
            }
        }
    }

    async fn try_get_last_sync_date(
        &self,
        entity_kind: EntityKind,
    ) -> shared::Result<Option<DateTime<Utc>>> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;

        let mut query = Query::new("SELECT last_sync_date FROM SyncStatus WHERE entity_type = @P1");
        query.bind(entity_kind.as_str());
        let stream = query
            .query(&mut conn)
            .await
            .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;
        let rows = stream
            .into_first_result()
            .await
            .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;

        if let Some(row) = rows.into_iter().next() {
            if let Some(date) = row.get::<DateTime<Utc>, _>("last_sync_date") {
                return Ok(Some(date));
            }
        }

        let table = entity_kind.parent_table();
        let fallback_sql = format!("SELECT MAX(last_sync_date) AS max_date FROM {table}");
        let stream = conn
            .simple_query(fallback_sql)
            .await
            .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;
        let rows = stream
            .into_first_result()
            .await
            .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;

        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.get::<DateTime<Utc>, _>("max_date")))
    }

    /// §4.C `set_last_sync`: upsert the sync-status row.
    pub async fn set_last_sync(&self, entity_kind: EntityKind, at: DateTime<Utc>, count: u64) {
        if let Err(e) = self.try_set_last_sync(entity_kind, at, count).await {
            warn!(entity_kind = %entity_kind, error = %e, "progress store unreachable, last_sync not persisted");
        }
    }

    async fn try_set_last_sync(
        &self,
        entity_kind: EntityKind,
        at: DateTime<Utc>,
        count: u64,
    ) -> shared::Result<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;

        let mut update = Query::new(
            "UPDATE SyncStatus SET last_sync_date = @P1, last_sync_count = @P2, \
             total_count = total_count + @P2 WHERE entity_type = @P3",
        );
        update.bind(at);
        update.bind(count as i64);
        update.bind(entity_kind.as_str());
        let rows_affected = update
            .execute(&mut conn)
            .await
            .map_err(|e| shared::Error::database_recoverable(e.to_string()))?
            .rows_affected()
            .iter()
            .sum::<u64>();

        if rows_affected == 0 {
            let mut insert = Query::new(
                "INSERT INTO SyncStatus (entity_name, entity_type, last_sync_date, \
                 last_sync_count, total_count) VALUES (@P1, @P2, @P3, @P4, @P4)",
            );
            insert.bind(entity_kind.parent_table());
            insert.bind(entity_kind.as_str());
            insert.bind(at);
            insert.bind(count as i64);
            insert
                .execute(&mut conn)
                .await
                .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;
        }

        Ok(())
    }

    /// `status(kind)` of the operator surface equivalence (spec §6): the
    /// status of the most recently started progress row for this entity.
    pub async fn latest_status(&self, entity_kind: EntityKind) -> Option<SyncStatusKind> {
        match self.try_latest_status(entity_kind).await {
            Ok(status) => status,
            Err(e) => {
                warn!(entity_kind = %entity_kind, error = %e, "progress store unreachable, no status available");
                None
            }
        }
    }

    async fn try_latest_status(&self, entity_kind: EntityKind) -> shared::Result<Option<SyncStatusKind>> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;

        let mut query = Query::new(
            "SELECT TOP 1 status FROM SyncProgress WHERE entity_type = @P1 ORDER BY started_at DESC",
        );
        query.bind(entity_kind.as_str());
        let stream = query
            .query(&mut conn)
            .await
            .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;
        let rows = stream
            .into_first_result()
            .await
            .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;

        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.get::<&str, _>("status").map(SyncStatusKind::from_sql)))
    }

    /// `count(kind)` of the operator surface equivalence (spec §6): the
    /// cumulative `total_count` recorded on the sync-status row.
    pub async fn total_count(&self, entity_kind: EntityKind) -> u64 {
        match self.try_total_count(entity_kind).await {
            Ok(count) => count,
            Err(e) => {
                warn!(entity_kind = %entity_kind, error = %e, "progress store unreachable, defaulting count to 0");
                0
            }
        }
    }

    async fn try_total_count(&self, entity_kind: EntityKind) -> shared::Result<u64> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;

        let mut query = Query::new("SELECT total_count FROM SyncStatus WHERE entity_type = @P1");
        query.bind(entity_kind.as_str());
        let stream = query
            .query(&mut conn)
            .await
            .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;
        let rows = stream
            .into_first_result()
            .await
            .map_err(|e| shared::Error::database_recoverable(e.to_string()))?;

        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.get::<i64, _>("total_count"))
            .unwrap_or(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_progress_starts_at_zero_offset() {
        let progress = Progress::fresh(EntityKind::Products, SyncMode::Full, Utc::now());
        assert_eq!(progress.current_offset, 0);
        assert_eq!(progress.items_processed, 0);
        assert_eq!(progress.status, SyncStatusKind::InProgress);
        assert!(progress.sync_id.starts_with("products-"));
    }

    #[test]
    fn patch_only_ever_advances_offset() {
        let mut progress = Progress::fresh(EntityKind::Products, SyncMode::Incremental, Utc::now());
        progress.current_offset += 100;
        progress.current_offset += 50;
        assert_eq!(progress.current_offset, 150);
    }
}
