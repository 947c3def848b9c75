//! Upsert Writer (spec §4.E).
//!
//! One transaction per chunk of `batch_size` parents. Each parent is
//! upserted by primary key, then every child table is replaced wholesale
//! (`DELETE ... WHERE fk = pk` then a chunked `INSERT`). Any failure rolls
//! back the whole transaction, not just the failing parent.

use tiberius::Query;
use tracing::debug;

use crate::mapper::{ChildRow, MappedRecord, SqlValue};
use shared::db::DbPool;
use shared::error::{Error, Result};

/// Upstream-recommended cap so a single INSERT statement never grows
/// unbounded for wide child collections (spec §4.E "Batching").
const MAX_CHILD_ROWS_PER_INSERT: usize = 500;

pub struct UpsertWriter {
    pool: DbPool,
}

impl UpsertWriter {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Writes one chunk (already sized to `batch_size` by the caller) inside
    /// a single transaction. Tiberius has no transaction handle of its own,
    /// so the transaction is driven with literal `BEGIN TRAN`/`COMMIT
    /// TRAN`/`ROLLBACK TRAN` batch statements, matching the dialect's MERGE
    /// substitute described in SPEC_FULL §4.E.
    pub async fn write_chunk(&self, records: &[MappedRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| Error::database_recoverable(e.to_string()))?;

        conn.simple_query("BEGIN TRAN")
            .await
            .map_err(|e| Error::database_recoverable(e.to_string()))?;

        for record in records {
            if let Err(e) = self.write_one(&mut conn, record).await {
                let _ = conn.simple_query("ROLLBACK TRAN").await;
                return Err(e);
            }
        }

        conn.simple_query("COMMIT TRAN")
            .await
            .map_err(|e| Error::database_recoverable(e.to_string()))?;

        debug!(count = records.len(), "wrote chunk");
        Ok(())
    }

    async fn write_one(
        &self,
        conn: &mut shared::db::DbConnection<'_>,
        record: &MappedRecord,
    ) -> Result<()> {
        self.upsert_parent(conn, record).await?;

        for (table, rows) in &record.children {
            self.replace_children(
                conn,
                table,
                record.parent.primary_key_column,
                record.parent.primary_key_value,
                rows,
            )
            .await?;
        }

        Ok(())
    }

    async fn upsert_parent(
        &self,
        conn: &mut shared::db::DbConnection<'_>,
        record: &MappedRecord,
    ) -> Result<()> {
        let parent = &record.parent;

        let select_sql = format!(
            "SELECT 1 FROM {} WHERE {} = @P1",
            parent.table, parent.primary_key_column
        );
        let mut select = Query::new(select_sql);
        select.bind(parent.primary_key_value);
        let stream = select
            .query(&mut *conn)
            .await
            .map_err(|e| Error::database_recoverable(e.to_string()))?;
        let rows = stream
            .into_first_result()
            .await
            .map_err(|e| Error::database_recoverable(e.to_string()))?;
        let exists = !rows.is_empty();

        if exists {
            let assignments: Vec<String> = parent
                .columns
                .iter()
                .enumerate()
                .map(|(i, (name, _))| format!("{name} = @P{}", i + 1))
                .collect();
            let sql = format!(
                "UPDATE {} SET {} WHERE {} = @P{}",
                parent.table,
                assignments.join(", "),
                parent.primary_key_column,
                parent.columns.len() + 1
            );
            let mut update = Query::new(sql);
            for (_, value) in &parent.columns {
                bind_value(&mut update, value);
            }
            update.bind(parent.primary_key_value);
            update
                .execute(&mut *conn)
                .await
                .map_err(|e| Error::database_recoverable(e.to_string()))?;
        } else {
            let columns: Vec<&str> = parent.columns.iter().map(|(name, _)| *name).collect();
            let placeholders: Vec<String> =
                (1..=columns.len()).map(|i| format!("@P{i}")).collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                parent.table,
                columns.join(", "),
                placeholders.join(", ")
            );
            let mut insert = Query::new(sql);
            for (_, value) in &parent.columns {
                bind_value(&mut insert, value);
            }
            insert
                .execute(&mut *conn)
                .await
                .map_err(|e| Error::database_recoverable(e.to_string()))?;
        }

        Ok(())
    }

    async fn replace_children(
        &self,
        conn: &mut shared::db::DbConnection<'_>,
        table: &str,
        fk_column: &str,
        fk_value: i64,
        rows: &[ChildRow],
    ) -> Result<()> {
        let delete_sql = format!("DELETE FROM {table} WHERE {fk_column} = @P1");
        let mut delete = Query::new(delete_sql);
        delete.bind(fk_value);
        delete
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::database_recoverable(e.to_string()))?;

        for chunk in rows.chunks(MAX_CHILD_ROWS_PER_INSERT) {
            if chunk.is_empty() {
                continue;
            }
            let columns: Vec<&str> = chunk[0].columns.iter().map(|(name, _)| *name).collect();

            let mut value_groups = Vec::with_capacity(chunk.len());
            let mut param_index = 1usize;
            let mut values = Vec::new();
            for row in chunk {
                let placeholders: Vec<String> = (0..row.columns.len())
                    .map(|_| {
                        let p = format!("@P{param_index}");
                        param_index += 1;
                        p
                    })
                    .collect();
                value_groups.push(format!("({})", placeholders.join(", ")));
                values.extend(row.columns.iter().map(|(_, v)| v));
            }

            let sql = format!(
                "INSERT INTO {table} ({}) VALUES {}",
                columns.join(", "),
                value_groups.join(", ")
            );
            let mut insert = Query::new(sql);
            for value in values {
                bind_value(&mut insert, value);
            }
            insert
                .execute(&mut *conn)
                .await
                .map_err(|e| Error::database_recoverable(e.to_string()))?;
        }

        Ok(())
    }
}

fn bind_value(query: &mut Query<'_>, value: &SqlValue) {
    match value {
        SqlValue::Null => query.bind(Option::<i64>::None),
        SqlValue::Int(n) => query.bind(*n),
        SqlValue::Float(f) => query.bind(*f),
        SqlValue::Text(s) => query.bind(s.clone()),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::DateTime(dt) => query.bind(*dt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_rows_split_at_max_insert_size() {
        let rows: Vec<ChildRow> = (0..1200)
            .map(|i| ChildRow {
                columns: vec![("idproduct", SqlValue::Int(i))],
            })
            .collect();
        let chunks: Vec<_> = rows.chunks(MAX_CHILD_ROWS_PER_INSERT).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 500);
        assert_eq!(chunks[2].len(), 200);
    }
}
