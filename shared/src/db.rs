//! Database connection pooling.
//!
//! The vendor schema in spec §6 targets a SQL Server dialect, so the pool
//! wraps `tiberius` (the standard async TDS driver) behind `bb8`, following
//! the shape of a typical connection-pool service: a thin struct around the
//! pool with a `pool()` accessor and a `health_check`.

use bb8::Pool;
use bb8_tiberius::ConnectionManager;
use tiberius::Config as TiberiusConfig;
use tracing::info;

use crate::error::{Error, Result};

pub type DbPool = Pool<ConnectionManager>;
pub type DbConnection<'a> = bb8::PooledConnection<'a, ConnectionManager>;

/// Build a connection pool from a `DB_DSN` in ADO-style connection string
/// form (`server=...;database=...;user=...;password=...`).
pub async fn connect(dsn: &str, max_size: u32) -> Result<DbPool> {
    info!("initializing database connection pool");

    let tiberius_config = TiberiusConfig::from_ado_string(dsn)
        .map_err(|e| Error::config(format!("invalid DB_DSN: {e}")))?;
    let manager = ConnectionManager::new(tiberius_config);

    let pool = Pool::builder()
        .max_size(max_size)
        .build(manager)
        .await
        .map_err(|e| Error::database_fatal(format!("failed to build connection pool: {e}")))?;

    health_check(&pool).await?;
    info!("database connection pool initialized");
    Ok(pool)
}

pub async fn health_check(pool: &DbPool) -> Result<()> {
    let mut conn = pool
        .get()
        .await
        .map_err(|e| Error::database_fatal(format!("failed to acquire connection: {e}")))?;
    conn.simple_query("SELECT 1")
        .await
        .map_err(|e| Error::database_fatal(format!("health check failed: {e}")))?;
    Ok(())
}
