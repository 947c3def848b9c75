//! Configuration loading for the sync engine.
//!
//! Not part of the engine's tested surface (the spec treats environment
//! loading as an external collaborator) — this module exists purely so the
//! binary has something to construct the engine's dependencies from.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub db_dsn: String,
    pub requests_per_minute: u32,
    pub max_retries: u32,
    pub rate_limit_sleep_ms: u64,
    pub batch_size: usize,
    pub rolling_window_days: i64,
    pub inter_parent_pause_ms: u64,
    pub page_limit: u32,
    pub log_level: String,
}

impl Config {
    /// Load configuration from the environment, falling back to a local
    /// `.env` file if present. `api_key`, `base_url` and `db_dsn` are
    /// required; everything else has the spec's documented default.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            api_key: require_env("API_KEY")?,
            base_url: require_env("BASE_URL")?,
            db_dsn: require_env("DB_DSN")?,
            requests_per_minute: parse_env("REQUESTS_PER_MINUTE", 30)?,
            max_retries: parse_env("MAX_RETRIES", 5)?,
            rate_limit_sleep_ms: parse_env("RATE_LIMIT_SLEEP_MS", 20_000)?,
            batch_size: parse_env("BATCH_SIZE", 100)?,
            rolling_window_days: parse_env("ROLLING_WINDOW_DAYS", 30)?,
            inter_parent_pause_ms: parse_env("INTER_PARENT_PAUSE_MS", 100)?,
            page_limit: parse_env("PAGE_LIMIT", 100)?,
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    pub fn rate_limit_sleep(&self) -> Duration {
        Duration::from_millis(self.rate_limit_sleep_ms)
    }

    pub fn inter_parent_pause(&self) -> Duration {
        Duration::from_millis(self.inter_parent_pause_ms)
    }
}

fn require_env(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("missing required environment variable {key}"))
}

fn parse_env<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_falls_back_to_default() {
        // SAFETY: single-threaded test, no other test touches this key.
        std::env::remove_var("SOME_UNSET_KEY_XYZ");
        let value: u32 = parse_env("SOME_UNSET_KEY_XYZ", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn parse_env_rejects_garbage() {
        std::env::set_var("SOME_BAD_KEY_XYZ", "not-a-number");
        let result: anyhow::Result<u32> = parse_env("SOME_BAD_KEY_XYZ", 42);
        assert!(result.is_err());
        std::env::remove_var("SOME_BAD_KEY_XYZ");
    }
}
