//! Error taxonomy shared by every component of the sync engine.
//!
//! Mirrors the classification in spec §7: each upstream/database failure
//! mode gets its own variant so the Sync Engine can decide, per variant,
//! whether a sync is resumable (`error_recoverable`) or terminal (`failed`).

use serde::Serialize;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Upstream responded 429. Only ever surfaces once the Rate Limiter has
    /// exhausted its own retries (see `rate_limiter::RateLimiter::execute`).
    #[error("rate limit exceeded after retries")]
    RateLimited,

    /// Network/DNS/timeout failure talking to the vendor.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Any non-2xx, non-429 HTTP status from the vendor.
    #[error("http error: status {0}")]
    Http(u16),

    /// Malformed JSON or a schema mismatch in the decoded payload.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A single record was missing a required field (e.g. its primary key).
    /// Skipped and counted by the caller, never fatal to the sync.
    #[error("mapping error: {0}")]
    Mapping(String),

    /// Transaction aborted, deadlock, serialization failure. The chunk rolls
    /// back; the sync is left `error_recoverable` and resumable.
    #[error("recoverable database error: {0}")]
    DatabaseRecoverable(String),

    /// Connection lost beyond retry, schema mismatch, or anything else the
    /// engine cannot resume from.
    #[error("fatal database error: {0}")]
    DatabaseFatal(String),

    /// Cooperative cancellation observed at a suspension point.
    #[error("cancelled")]
    Cancelled,

    /// The upstream request failed even after the Rate Limiter's retries.
    #[error("upstream failure: {0}")]
    UpstreamFailure(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the sync should be left resumable (`error_recoverable`)
    /// rather than marked `failed`, per spec §7's propagation policy.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::DatabaseRecoverable(_) | Error::Cancelled
        )
    }

    pub fn mapping(message: impl Into<String>) -> Self {
        Error::Mapping(message.into())
    }

    pub fn database_recoverable(message: impl Into<String>) -> Self {
        Error::DatabaseRecoverable(message.into())
    }

    pub fn database_fatal(message: impl Into<String>) -> Self {
        Error::DatabaseFatal(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// Classify an HTTP status the way the client is required to: 429 is
    /// `RateLimited`, anything else outside [200, 300) is `Http(status)`.
    pub fn from_status(status: u16) -> Self {
        if status == 429 {
            Error::RateLimited
        } else {
            Error::Http(status)
        }
    }
}

/// A completed sync's user-visible outcome (spec §7 "User-visible outcomes").
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub success: bool,
    pub items_processed: u64,
    pub error: Option<String>,
}

impl SyncOutcome {
    pub fn success(items_processed: u64) -> Self {
        Self {
            success: true,
            items_processed,
            error: None,
        }
    }

    pub fn failure(items_processed: u64, error: impl Into<String>) -> Self {
        Self {
            success: false,
            items_processed,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_429_as_rate_limited() {
        assert!(matches!(Error::from_status(429), Error::RateLimited));
    }

    #[test]
    fn classifies_other_status_as_http() {
        assert!(matches!(Error::from_status(500), Error::Http(500)));
    }

    #[test]
    fn recoverable_set_matches_spec() {
        assert!(Error::database_recoverable("deadlock").is_recoverable());
        assert!(Error::Cancelled.is_recoverable());
        assert!(!Error::database_fatal("schema mismatch").is_recoverable());
        assert!(!Error::RateLimited.is_recoverable());
        assert!(!Error::UpstreamFailure("retries exhausted".into()).is_recoverable());
    }
}
