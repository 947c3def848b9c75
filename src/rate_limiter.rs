//! Rate Limiter (spec §4.A).
//!
//! A single-consumer FIFO queue: `execute` takes an execution guard mutex
//! before doing anything, so only one submitted operation — including all
//! of its retries — is ever being served at a time, in submission order.
//! Inter-request spacing and 429 back-off are both enforced by the same
//! consumer, never by nested callbacks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

use crate::cancellation::SyncCancellation;
use shared::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    pub requests_per_minute: u32,
    pub max_retries: u32,
    pub rate_limit_sleep: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 30,
            max_retries: 5,
            rate_limit_sleep: Duration::from_secs(20),
        }
    }
}

/// Atomic counters observable for diagnostics; not part of correctness.
#[derive(Debug, Default)]
pub struct RateLimiterStats {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
    rate_limit_hits: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatsSnapshot {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub retries: u64,
    pub rate_limit_hits: u64,
}

impl RateLimiterStats {
    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            successful: self.successful.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            rate_limit_hits: self.rate_limit_hits.load(Ordering::Relaxed),
        }
    }
}

pub struct RateLimiter {
    config: RateLimiterConfig,
    /// FIFO serialization point: holding this guard is "being served".
    queue: Mutex<()>,
    last_started: Mutex<Option<Instant>>,
    stats: Arc<RateLimiterStats>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            queue: Mutex::new(()),
            last_started: Mutex::new(None),
            stats: Arc::new(RateLimiterStats::default()),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn min_interval(&self) -> Duration {
        Duration::from_secs_f64(60.0 / self.config.requests_per_minute as f64)
    }

    /// Serve `f`, retrying in place on `Error::RateLimited` up to
    /// `max_retries` times, sleeping `rate_limit_sleep` between attempts.
    /// All other errors propagate immediately. The FIFO guard is held for
    /// the entire call, including retries.
    pub async fn execute<F, Fut, T>(&self, cancel: &SyncCancellation, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let _guard = self.queue.lock().await;
        self.stats.total.fetch_add(1, Ordering::Relaxed);

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.wait_for_slot(cancel).await?;

        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            match f().await {
                Ok(value) => {
                    self.stats.successful.fetch_add(1, Ordering::Relaxed);
                    return Ok(value);
                }
                Err(Error::RateLimited) => {
                    self.stats.rate_limit_hits.fetch_add(1, Ordering::Relaxed);

                    if attempt >= self.config.max_retries {
                        self.stats.failed.fetch_add(1, Ordering::Relaxed);
                        return Err(Error::UpstreamFailure(
                            "rate limit retries exhausted".to_string(),
                        ));
                    }

                    attempt += 1;
                    self.stats.retries.fetch_add(1, Ordering::Relaxed);
                    warn!(attempt, "rate limited, sleeping before retry");
                    self.sleep_or_cancel(self.config.rate_limit_sleep, cancel)
                        .await?;
                }
                Err(other) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    return Err(other);
                }
            }
        }
    }

    async fn wait_for_slot(&self, cancel: &SyncCancellation) -> Result<()> {
        let wait = {
            let mut last = self.last_started.lock().await;
            let now = Instant::now();
            let wait = match *last {
                Some(previous) => {
                    let elapsed = now.duration_since(previous);
                    self.min_interval().saturating_sub(elapsed)
                }
                None => Duration::ZERO,
            };
            *last = Some(now + wait);
            wait
        };

        if wait.is_zero() {
            return Ok(());
        }
        self.sleep_or_cancel(wait, cancel).await
    }

    async fn sleep_or_cancel(&self, duration: Duration, cancel: &SyncCancellation) -> Result<()> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = poll_cancelled(cancel) => Err(Error::Cancelled),
        }
    }
}

async fn poll_cancelled(cancel: &SyncCancellation) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test(start_paused = true)]
    async fn spaces_requests_by_sixty_over_rpm() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            requests_per_minute: 30,
            ..Default::default()
        });
        let cancel = SyncCancellation::new();

        let start = Instant::now();
        limiter.execute(&cancel, || async { Ok::<_, Error>(1) }).await.unwrap();
        limiter.execute(&cancel, || async { Ok::<_, Error>(2) }).await.unwrap();
        let elapsed = Instant::now().duration_since(start);

        assert!(elapsed >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_on_rate_limited_then_succeeds() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            requests_per_minute: 6000, // effectively no spacing, isolate retry behavior
            max_retries: 3,
            rate_limit_sleep: Duration::from_secs(2),
        });
        let cancel = SyncCancellation::new();
        let calls = Arc::new(AtomicU32::new(0));

        let calls_clone = calls.clone();
        let start = Instant::now();
        let result = limiter
            .execute(&cancel, || {
                let calls = calls_clone.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        Err(Error::RateLimited)
                    } else {
                        Ok(99)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 99);
        assert!(Instant::now().duration_since(start) >= Duration::from_secs(2));

        let stats = limiter.stats();
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.retries, 1);
        assert_eq!(stats.rate_limit_hits, 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn s3_scenario_429_three_times_then_success() {
        // S3: R=30, cool-down 2000ms, max_retries 3; f returns 429 three
        // times then 200. Expect success after >= 6000ms of sleep, with
        // one success, three retries, three rate-limit hits.
        let limiter = RateLimiter::new(RateLimiterConfig {
            requests_per_minute: 30,
            max_retries: 3,
            rate_limit_sleep: Duration::from_millis(2000),
        });
        let cancel = SyncCancellation::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let start = Instant::now();
        let result = limiter
            .execute(&cancel, || {
                let calls = calls_clone.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 3 {
                        Err(Error::RateLimited)
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert!(Instant::now().duration_since(start) >= Duration::from_millis(6000));

        let stats = limiter.stats();
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.retries, 3);
        assert_eq!(stats.rate_limit_hits, 3);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_retries_and_becomes_upstream_failure() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            requests_per_minute: 6000,
            max_retries: 2,
            rate_limit_sleep: Duration::from_millis(10),
        });
        let cancel = SyncCancellation::new();

        let result = limiter
            .execute(&cancel, || async { Err::<(), _>(Error::RateLimited) })
            .await;

        assert!(matches!(result, Err(Error::UpstreamFailure(_))));
        let stats = limiter.stats();
        assert_eq!(stats.rate_limit_hits, 3); // 1 initial + 2 retries
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn non_rate_limit_errors_propagate_immediately() {
        let limiter = RateLimiter::new(RateLimiterConfig::default());
        let cancel = SyncCancellation::new();

        let result = limiter
            .execute(&cancel, || async { Err::<(), _>(Error::Http(500)) })
            .await;

        assert!(matches!(result, Err(Error::Http(500))));
        let stats = limiter.stats();
        assert_eq!(stats.retries, 0);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn boundary_429_once_then_two_clean_calls() {
        // A 429 on the first call, then two separate calls that both
        // succeed on the first attempt: hits=1, retries=1, successes=2,
        // failures=0 across the limiter's lifetime, not just one call.
        let limiter = RateLimiter::new(RateLimiterConfig {
            requests_per_minute: 6000,
            max_retries: 3,
            rate_limit_sleep: Duration::from_millis(10),
        });
        let cancel = SyncCancellation::new();
        let calls = Arc::new(AtomicU32::new(0));

        let calls_clone = calls.clone();
        limiter
            .execute(&cancel, || {
                let calls = calls_clone.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        Err(Error::RateLimited)
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .unwrap();

        limiter.execute(&cancel, || async { Ok::<_, Error>(()) }).await.unwrap();

        let stats = limiter.stats();
        assert_eq!(stats.rate_limit_hits, 1);
        assert_eq!(stats.retries, 1);
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn cancellation_short_circuits() {
        let limiter = RateLimiter::new(RateLimiterConfig::default());
        let cancel = SyncCancellation::new();
        cancel.cancel();

        let result = limiter.execute(&cancel, || async { Ok::<_, Error>(1) }).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
