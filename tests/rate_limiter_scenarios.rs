//! Rate Limiter timing scenarios exercised as black-box integration tests
//! against the crate's public API, using `tokio::time::pause`/`advance`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fulfillment_sync_engine::cancellation::SyncCancellation;
use fulfillment_sync_engine::rate_limiter::{RateLimiter, RateLimiterConfig};
use shared::error::Error;

#[tokio::test(start_paused = true)]
async fn s3_rate_limited_three_times_then_success() {
    let limiter = RateLimiter::new(RateLimiterConfig {
        requests_per_minute: 30,
        max_retries: 3,
        rate_limit_sleep: Duration::from_millis(2000),
    });
    let cancel = SyncCancellation::new();
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();

    let start = tokio::time::Instant::now();
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
    assert!(tokio::time::Instant::now().duration_since(start) >= Duration::from_millis(6000));

    let stats = limiter.stats();
    assert_eq!(stats.successful, 1);
    assert_eq!(stats.retries, 3);
    assert_eq!(stats.rate_limit_hits, 3);
    assert_eq!(stats.failed, 0);
}

#[tokio::test(start_paused = true)]
async fn boundary_429_once_across_two_separate_calls() {
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
