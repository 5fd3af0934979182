//! Per-user rate limiting using the token bucket algorithm
//!
//! Every campaign a user owns draws from the same bucket, so running several
//! campaigns at once never exceeds the user's per-minute ceiling.
//!
//! # Token Bucket Algorithm
//!
//! - The bucket holds at most `limit_per_minute` tokens and starts full
//! - Tokens refill continuously at `limit_per_minute / 60000` per millisecond
//! - Each send consumes one token
//! - An empty bucket answers "no" immediately; nothing ever waits here
//!
//! The bucket lives in the shared key-value store as
//! `{"tokens": f64, "last_refill_ms": i64}` under `rate:{user}`, so the
//! limiter itself is stateless across invocations. Two invocations racing on
//! the same key can both read the same state; that is accepted because a
//! user's campaigns are processed effectively serially by the trigger cadence.

use std::{sync::Arc, time::Duration};

use missive_common::ids::UserId;
use missive_store::KeyValueStore;
use serde::{Deserialize, Serialize};

use crate::{clock::Clock, error::DispatchError};

const MILLIS_PER_MINUTE: f64 = 60_000.0;

/// A bucket untouched for this long is full again, so it may as well expire
const BUCKET_TTL: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct TokenBucket {
    tokens: f64,
    last_refill_ms: i64,
}

impl TokenBucket {
    fn full(limit_per_minute: u32, now_ms: i64) -> Self {
        Self {
            tokens: f64::from(limit_per_minute),
            last_refill_ms: now_ms,
        }
    }

    /// Add tokens for the time elapsed since the last refill, capped at the limit
    #[allow(clippy::cast_precision_loss)]
    fn refill(&mut self, limit_per_minute: u32, now_ms: i64) {
        let capacity = f64::from(limit_per_minute);
        // Clock skew between processes must never drain the bucket
        let elapsed = now_ms.saturating_sub(self.last_refill_ms).max(0) as f64;

        self.tokens = (self.tokens + elapsed * capacity / MILLIS_PER_MINUTE).min(capacity);
        self.last_refill_ms = self.last_refill_ms.max(now_ms);
    }

    fn try_consume(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Statistics for a user's bucket
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitStats {
    /// Currently available tokens
    pub available_tokens: f64,
    /// Maximum capacity (the per-minute limit)
    pub capacity: f64,
    /// Tokens added per second
    pub refill_rate: f64,
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { kv, clock }
    }

    fn key(user: UserId) -> String {
        format!("rate:{user}")
    }

    /// Take one token from `user`'s bucket if one is available.
    ///
    /// The refilled state is persisted either way.
    ///
    /// # Errors
    ///
    /// Fails only if the key-value store does.
    pub async fn try_acquire(&self, user: UserId, limit_per_minute: u32) -> Result<bool, DispatchError> {
        let key = Self::key(user);
        let now_ms = self.clock.now().timestamp_millis();

        let mut bucket = self.load(&key, limit_per_minute, now_ms).await?;
        bucket.refill(limit_per_minute, now_ms);
        let acquired = bucket.try_consume();

        self.kv
            .set(&key, encode(&bucket), Some(BUCKET_TTL))
            .await?;

        if !acquired {
            tracing::debug!(
                %user,
                limit_per_minute,
                available = bucket.tokens,
                "Rate limit exceeded, stopping batch"
            );
        }

        Ok(acquired)
    }

    /// The refilled view of `user`'s bucket, without consuming anything
    ///
    /// # Errors
    ///
    /// Fails only if the key-value store does.
    pub async fn stats(&self, user: UserId, limit_per_minute: u32) -> Result<RateLimitStats, DispatchError> {
        let now_ms = self.clock.now().timestamp_millis();
        let mut bucket = self.load(&Self::key(user), limit_per_minute, now_ms).await?;
        bucket.refill(limit_per_minute, now_ms);

        let capacity = f64::from(limit_per_minute);
        Ok(RateLimitStats {
            available_tokens: bucket.tokens,
            capacity,
            refill_rate: capacity / 60.0,
        })
    }

    async fn load(&self, key: &str, limit_per_minute: u32, now_ms: i64) -> Result<TokenBucket, DispatchError> {
        let Some(raw) = self.kv.get(key).await? else {
            return Ok(TokenBucket::full(limit_per_minute, now_ms));
        };

        Ok(serde_json::from_str(&raw).unwrap_or_else(|err| {
            tracing::warn!(key, error = %err, "Discarding unreadable rate bucket");
            TokenBucket::full(limit_per_minute, now_ms)
        }))
    }
}

fn encode(bucket: &TokenBucket) -> String {
    // Two plain numbers; this cannot fail
    serde_json::to_string(bucket).unwrap_or_else(|_| {
        format!(
            r#"{{"tokens":{},"last_refill_ms":{}}}"#,
            bucket.tokens, bucket.last_refill_ms
        )
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use missive_store::MemoryKeyValueStore;

    use super::*;
    use crate::clock::ManualClock;

    fn limiter() -> (RateLimiter, ManualClock, Arc<MemoryKeyValueStore>) {
        let clock = ManualClock::new(Utc::now());
        let kv = Arc::new(MemoryKeyValueStore::new());
        (
            RateLimiter::new(kv.clone(), Arc::new(clock.clone())),
            clock,
            kv,
        )
    }

    #[test]
    fn test_token_bucket_refill_is_capped() {
        let mut bucket = TokenBucket {
            tokens: 0.0,
            last_refill_ms: 0,
        };

        bucket.refill(60, 30_000);
        assert!((bucket.tokens - 30.0).abs() < 1e-9);

        bucket.refill(60, 10 * 60_000);
        assert!((bucket.tokens - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_token_bucket_ignores_clock_going_backwards() {
        let mut bucket = TokenBucket {
            tokens: 2.0,
            last_refill_ms: 10_000,
        };

        bucket.refill(60, 5_000);
        assert!((bucket.tokens - 2.0).abs() < 1e-9);
        assert_eq!(bucket.last_refill_ms, 10_000);
    }

    #[tokio::test]
    async fn test_burst_allows_at_most_limit() {
        let (limiter, _clock, _kv) = limiter();
        let user = UserId::generate();

        let mut granted = 0;
        for _ in 0..25 {
            if limiter.try_acquire(user, 10).await.unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 10);
    }

    #[tokio::test]
    async fn test_refills_proportionally_to_elapsed_time() {
        let (limiter, clock, _kv) = limiter();
        let user = UserId::generate();

        assert!(limiter.try_acquire(user, 2).await.unwrap());
        assert!(limiter.try_acquire(user, 2).await.unwrap());
        assert!(!limiter.try_acquire(user, 2).await.unwrap());

        // Half a token after 15s at 2/min
        clock.advance(chrono::Duration::seconds(15));
        assert!(!limiter.try_acquire(user, 2).await.unwrap());

        clock.advance(chrono::Duration::seconds(15));
        assert!(limiter.try_acquire(user, 2).await.unwrap());
        assert!(!limiter.try_acquire(user, 2).await.unwrap());
    }

    #[tokio::test]
    async fn test_buckets_are_per_user() {
        let (limiter, _clock, _kv) = limiter();
        let (a, b) = (UserId::generate(), UserId::generate());

        assert!(limiter.try_acquire(a, 1).await.unwrap());
        assert!(!limiter.try_acquire(a, 1).await.unwrap());
        assert!(limiter.try_acquire(b, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_zero_limit_never_grants() {
        let (limiter, clock, _kv) = limiter();
        let user = UserId::generate();

        assert!(!limiter.try_acquire(user, 0).await.unwrap());
        clock.advance(chrono::Duration::minutes(5));
        assert!(!limiter.try_acquire(user, 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_stats_do_not_consume() {
        let (limiter, _clock, _kv) = limiter();
        let user = UserId::generate();

        assert!(limiter.try_acquire(user, 6).await.unwrap());

        let stats = limiter.stats(user, 6).await.unwrap();
        assert!((stats.available_tokens - 5.0).abs() < 1e-9);
        assert!((stats.capacity - 6.0).abs() < f64::EPSILON);
        assert!((stats.refill_rate - 0.1).abs() < 1e-9);

        let again = limiter.stats(user, 6).await.unwrap();
        assert_eq!(stats, again);
    }

    #[tokio::test]
    async fn test_unreadable_bucket_starts_full() {
        let (limiter, _clock, kv) = limiter();
        let user = UserId::generate();
        kv.set(&format!("rate:{user}"), "not json".to_string(), None)
            .await
            .unwrap();

        assert!(limiter.try_acquire(user, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_store_outage_is_an_error() {
        let (limiter, _clock, kv) = limiter();
        kv.set_offline(true);

        assert!(limiter.try_acquire(UserId::generate(), 1).await.is_err());
    }
}
