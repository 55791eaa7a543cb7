//! # Rate Limiting
//!
//! Sliding-window request limiting backed by the shared [`KeyValueStore`].
//!
//! Each `(bucket, identity)` pair owns a list of request timestamps (Unix
//! milliseconds) stored under `rate-limit:<bucket>:<identity>`. Buckets keep
//! independently configured limiters (login, registration, webhooks) from
//! sharing quota even though they share the store.
//!
//! The check is an unlocked read-modify-write. Concurrent bursts from the
//! same identity can occasionally be over-admitted; the limiter bounds abuse,
//! it does not meter exactly.

use crate::clock::Clock;
use crate::store::{keys, KeyValueStore, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Limit and window of a sliding-window limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Maximum requests admitted per window
    pub limit: u32,
    /// Length of the sliding window
    pub window: Duration,
}

impl RateLimitPolicy {
    /// Create a policy admitting `limit` requests per `window`
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }

    /// Create a per-minute policy
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    fn window_millis(&self) -> i64 {
        i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX)
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::per_minute(10)
    }
}

/// Outcome of a single rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request is admitted
    pub allowed: bool,
    /// Requests still available in the current window
    pub remaining: u32,
    /// When the oldest counted request leaves the window
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Whole seconds until `reset_at`, never less than one
    pub fn retry_after_seconds(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0) as u64;
        millis.div_ceil(1000).max(1)
    }
}

/// Sliding-window limiter over the shared store
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    /// Create new limiter
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        policy: RateLimitPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    /// Policy this limiter enforces
    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Count a request from `identity` against `bucket`
    ///
    /// Timestamps that have left the window are discarded. When the window
    /// is already full the request is rejected without being recorded and
    /// `reset_at` is the moment the oldest counted request expires.
    /// Otherwise `now` is appended and persisted.
    ///
    /// # Errors
    ///
    /// Only store failures are errors; exceeding the limit is reported via
    /// [`RateLimitDecision::allowed`].
    pub async fn check(
        &self,
        identity: &str,
        bucket: &str,
    ) -> Result<RateLimitDecision, StoreError> {
        let key = keys::rate_limit(bucket, identity);
        let now = self.clock.now_unix_millis();
        let window = self.policy.window_millis();
        let window_start = now.saturating_sub(window);

        let mut timestamps: Vec<i64> = match self.store.get_item(&key).await? {
            Some(value) => parse_timestamps(&key, value),
            None => Vec::new(),
        };
        timestamps.retain(|&ts| ts > window_start);
        timestamps.sort_unstable();

        let limit = self.policy.limit as usize;
        if timestamps.len() >= limit {
            let oldest = timestamps.first().copied().unwrap_or(now);
            let decision = RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at: millis_to_datetime(oldest.saturating_add(window)),
            };
            warn!(
                bucket = %bucket,
                identity = %identity,
                limit = self.policy.limit,
                reset_at = %decision.reset_at,
                "Rate limit exceeded"
            );
            return Ok(decision);
        }

        timestamps.push(now);
        self.store.set_item(&key, Value::from(timestamps.clone())).await?;

        let oldest = timestamps.first().copied().unwrap_or(now);
        let remaining = (limit - timestamps.len()) as u32;
        debug!(bucket = %bucket, remaining, "Rate limit check passed");

        Ok(RateLimitDecision {
            allowed: true,
            remaining,
            reset_at: millis_to_datetime(oldest.saturating_add(window)),
        })
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Read a stored window, treating anything unexpected as an empty window
fn parse_timestamps(key: &str, value: Value) -> Vec<i64> {
    match value {
        Value::Array(items) => items.iter().filter_map(Value::as_i64).collect(),
        other => {
            warn!(key = %key, kind = ?other, "Discarding malformed rate-limit window");
            Vec::new()
        }
    }
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod tests;
