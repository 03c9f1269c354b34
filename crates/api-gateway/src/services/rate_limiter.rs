//! Sliding-window rate limiter.
//!
//! Each client has a bucket holding the instants of its admitted requests
//! within the trailing window. A request is admitted when fewer than `limit`
//! instants remain after pruning; a rejected request is not recorded.
//!
//! # Concurrency
//!
//! The client map is behind an `RwLock` held only long enough to find or
//! insert a bucket. The prune/check/record step runs under the bucket's own
//! mutex, so two requests from one client cannot both take the last slot
//! while unrelated clients never contend.
//!
//! The sweep takes the map write lock and skips any bucket that is referenced
//! outside the map or locked, i.e. one an admit is currently working on.

use crate::observability::metrics::record_rate_limit_sweep;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock, TryLockError};
use std::time::{Duration, Instant};

/// Length of the sliding window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Entries older than this are dropped by the sweep.
pub const SWEEP_HORIZON: Duration = Duration::from_secs(120);

/// Default sweep interval.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Result of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Configured limit per window.
    pub limit: u32,

    /// Slots left in the current window after this request.
    pub remaining: u32,

    /// Time until the window reported in `X-RateLimit-Reset` ends.
    pub reset_after: Duration,

    /// Set when the request was rejected: time until the oldest counted
    /// request leaves the window.
    pub retry_after: Option<Duration>,
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        self.retry_after.is_none()
    }

    /// Retry-after in whole seconds, rounded up, at least 1.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after.map(|d| {
            let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
            secs.max(1)
        })
    }
}

#[derive(Debug, Default)]
struct Bucket {
    timestamps: VecDeque<Instant>,
}

impl Bucket {
    /// Drop timestamps at least `max_age` old. Timestamps are in arrival order.
    fn prune(&mut self, now: Instant, max_age: Duration) {
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_duration_since(*oldest) >= max_age {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Per-client sliding-window limiter.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    sweep_interval: Duration,
    buckets: RwLock<HashMap<String, Arc<Mutex<Bucket>>>>,
    last_sweep: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter admitting `limit` requests per client per window.
    pub fn new(limit: u32, sweep_interval: Duration) -> Self {
        Self {
            limit,
            sweep_interval,
            buckets: RwLock::new(HashMap::new()),
            last_sweep: Mutex::new(None),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn bucket_for(&self, client: &str) -> Arc<Mutex<Bucket>> {
        {
            let buckets = self.buckets.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(bucket) = buckets.get(client) {
                return Arc::clone(bucket);
            }
        }

        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(buckets.entry(client.to_string()).or_default())
    }

    /// Check and record one request from `client` at `now`.
    pub fn admit(&self, client: &str, now: Instant) -> Decision {
        let bucket = self.bucket_for(client);
        let mut bucket = bucket.lock().unwrap_or_else(PoisonError::into_inner);

        bucket.prune(now, WINDOW);

        let count = u32::try_from(bucket.timestamps.len()).unwrap_or(u32::MAX);
        if count >= self.limit {
            let retry_after = bucket
                .timestamps
                .front()
                .map(|oldest| WINDOW.saturating_sub(now.saturating_duration_since(*oldest)))
                .unwrap_or(WINDOW);

            return Decision {
                limit: self.limit,
                remaining: 0,
                reset_after: WINDOW,
                retry_after: Some(retry_after),
            };
        }

        bucket.timestamps.push_back(now);

        Decision {
            limit: self.limit,
            remaining: self.limit - count - 1,
            reset_after: WINDOW,
            retry_after: None,
        }
    }

    /// Drop stale entries across all clients and forget empty clients.
    ///
    /// A no-op when the previous sweep ran less than the sweep interval
    /// before `now`. Returns the number of clients removed.
    pub fn sweep(&self, now: Instant) -> usize {
        {
            let mut last = self.last_sweep.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(previous) = *last {
                if now.saturating_duration_since(previous) < self.sweep_interval {
                    return 0;
                }
            }
            *last = Some(now);
        }

        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
        let before = buckets.len();

        buckets.retain(|_, bucket| {
            // An admit holds a clone while it works on the bucket.
            if Arc::strong_count(bucket) > 1 {
                return true;
            }
            match bucket.try_lock() {
                Ok(mut guard) => {
                    guard.prune(now, SWEEP_HORIZON);
                    !guard.timestamps.is_empty()
                }
                Err(TryLockError::Poisoned(poisoned)) => {
                    let mut guard = poisoned.into_inner();
                    guard.prune(now, SWEEP_HORIZON);
                    !guard.timestamps.is_empty()
                }
                Err(TryLockError::WouldBlock) => true,
            }
        });

        let removed = before - buckets.len();
        record_rate_limit_sweep(removed, buckets.len());

        tracing::debug!(
            target: "gw.middleware.rate_limit",
            removed = removed,
            remaining = buckets.len(),
            "Rate limiter sweep complete"
        );

        removed
    }
}
