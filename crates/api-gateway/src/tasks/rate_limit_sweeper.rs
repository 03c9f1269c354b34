//! Rate limiter sweep background task.
//!
//! Periodically drops stale request timestamps and forgets clients that have
//! gone idle, bounding the limiter's memory.
//!
//! # Graceful Shutdown
//!
//! The task exits when its cancellation token is triggered.

use crate::services::rate_limiter::RateLimiter;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Start the sweeper.
///
/// Sweeps every `limiter.sweep_interval()`; the first sweep runs immediately.
/// Returns when the cancellation token is triggered.
#[instrument(skip_all, name = "gw.task.rate_limit_sweeper")]
pub async fn start_rate_limit_sweeper(limiter: Arc<RateLimiter>, cancel_token: CancellationToken) {
    let period = limiter.sweep_interval();

    info!(
        target: "gw.task.rate_limit_sweeper",
        interval_secs = period.as_secs(),
        "Starting rate limit sweeper task"
    );

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            tick = interval.tick() => {
                // Tick deadlines are at least one period apart.
                let removed = limiter.sweep(tick.into_std());
                if removed > 0 {
                    info!(
                        target: "gw.task.rate_limit_sweeper",
                        removed = removed,
                        "Removed idle rate limit clients"
                    );
                }
            }
            () = cancel_token.cancelled() => {
                info!(
                    target: "gw.task.rate_limit_sweeper",
                    "Rate limit sweeper received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "gw.task.rate_limit_sweeper", "Rate limit sweeper stopped");
}
