// =============================================================================
// rate_limiter.rs — THE THREE SECOND RULE
// =============================================================================
//
// One timestamp, owned by the connector's worker task and touched by nobody
// else. Before a pipeline starts we wait out whatever is left of the interval
// since the last stamp. The connector stamps before AND after each pipeline,
// so the gap is measured from the end of the previous query, not its start.
//
// The sleep runs on the worker itself. While it sleeps, nothing is read from
// the inbound queues.
// =============================================================================

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Minimum spacing between query pipelines of a single connector.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last: Instant,
}

impl RateLimiter {
    /// A limiter whose clock starts now, so the very first pipeline also
    /// waits out a full interval after startup.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleep until at least `interval` has passed since the last stamp.
    /// Returns how long we slept.
    pub async fn wait(&self) -> Duration {
        let elapsed = self.last.elapsed();
        if elapsed >= self.interval {
            return Duration::ZERO;
        }

        let remaining = self.interval - elapsed;
        debug!(remaining_ms = remaining.as_millis() as u64, "rate limit: holding the next query");
        tokio::time::sleep_until(self.last + self.interval).await;
        remaining
    }

    /// Record that a pipeline just started or finished.
    pub fn stamp(&mut self) {
        self.last = Instant::now();
    }
}
