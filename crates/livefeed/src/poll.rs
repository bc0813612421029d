//! Timed polling, the fallback delivery path.
//!
//! One cooperative loop per surface: sleep, fetch, compare. The next cycle
//! is only scheduled after the current comparison completes, so overlapping
//! fetches are impossible by construction. The interval adapts: it grows by
//! a fixed step while nothing changes and snaps back to the minimum on any
//! change.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::PollConfig;
use crate::errors::FeedError;

/// Adaptive poll interval, bounded to `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollState {
    current: Duration,
    min: Duration,
    max: Duration,
    step: Duration,
}

impl PollState {
    pub fn new(config: PollConfig) -> Self {
        let min = Duration::from_millis(config.min_ms);
        Self {
            current: min,
            min,
            max: Duration::from_millis(config.max_ms),
            step: Duration::from_millis(config.step_ms),
        }
    }

    /// The interval to sleep before the next fetch.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// An unchanged result grows the interval by one step, capped at max.
    pub fn unchanged(&mut self) {
        self.current = (self.current + self.step).min(self.max);
    }

    /// Any change snaps the interval back to the minimum.
    pub fn changed(&mut self) {
        self.current = self.min;
    }
}

/// Run the polling loop for one surface until `cancel` fires.
///
/// `fetch` produces the authoritative value; when it differs from the last
/// known one, `on_change` is awaited with the fresh value before the next
/// cycle is scheduled. Fetch failures leave the surface value unchanged and
/// the next cycle retries naturally (growing the interval like an unchanged
/// result).
///
/// A hung fetch stalls this surface until it resolves; there is no
/// per-request timeout here.
pub async fn run_poll_loop<T, FetchFn, FetchFut, ApplyFn, ApplyFut>(
    config: PollConfig,
    cancel: CancellationToken,
    mut last: T,
    mut fetch: FetchFn,
    mut on_change: ApplyFn,
) where
    T: PartialEq + Clone,
    FetchFn: FnMut() -> FetchFut,
    FetchFut: Future<Output = Result<T, FeedError>>,
    ApplyFn: FnMut(T) -> ApplyFut,
    ApplyFut: Future<Output = ()>,
{
    let mut backoff = PollState::new(config);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(event = "feed.poll.cancelled");
                return;
            }
            _ = tokio::time::sleep(backoff.current()) => {}
        }

        match fetch().await {
            Ok(value) => {
                if value != last {
                    backoff.changed();
                    last = value.clone();
                    on_change(value).await;
                } else {
                    backoff.unchanged();
                }
            }
            Err(e) => {
                warn!(
                    event = "feed.poll.cycle_failed",
                    error = %e,
                    code = e.error_code(),
                );
                backoff.unchanged();
            }
        }
    }
}
