//! Drift-free elapsed-time rendering for the stopwatch indicator.
//!
//! The renderer never increments a previously displayed value. Every tick
//! recomputes `now - reference_epoch`, so a task that was suspended for an
//! arbitrary stretch (backgrounded tab, laptop sleep) shows the correct
//! value on its very next tick. Missed ticks are skipped, not replayed.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Receives the freshly recomputed elapsed duration once per tick.
pub trait DurationSink: Send + Sync + 'static {
    fn render(&self, elapsed: Duration);
}

/// Compute the fixed reference epoch for a stopwatch that has already been
/// running for `elapsed_seconds` as of now.
///
/// Falls back to `now` if the process clock is too young to subtract from,
/// which only means the display starts from zero instead of the fetched
/// value.
pub fn reference_epoch(elapsed_seconds: u64) -> Instant {
    let now = Instant::now();
    now.checked_sub(Duration::from_secs(elapsed_seconds))
        .unwrap_or(now)
}

/// Elapsed time since the reference epoch, zero if the epoch is in the
/// future.
pub fn elapsed_since(reference: Instant) -> Duration {
    Instant::now().duration_since(reference)
}

/// Render a duration the way the stopwatch popup shows it: `mm:ss`, with
/// an hours field once the stopwatch passes one hour.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// Ticks roughly once per second, pushing the recomputed elapsed value to
/// the sink until stopped or dropped.
pub struct ElapsedTimeRenderer {
    cancel: CancellationToken,
}

impl ElapsedTimeRenderer {
    /// Spawn the ticking task. The first render happens immediately.
    pub fn start(reference: Instant, sink: Arc<dyn DurationSink>) -> Self {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(Duration::from_secs(1));
            // A resumed task must jump straight to the current value
            // rather than replaying every missed second.
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        debug!(event = "feed.render.stopped");
                        return;
                    }
                    _ = ticks.tick() => {
                        sink.render(elapsed_since(reference));
                    }
                }
            }
        });
        Self { cancel }
    }

    /// Stop ticking. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ElapsedTimeRenderer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
