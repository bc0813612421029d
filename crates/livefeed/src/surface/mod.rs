//! Per-surface update coordinators.
//!
//! One coordinator per surface per tab decides which delivery path is
//! active (push first, polling fallback), applies incoming data to its
//! sinks, and drives sequence-guarded secondary fetches.

pub mod notification;
pub mod stopwatch;

/// Delivery state of one surface in one tab.
///
/// `Idle` means the surface's indicator is absent on this page and the
/// coordinator never started — the normal case on most pages. Push and
/// polling are mutually exclusive per surface per tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    Idle,
    Attaching,
    PushActive,
    PollingActive,
    TornDown,
}

impl SurfaceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SurfaceState::Idle => "idle",
            SurfaceState::Attaching => "attaching",
            SurfaceState::PushActive => "push_active",
            SurfaceState::PollingActive => "polling_active",
            SurfaceState::TornDown => "torn_down",
        }
    }
}
