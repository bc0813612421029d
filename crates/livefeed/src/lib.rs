//! Live-state update delivery.
//!
//! Keeps per-tab indicator surfaces (notification badge/table, stopwatch)
//! synchronized with authoritative server state: one shared push
//! connection per session with cross-tab fan-out, adaptive polling as the
//! fallback path, sequence-guarded secondary fetches, and drift-free
//! elapsed-time rendering.

pub mod broker;
pub mod config;
pub mod errors;
pub mod fetch;
pub mod poll;
pub mod render;
pub mod seq;
pub mod surface;

// Primary re-exports
pub use broker::{BrokerHandle, ConnectError, Navigator, Port, PushConnector, spawn_broker};
pub use config::{FeedConfig, PollConfig, load_feed_config};
pub use errors::FeedError;
pub use fetch::{FetchResponse, Fetcher};
pub use render::{DurationSink, ElapsedTimeRenderer};
pub use seq::SequenceGuard;
pub use surface::SurfaceState;
pub use surface::notification::{BadgeSink, NotificationCoordinator, NotificationStatus, TableSink};
pub use surface::stopwatch::{StopwatchCoordinator, StopwatchSink};
