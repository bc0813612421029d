//! Message types and stream framing for the livefeed delivery subsystem.
//!
//! Three message families share this crate:
//! - [`PushPayload`]: what the server writes onto the push stream
//!   (newline-delimited JSON, `type`-tagged).
//! - [`ControlMessage`]: what a tab port sends to the session broker.
//! - [`FeedEvent`]: what the broker fans out to every attached port.
//!
//! The broker and its clients both depend on this crate so the framing
//! logic lives in exactly one place.

pub mod codec;
pub mod messages;
pub mod types;

// Primary re-exports
pub use codec::{read_payload, write_payload};
pub use messages::{ControlMessage, FeedEvent, PushPayload};
pub use types::{LogoutNotice, NotificationCount, StopwatchRecord};

/// Errors from decoding the push stream.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A line arrived that is not valid JSON for any known payload.
    /// Recoverable: callers log and keep reading the stream.
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether the stream can continue to be read after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProtocolError::Malformed(_))
    }
}
