use serde::{Deserialize, Serialize};

use crate::types::{LogoutNotice, NotificationCount, StopwatchRecord};

/// Tab port -> broker control messages.
///
/// Each variant maps to a JSON message with `"type"` as the tag field.
/// `Start` is sent once after attaching and carries the push endpoint URL;
/// the first `Start` in a session opens the shared transport, later ones
/// reuse it. `Close` is sent when the tab goes away (explicitly, or from
/// the port's unload/drop hook).
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    Start { url: String },
    Close,
}

/// Server -> broker payloads read off the push stream.
///
/// Newline-delimited JSON with `"type"` as the tag field. Unknown types
/// from future servers fail to deserialize and are dropped by the reader,
/// never surfaced as transport errors.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PushPayload {
    NotificationCount { data: NotificationCount },
    Stopwatches { data: Vec<StopwatchRecord> },
    Logout { data: LogoutNotice },
    Close,
}

/// Broker -> tab port events.
///
/// Superset of [`PushPayload`]: the broker forwards server payloads and
/// additionally synthesizes `NoEventSource` (push unsupported, caller must
/// poll), `Error` (transport failure, no auto-retry), and `Close`
/// (connection torn down).
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FeedEvent {
    NotificationCount { data: NotificationCount },
    Stopwatches { data: Vec<StopwatchRecord> },
    NoEventSource,
    Error { data: String },
    Logout,
    Close,
}
