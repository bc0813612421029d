use std::io;

/// All error types for the livefeed crate.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The broker task is gone (or was never started).
    #[error("broker not available")]
    BrokerUnavailable,

    /// The push transport failed after opening. Surfaced as an `error`
    /// event; never retried automatically.
    #[error("transport error: {0}")]
    Transport(String),

    /// A polling or secondary fetch came back non-2xx.
    #[error("fetch failed with status {status} for {url}")]
    FetchStatus { status: u16, url: String },

    /// A fetch response body could not be decoded as expected.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl FeedError {
    /// Stable code string for structured logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            FeedError::BrokerUnavailable => "broker_unavailable",
            FeedError::Transport(_) => "transport_error",
            FeedError::FetchStatus { .. } => "fetch_status",
            FeedError::MalformedResponse(_) => "malformed_response",
            FeedError::ConfigInvalid(_) => "config_invalid",
            FeedError::Io(_) => "io_error",
            FeedError::Serde(_) => "serialization_error",
        }
    }
}
