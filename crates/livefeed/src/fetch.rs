//! The HTTP collaborator seam.
//!
//! The subsystem never spins up its own HTTP client; callers supply
//! something that can GET and POST and hand back status + body. CSRF
//! attachment, cookies, and base-URL resolution all live behind this trait.

use serde::de::DeserializeOwned;

use crate::errors::FeedError;

/// Response handed back by a [`Fetcher`].
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    /// Successful 2xx response with the given body.
    pub fn ok_with(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    /// Whether the status is in the 2xx range.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text.
    pub fn text(&self) -> &str {
        &self.body
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, FeedError> {
        serde_json::from_str(&self.body)
            .map_err(|e| FeedError::MalformedResponse(format!("{}: {}", e, self.body)))
    }
}

/// Issues plain request/response fetches for polling and secondary loads.
///
/// Errors are network-level failures; HTTP-level failures come back as a
/// [`FetchResponse`] with a non-2xx status so callers can log the status.
pub trait Fetcher: Send + Sync + 'static {
    fn get(&self, url: &str) -> impl Future<Output = Result<FetchResponse, FeedError>> + Send;

    fn post(
        &self,
        url: &str,
        body: &str,
    ) -> impl Future<Output = Result<FetchResponse, FeedError>> + Send;
}

/// Turn a response into an error unless it is 2xx.
pub fn require_ok(response: FetchResponse, url: &str) -> Result<FetchResponse, FeedError> {
    if response.ok() {
        Ok(response)
    } else {
        Err(FeedError::FetchStatus {
            status: response.status,
            url: url.to_string(),
        })
    }
}
