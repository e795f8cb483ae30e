//! Feed error types.

use std::time::Duration;

use super::types::Feed;

/// Errors from a single feed fetch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// No complete response within the timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The server answered with a non-2xx status.
    #[error("HTTP error {status}")]
    Http { status: u16 },

    /// The body was not valid JSON, or did not match the feed schema.
    #[error("JSON parse error: {message}")]
    Parse { message: String },

    /// Connection-level failure (DNS, refused, reset).
    #[error("network error: {message}")]
    Network { message: String },
}

impl FetchError {
    pub(crate) fn parse(err: impl std::fmt::Display) -> Self {
        FetchError::Parse {
            message: err.to_string(),
        }
    }
}

/// Errors from resolving a feed through the fallback chain.
///
/// Only reachable when the built-in fallback dataset itself fails to load.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("all sources exhausted for {feed}: {reason}")]
    AllSourcesExhausted { feed: Feed, reason: String },
}
