//! HTTP fetcher for GBFS feeds.
//!
//! One bounded-timeout GET per call, no retries. Retrying is the poller's
//! job: it simply runs again on the next tick.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde_json::Value;

use super::error::FetchError;

/// Source of raw feed documents.
///
/// This abstraction allows the feed client to be tested with scripted
/// responses instead of a live network.
pub trait Fetcher: Send + Sync {
    /// GET `url` and parse the body as JSON, giving up after `timeout`.
    fn fetch(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Value, FetchError>> + Send;
}

impl<F: Fetcher> Fetcher for Arc<F> {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Value, FetchError> {
        self.as_ref().fetch(url, timeout).await
    }
}

/// Fetcher backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    /// Create a new fetcher that sends `Accept: application/json`.
    pub fn new() -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("ridepulse/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Network {
                message: e.to_string(),
            })?;

        Ok(Self { http })
    }

    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let response = self.http.get(url).send().await.map_err(network_error)?;
        let status = response.status();

        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(network_error)?;
        serde_json::from_slice(&body).map_err(FetchError::parse)
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Value, FetchError> {
        match tokio::time::timeout(timeout, self.get_json(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(timeout)),
        }
    }
}

fn network_error(err: reqwest::Error) -> FetchError {
    FetchError::Network {
        message: err.to_string(),
    }
}
