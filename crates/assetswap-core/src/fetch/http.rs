//! reqwest-backed fetcher resolving resource paths against an origin.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::{FetchError, Fetcher};
use crate::store::CachedResponse;

/// Default HTTP request timeout in seconds.
/// The interceptor has no timeout of its own and relies on this one.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Fetcher for one origin.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    origin: Url,
}

impl HttpFetcher {
    pub fn new(origin: &str, timeout: Duration) -> Result<Self> {
        let origin = Url::parse(origin).with_context(|| format!("Invalid origin URL: {}", origin))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, origin })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Resolve an absolute resource path against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url, FetchError> {
        self.origin
            .join(path)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, path: &str) -> Result<CachedResponse, FetchError> {
        let url = self.resolve(path)?;

        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Network(e)
            }
        })?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Network(e)
            }
        })?;

        debug!(url = %url, status = status.as_u16(), size = body.len(), "Fetched resource");

        Ok(CachedResponse::new(
            status.as_u16(),
            status.canonical_reason().unwrap_or_default(),
            headers,
            body,
        ))
    }
}
