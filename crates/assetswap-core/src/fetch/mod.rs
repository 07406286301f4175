//! Network access for staging and request interception.
//!
//! A [`Fetcher`] turns a resource path into a response. Any HTTP response,
//! whatever its status, is `Ok`; `Err` means the network produced no response
//! at all. Callers decide what a non-success status means for them.

use async_trait::async_trait;

use crate::store::CachedResponse;

pub mod error;
pub mod http;

pub use error::FetchError;
pub use http::HttpFetcher;

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<CachedResponse, FetchError>;
}
