//! Network-first request handling with live-cache fallback.
//!
//! Each request resolves in a single pass:
//! - network responds: the response goes back to the caller, and a 2xx copy is
//!   written to the live container in the background
//! - network fails: the live container answers, or a synthetic 408 does
//!
//! There is no retry and no timeout here; the fetcher's transport decides when
//! a request has failed.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::fetch::Fetcher;
use crate::store::{CachedResponse, LiveCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedResponse {
    pub response: CachedResponse,
    pub source: ResponseSource,
}

/// A resolved request plus its pending live-cache refresh, if one was started.
#[derive(Debug)]
pub struct Dispatched {
    pub response: InterceptedResponse,
    pub refresh: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct Interceptor {
    fetcher: Arc<dyn Fetcher>,
    live: LiveCache,
}

impl Interceptor {
    pub fn new(fetcher: Arc<dyn Fetcher>, live: LiveCache) -> Self {
        Self { fetcher, live }
    }

    /// Resolve a request; the background refresh is detached.
    pub async fn handle(&self, path: &str) -> InterceptedResponse {
        self.dispatch(path).await.response
    }

    pub async fn dispatch(&self, path: &str) -> Dispatched {
        match self.fetcher.fetch(path).await {
            Ok(response) => {
                let refresh = response.is_success().then(|| self.spawn_refresh(path, response.clone()));
                Dispatched {
                    response: InterceptedResponse {
                        response,
                        source: ResponseSource::Network,
                    },
                    refresh,
                }
            }
            Err(e) => {
                debug!(path, error = %e, "Network request failed, falling back to live cache");
                Dispatched {
                    response: self.fallback(path).await,
                    refresh: None,
                }
            }
        }
    }

    fn spawn_refresh(&self, path: &str, response: CachedResponse) -> JoinHandle<()> {
        let live = self.live.clone();
        let key = path.to_string();
        tokio::spawn(async move {
            match live.refresh(&key, response).await {
                Ok(()) => debug!(path = %key, "Refreshed live entry"),
                Err(e) => warn!(path = %key, error = %e, "Failed to refresh live entry"),
            }
        })
    }

    async fn fallback(&self, path: &str) -> InterceptedResponse {
        match self.live.match_any(path).await {
            Ok(Some(response)) => InterceptedResponse {
                response,
                source: ResponseSource::Cache,
            },
            Ok(None) => Self::synthetic(),
            Err(e) => {
                warn!(path, error = %e, "Live cache lookup failed");
                Self::synthetic()
            }
        }
    }

    fn synthetic() -> InterceptedResponse {
        InterceptedResponse {
            response: CachedResponse::network_error(),
            source: ResponseSource::Synthetic,
        }
    }
}
