//! Scripted network used by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::fetch::{FetchError, Fetcher};
use crate::store::CachedResponse;

/// Serves canned responses; unknown paths and offline mode fail at the transport level.
#[derive(Debug, Default)]
pub(crate) struct ScriptedFetcher {
    responses: Mutex<HashMap<String, CachedResponse>>,
    offline: AtomicBool,
}

impl ScriptedFetcher {
    pub(crate) fn serving<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fetcher = Self::default();
        for path in paths {
            let path = path.into();
            let body = format!("content of {}", path);
            fetcher.set(&path, 200, body);
        }
        fetcher
    }

    pub(crate) fn with_status(self, path: &str, status: u16) -> Self {
        self.set(path, status, format!("status {}", status));
        self
    }

    pub(crate) fn set(&self, path: &str, status: u16, body: String) {
        let response = CachedResponse::new(
            status,
            if status == 200 { "OK" } else { "Error" },
            vec![("content-type".to_string(), "text/plain".to_string())],
            body,
        );
        self.responses.lock().unwrap().insert(path.to_string(), response);
    }

    pub(crate) fn response_for(&self, path: &str) -> Option<CachedResponse> {
        self.responses.lock().unwrap().get(path).cloned()
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, path: &str) -> Result<CachedResponse, FetchError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Unreachable("offline".to_string()));
        }
        self.response_for(path)
            .ok_or_else(|| FetchError::Unreachable(format!("no route to {}", path)))
    }
}
