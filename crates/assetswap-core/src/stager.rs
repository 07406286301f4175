//! Downloads a full manifest into the staging container.
//!
//! Staging is all-or-nothing: the first fetch that fails (transport error or
//! non-success status) ends the cycle, and sibling fetches still in flight are
//! dropped. Whatever landed in staging is discarded by the promoter.

use std::sync::Arc;

use futures::stream::{self, TryStreamExt};
use tracing::{debug, info, warn};

use crate::error::StageError;
use crate::fetch::{FetchError, Fetcher};
use crate::manifest::AssetManifest;
use crate::store::{BlobStore, Container};

/// Default number of manifest fetches in flight at once.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 8;

#[derive(Debug)]
pub enum StagingResult {
    Staged { entries: usize },
    Failed(StageError),
}

impl StagingResult {
    pub fn is_staged(&self) -> bool {
        matches!(self, StagingResult::Staged { .. })
    }
}

pub struct Stager {
    store: Arc<dyn BlobStore>,
    fetcher: Arc<dyn Fetcher>,
    staging_name: String,
    max_concurrent: usize,
}

impl Stager {
    pub fn new(
        store: Arc<dyn BlobStore>,
        fetcher: Arc<dyn Fetcher>,
        staging_name: impl Into<String>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            store,
            fetcher,
            staging_name: staging_name.into(),
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn staging_name(&self) -> &str {
        &self.staging_name
    }

    pub async fn stage(&self, manifest: &AssetManifest) -> StagingResult {
        info!(staging = %self.staging_name, entries = manifest.len(), "Staging manifest");

        // Leftovers from an interrupted cycle must not count towards this one
        match self.store.delete(&self.staging_name).await {
            Ok(true) => debug!(staging = %self.staging_name, "Discarded stale staging container"),
            Ok(false) => {}
            Err(e) => return StagingResult::Failed(StageError::Open(e)),
        }

        let staging = match self.store.open(&self.staging_name).await {
            Ok(container) => container,
            Err(e) => return StagingResult::Failed(StageError::Open(e)),
        };

        let result = stream::iter(manifest.iter().map(Ok::<_, StageError>))
            .try_for_each_concurrent(self.max_concurrent, |path| {
                let staging = Arc::clone(&staging);
                async move { self.stage_one(staging.as_ref(), path).await }
            })
            .await;

        match result {
            Ok(()) => {
                info!(staging = %self.staging_name, entries = manifest.len(), "Manifest staged");
                StagingResult::Staged {
                    entries: manifest.len(),
                }
            }
            Err(e) => {
                warn!(staging = %self.staging_name, error = %e, "Staging failed");
                StagingResult::Failed(e)
            }
        }
    }

    async fn stage_one(&self, staging: &dyn Container, path: &str) -> Result<(), StageError> {
        let response = self
            .fetcher
            .fetch(path)
            .await
            .map_err(|source| StageError::Fetch {
                path: path.to_string(),
                source,
            })?;

        if !response.is_success() {
            return Err(StageError::Fetch {
                path: path.to_string(),
                source: FetchError::from_status(response.status, &response.body),
            });
        }

        staging
            .put(path, response)
            .await
            .map_err(|source| StageError::Store {
                path: path.to_string(),
                source,
            })?;

        debug!(path, "Staged entry");
        Ok(())
    }
}
