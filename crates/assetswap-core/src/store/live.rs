//! Explicit handle to the live container.
//!
//! The live container is looked up by name on every call, so holders never
//! care whether they run before or after a promotion. Reads and refreshes take
//! the gate shared; only the promoter takes it exclusively, for the two renames
//! that replace the live container. A lookup therefore never sees the live name
//! missing in the middle of a swap.
//!
//! The outgoing version is renamed to `<live>-old` rather than deleted in
//! place, so a crash never leaves a half-deleted live container behind.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{BlobStore, CachedResponse};
use crate::error::StoreResult;

#[derive(Clone)]
pub struct LiveCache {
    store: Arc<dyn BlobStore>,
    name: Arc<str>,
    gate: Arc<RwLock<()>>,
}

impl fmt::Debug for LiveCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveCache").field("name", &self.name).finish()
    }
}

impl LiveCache {
    pub fn new(store: Arc<dyn BlobStore>, name: impl Into<Arc<str>>) -> Self {
        Self {
            store,
            name: name.into(),
            gate: Arc::new(RwLock::new(())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Name of the side container a promotion copies into before the swap.
    pub fn side_name(&self) -> String {
        format!("{}-next", self.name)
    }

    /// Name the outgoing version is parked under until it is deleted.
    pub fn retired_name(&self) -> String {
        format!("{}-old", self.name)
    }

    /// Look `key` up in whatever container currently holds the live name.
    /// An absent live container is a miss, not an error.
    pub async fn match_any(&self, key: &str) -> StoreResult<Option<CachedResponse>> {
        let _shared = self.gate.read().await;
        match self.store.lookup(&self.name).await? {
            Some(container) => container.get(key).await,
            None => Ok(None),
        }
    }

    /// Overwrite the live entry for `key`, creating the live container if needed.
    pub async fn refresh(&self, key: &str, entry: CachedResponse) -> StoreResult<()> {
        let _shared = self.gate.read().await;
        let container = self.store.open(&self.name).await?;
        container.put(key, entry).await
    }

    pub async fn exists(&self) -> StoreResult<bool> {
        let _shared = self.gate.read().await;
        self.store.exists(&self.name).await
    }

    pub async fn keys(&self) -> StoreResult<Vec<String>> {
        let _shared = self.gate.read().await;
        match self.store.lookup(&self.name).await? {
            Some(container) => container.keys().await,
            None => Ok(Vec::new()),
        }
    }

    /// Every live entry, keyed by resource path.
    pub async fn entries(&self) -> StoreResult<BTreeMap<String, CachedResponse>> {
        let _shared = self.gate.read().await;
        let mut entries = BTreeMap::new();
        if let Some(container) = self.store.lookup(&self.name).await? {
            for key in container.keys().await? {
                if let Some(entry) = container.get(&key).await? {
                    entries.insert(key, entry);
                }
            }
        }
        Ok(entries)
    }

    /// Replace the live container with the fully written `side` container.
    ///
    /// Under the exclusive gate live is renamed to the retired name and `side`
    /// to live. The retired container is deleted after the gate is released.
    pub(crate) async fn swap_from(&self, side: &str) -> StoreResult<()> {
        let retired = self.retired_name();
        self.store.delete(&retired).await?;

        {
            let _exclusive = self.gate.write().await;
            let replaced = self.store.exists(&self.name).await?;
            if replaced {
                self.store.rename(&self.name, &retired).await?;
            }
            if let Err(e) = self.store.rename(side, &self.name).await {
                if replaced {
                    if let Err(restore) = self.store.rename(&retired, &self.name).await {
                        warn!(live = %self.name, error = %restore, "Failed to restore retired live container");
                    }
                }
                return Err(e);
            }
            debug!(live = %self.name, side, replaced, "Swapped live container");
        }

        if let Err(e) = self.store.delete(&retired).await {
            warn!(retired = %retired, error = %e, "Failed to delete retired live container");
        }
        Ok(())
    }
}
