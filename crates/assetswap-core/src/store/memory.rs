use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{BlobStore, CachedResponse, Container};
use crate::error::{StoreError, StoreResult};

type Entries = Arc<RwLock<BTreeMap<String, CachedResponse>>>;

/// In-process container. Once deleted from its store the handle keeps working
/// but is no longer reachable by name.
#[derive(Debug)]
pub struct MemoryContainer {
    name: String,
    entries: Entries,
}

#[async_trait]
impl Container for MemoryContainer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> StoreResult<Option<CachedResponse>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, entry: CachedResponse) -> StoreResult<()> {
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    containers: RwLock<HashMap<String, Arc<MemoryContainer>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn open(&self, name: &str) -> StoreResult<Arc<dyn Container>> {
        let mut containers = self.containers.write().await;
        let container = containers
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(container = name, "Creating memory container");
                Arc::new(MemoryContainer {
                    name: name.to_string(),
                    entries: Entries::default(),
                })
            })
            .clone();
        Ok(container as Arc<dyn Container>)
    }

    async fn lookup(&self, name: &str) -> StoreResult<Option<Arc<dyn Container>>> {
        Ok(self
            .containers
            .read()
            .await
            .get(name)
            .cloned()
            .map(|c| c as Arc<dyn Container>))
    }

    async fn delete(&self, name: &str) -> StoreResult<bool> {
        Ok(self.containers.write().await.remove(name).is_some())
    }

    async fn rename(&self, from: &str, to: &str) -> StoreResult<()> {
        let mut containers = self.containers.write().await;
        if containers.contains_key(to) {
            return Err(StoreError::AlreadyExists(to.to_string()));
        }
        let source = containers
            .remove(from)
            .ok_or_else(|| StoreError::NotFound(from.to_string()))?;
        containers.insert(
            to.to_string(),
            Arc::new(MemoryContainer {
                name: to.to_string(),
                entries: Arc::clone(&source.entries),
            }),
        );
        Ok(())
    }

    async fn names(&self) -> StoreResult<Vec<String>> {
        let mut names: Vec<String> = self.containers.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
