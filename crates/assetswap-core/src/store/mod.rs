//! Named, durable containers of cached responses.
//!
//! A [`BlobStore`] holds any number of named [`Container`]s. This layer makes no
//! transactional promises; version atomicity is built on top of it by the
//! promoter, using container-level delete and rename.
//!
//! Two backends are provided:
//! - [`MemoryStore`]: process-local, used by tests and embedded hosts
//! - [`FileStore`]: one directory per container

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreResult;

pub mod entry;
pub mod file;
pub mod live;
pub mod memory;

pub use entry::CachedResponse;
pub use file::FileStore;
pub use live::LiveCache;
pub use memory::MemoryStore;

/// A single named set of cached responses.
#[async_trait]
pub trait Container: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> StoreResult<Option<CachedResponse>>;

    /// Insert or overwrite the entry for `key`.
    async fn put(&self, key: &str, entry: CachedResponse) -> StoreResult<()>;

    /// Snapshot of the keys present when called.
    async fn keys(&self) -> StoreResult<Vec<String>>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Open a container, creating it if absent.
    async fn open(&self, name: &str) -> StoreResult<Arc<dyn Container>>;

    /// Open a container only if it already exists.
    async fn lookup(&self, name: &str) -> StoreResult<Option<Arc<dyn Container>>>;

    /// Delete a whole container. Returns false if there was nothing to delete.
    async fn delete(&self, name: &str) -> StoreResult<bool>;

    /// Move a container to a new name. Fails if `to` already exists.
    async fn rename(&self, from: &str, to: &str) -> StoreResult<()>;

    async fn names(&self) -> StoreResult<Vec<String>>;

    async fn exists(&self, name: &str) -> StoreResult<bool> {
        Ok(self.lookup(name).await?.is_some())
    }
}
