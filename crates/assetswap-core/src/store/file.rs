//! Directory-backed blob store.
//!
//! Layout under the root:
//!
//! ```text
//! <root>/<container>/<sha256(key)>.body
//! <root>/<container>/<sha256(key)>.meta   (JSON, includes the original key)
//! ```
//!
//! Entries are written to temporary files and renamed into place, so a reader
//! sees either the previous entry or the new one. Container rename is a
//! directory rename.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io;
use tracing::{debug, warn};

use super::entry::EntryMeta;
use super::{BlobStore, CachedResponse, Container};
use crate::error::{StoreError, StoreResult};

const BODY_EXT: &str = "body";
const META_EXT: &str = "meta";
const TEMP_EXT: &str = "tmp";

/// Distinguishes temp files of concurrent writers to the same key.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn entry_stem(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn validate_name(name: &str) -> StoreResult<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

fn is_not_found(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::NotFound
}

#[derive(Debug)]
pub struct FileContainer {
    name: String,
    dir: PathBuf,
}

impl FileContainer {
    fn body_path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", stem, BODY_EXT))
    }

    fn meta_path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", stem, META_EXT))
    }

    async fn read_meta(&self, path: &Path) -> StoreResult<Option<EntryMeta>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// A container whose directory was deleted behaves as detached: writes fail
    /// instead of silently recreating it.
    async fn ensure_attached(&self) -> StoreResult<()> {
        if fs::try_exists(&self.dir).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound(self.name.clone()))
        }
    }
}

#[async_trait]
impl Container for FileContainer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> StoreResult<Option<CachedResponse>> {
        let stem = entry_stem(key);
        let meta = match self.read_meta(&self.meta_path(&stem)).await? {
            Some(meta) if meta.key == key => meta,
            Some(meta) => {
                warn!(container = %self.name, key, stored = %meta.key, "Entry key mismatch");
                return Ok(None);
            }
            None => return Ok(None),
        };

        let body = match fs::read(self.body_path(&stem)).await {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) if is_not_found(&e) => {
                warn!(container = %self.name, key, "Entry metadata present without body");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Some(CachedResponse::from_parts(meta, body)))
    }

    async fn put(&self, key: &str, entry: CachedResponse) -> StoreResult<()> {
        self.ensure_attached().await?;

        let stem = entry_stem(key);
        let body_path = self.body_path(&stem);
        let meta_path = self.meta_path(&stem);
        let meta_json = serde_json::to_vec(&entry.meta(key))?;

        let suffix = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_body = self.dir.join(format!("{}.{}.{}", stem, suffix, TEMP_EXT));
        let temp_meta = self.dir.join(format!("{}.{}.m{}", stem, suffix, TEMP_EXT));

        if let Err(e) = fs::write(&temp_body, &entry.body).await {
            warn!(path = ?temp_body, error = %e, "Failed to write entry body");
            return Err(e.into());
        }
        if let Err(e) = fs::write(&temp_meta, &meta_json).await {
            warn!(path = ?temp_meta, error = %e, "Failed to write entry metadata");
            let _ = fs::remove_file(&temp_body).await;
            return Err(e.into());
        }

        // Body first: metadata is what makes an entry visible
        if let Err(e) = fs::rename(&temp_body, &body_path).await {
            let _ = fs::remove_file(&temp_body).await;
            let _ = fs::remove_file(&temp_meta).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp_meta, &meta_path).await {
            let _ = fs::remove_file(&temp_meta).await;
            return Err(e.into());
        }

        debug!(container = %self.name, key, size = entry.body.len(), "Stored entry");
        Ok(())
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if is_not_found(&e) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(META_EXT) {
                continue;
            }
            match self.read_meta(&path).await {
                Ok(Some(meta)) => keys.push(meta.key),
                Ok(None) => {}
                Err(e) => warn!(path = ?path, error = %e, "Skipping unreadable entry metadata"),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub async fn new(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn container_dir(&self, name: &str) -> StoreResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    fn container(&self, name: &str, dir: PathBuf) -> Arc<dyn Container> {
        Arc::new(FileContainer {
            name: name.to_string(),
            dir,
        })
    }
}

#[async_trait]
impl BlobStore for FileStore {
    async fn open(&self, name: &str) -> StoreResult<Arc<dyn Container>> {
        let dir = self.container_dir(name)?;
        fs::create_dir_all(&dir).await?;
        Ok(self.container(name, dir))
    }

    async fn lookup(&self, name: &str) -> StoreResult<Option<Arc<dyn Container>>> {
        let dir = self.container_dir(name)?;
        if fs::try_exists(&dir).await? {
            Ok(Some(self.container(name, dir)))
        } else {
            Ok(None)
        }
    }

    async fn delete(&self, name: &str) -> StoreResult<bool> {
        let dir = self.container_dir(name)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(container = name, "Deleted container");
                Ok(true)
            }
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> StoreResult<()> {
        let from_dir = self.container_dir(from)?;
        let to_dir = self.container_dir(to)?;
        if fs::try_exists(&to_dir).await? {
            return Err(StoreError::AlreadyExists(to.to_string()));
        }
        match fs::rename(&from_dir, &to_dir).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Err(StoreError::NotFound(from.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn names(&self) -> StoreResult<Vec<String>> {
        let mut dir = fs::read_dir(&self.root).await?;
        let mut names = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            if item.file_type().await?.is_dir() {
                if let Some(name) = item.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
