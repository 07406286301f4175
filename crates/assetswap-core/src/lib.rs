//! Offline asset delivery: staged cache versions with atomic promotion.
//!
//! A fixed [`AssetManifest`] is downloaded in full into a staging container by
//! the [`Stager`]. The [`Promoter`] checks that staging holds exactly the
//! manifest's keys and only then replaces the live container, rolling back
//! (and leaving live untouched) otherwise. The [`Interceptor`] answers requests
//! network-first, refreshing the live container on success and falling back to
//! it, or to a synthetic 408, when the network fails.
//!
//! [`AssetWorker`] wires these together over any [`BlobStore`] and [`Fetcher`].
//!
//! Consistency window: readers of the live container are excluded only for the
//! two renames that swap versions, never for the copy. Entries refreshed
//! by the interceptor outside the manifest are keyed independently and are
//! replaced wholesale by the next promotion.

pub mod config;
pub mod error;
pub mod fetch;
pub mod interceptor;
pub mod manifest;
pub mod notify;
pub mod promoter;
pub mod stager;
pub mod store;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{ManifestError, RollbackReason, StageError, StoreError, StoreResult};
pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub use interceptor::{Dispatched, InterceptedResponse, Interceptor, ResponseSource};
pub use manifest::AssetManifest;
pub use notify::{ClientHub, ClientMessage, ClientSession};
pub use promoter::{PromotionResult, Promoter, RecoveryReport};
pub use stager::{Stager, StagingResult};
pub use store::{BlobStore, CachedResponse, Container, FileStore, LiveCache, MemoryStore};
pub use worker::{AssetWorker, WorkerOptions};
