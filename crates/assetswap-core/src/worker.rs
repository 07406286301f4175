//! Lifecycle coordinator tying staging, promotion and interception together.
//!
//! - `install()` stages the manifest.
//! - `activate(staged)` promotes a staging result, then claims client
//!   sessions whether or not the promotion went through.
//! - `update()` runs both as one cycle. Cycles are serialized; a second
//!   trigger waits for the first to finish.
//! - `interceptor()` serves requests at any time, against whatever live
//!   container exists.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::config::{DEFAULT_LIVE_CACHE, DEFAULT_STAGING_CACHE};
use crate::error::StoreResult;
use crate::fetch::Fetcher;
use crate::interceptor::Interceptor;
use crate::manifest::AssetManifest;
use crate::notify::ClientHub;
use crate::promoter::{PromotionResult, Promoter, RecoveryReport};
use crate::stager::{Stager, StagingResult, DEFAULT_MAX_CONCURRENT_FETCHES};
use crate::store::{BlobStore, LiveCache};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOptions {
    pub live_cache: String,
    pub staging_cache: String,
    pub max_concurrent_fetches: usize,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            live_cache: DEFAULT_LIVE_CACHE.to_string(),
            staging_cache: DEFAULT_STAGING_CACHE.to_string(),
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }
}

pub struct AssetWorker {
    manifest: AssetManifest,
    live: LiveCache,
    stager: Stager,
    promoter: Promoter,
    interceptor: Interceptor,
    clients: ClientHub,
    cycle: Mutex<()>,
}

impl AssetWorker {
    pub fn new(
        store: Arc<dyn BlobStore>,
        fetcher: Arc<dyn Fetcher>,
        manifest: AssetManifest,
        options: WorkerOptions,
    ) -> Self {
        let live = LiveCache::new(Arc::clone(&store), options.live_cache.as_str());
        let clients = ClientHub::new();
        let stager = Stager::new(
            store,
            Arc::clone(&fetcher),
            options.staging_cache.clone(),
            options.max_concurrent_fetches,
        );
        let promoter = Promoter::new(live.clone(), options.staging_cache, clients.clone());
        let interceptor = Interceptor::new(fetcher, live.clone());

        Self {
            manifest,
            live,
            stager,
            promoter,
            interceptor,
            clients,
            cycle: Mutex::new(()),
        }
    }

    /// Run one staging cycle to a terminal result.
    pub async fn update(&self) -> PromotionResult {
        let _cycle = self.cycle.lock().await;
        let staged = self.stage().await;
        self.promote_and_claim(staged).await
    }

    /// Download the manifest into the staging container.
    pub async fn install(&self) -> StagingResult {
        let _cycle = self.cycle.lock().await;
        self.stage().await
    }

    /// Promote `staged` and take control of client sessions.
    pub async fn activate(&self, staged: StagingResult) -> PromotionResult {
        let _cycle = self.cycle.lock().await;
        self.promote_and_claim(staged).await
    }

    async fn stage(&self) -> StagingResult {
        info!(live = %self.live.name(), entries = self.manifest.len(), "Install started");
        self.stager.stage(&self.manifest).await
    }

    async fn promote_and_claim(&self, staged: StagingResult) -> PromotionResult {
        let result = self.promoter.promote(&self.manifest, staged).await;
        let claimed = self.clients.claim();
        info!(claimed, promoted = result.is_promoted(), "Activated, client sessions claimed");
        result
    }

    /// Clean up after a cycle interrupted by a crash or restart.
    pub async fn recover(&self) -> StoreResult<RecoveryReport> {
        let _cycle = self.cycle.lock().await;
        self.promoter.recover(&self.manifest).await
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    pub fn clients(&self) -> &ClientHub {
        &self.clients
    }

    pub fn live(&self) -> &LiveCache {
        &self.live
    }

    pub fn manifest(&self) -> &AssetManifest {
        &self.manifest
    }
}
