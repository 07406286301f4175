//! End-to-end staging cycles against an in-memory and an on-disk store.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assetswap_core::{
    AssetManifest, AssetWorker, BlobStore, CachedResponse, ClientMessage, Container, FetchError,
    Fetcher, FileStore, MemoryStore, PromotionResult, RecoveryReport, ResponseSource,
    RollbackReason, StoreResult, WorkerOptions,
};
use async_trait::async_trait;
use tokio::sync::Notify;

/// Origin stand-in: a body per path, a set of paths that fail, per-path
/// latency, and an offline switch.
#[derive(Default)]
struct Origin {
    bodies: Mutex<HashMap<String, String>>,
    failing: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    offline: AtomicBool,
}

impl Origin {
    fn publish(&self, version: &str, paths: &[&str]) {
        let mut bodies = self.bodies.lock().unwrap();
        for path in paths {
            bodies.insert(path.to_string(), format!("{} {}", version, path));
        }
    }

    fn fail(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }

    fn delay(&self, path: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(path.to_string(), delay);
    }

    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl Fetcher for Origin {
    async fn fetch(&self, path: &str) -> Result<CachedResponse, FetchError> {
        let delay = self.delays.lock().unwrap().get(path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.offline.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(path) {
            return Err(FetchError::Unreachable(path.to_string()));
        }
        match self.bodies.lock().unwrap().get(path) {
            Some(body) => Ok(CachedResponse::new(
                200,
                "OK",
                vec![("content-type".to_string(), "text/plain".to_string())],
                body.clone(),
            )),
            None => Ok(CachedResponse::new(404, "Not Found", vec![], "")),
        }
    }
}

/// Store wrapper that, once armed, parks the next write into one container
/// until released.
struct PausingStore {
    inner: MemoryStore,
    container: String,
    pause: Arc<Pause>,
}

#[derive(Debug, Default)]
struct Pause {
    armed: AtomicBool,
    reached: Notify,
    resume: Notify,
}

impl PausingStore {
    fn new(container: &str) -> Self {
        Self {
            inner: MemoryStore::new(),
            container: container.to_string(),
            pause: Arc::new(Pause::default()),
        }
    }

    fn wrap(&self, name: &str, container: Arc<dyn Container>) -> Arc<dyn Container> {
        if name == self.container {
            Arc::new(PausingContainer {
                inner: container,
                pause: Arc::clone(&self.pause),
            })
        } else {
            container
        }
    }
}

#[async_trait]
impl BlobStore for PausingStore {
    async fn open(&self, name: &str) -> StoreResult<Arc<dyn Container>> {
        let container = self.inner.open(name).await?;
        Ok(self.wrap(name, container))
    }

    async fn lookup(&self, name: &str) -> StoreResult<Option<Arc<dyn Container>>> {
        Ok(self
            .inner
            .lookup(name)
            .await?
            .map(|container| self.wrap(name, container)))
    }

    async fn delete(&self, name: &str) -> StoreResult<bool> {
        self.inner.delete(name).await
    }

    async fn rename(&self, from: &str, to: &str) -> StoreResult<()> {
        self.inner.rename(from, to).await
    }

    async fn names(&self) -> StoreResult<Vec<String>> {
        self.inner.names().await
    }
}

#[derive(Debug)]
struct PausingContainer {
    inner: Arc<dyn Container>,
    pause: Arc<Pause>,
}

#[async_trait]
impl Container for PausingContainer {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, key: &str) -> StoreResult<Option<CachedResponse>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, entry: CachedResponse) -> StoreResult<()> {
        self.inner.put(key, entry).await?;
        if self.pause.armed.swap(false, Ordering::SeqCst) {
            self.pause.reached.notify_one();
            self.pause.resume.notified().await;
        }
        Ok(())
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        self.inner.keys().await
    }
}

const ASSETS: [&str; 3] = ["/a", "/b", "/c"];

fn worker(store: Arc<dyn BlobStore>, origin: Arc<Origin>) -> AssetWorker {
    AssetWorker::new(
        store,
        origin,
        AssetManifest::new(ASSETS).unwrap(),
        WorkerOptions {
            live_cache: "live".to_string(),
            staging_cache: "staging".to_string(),
            max_concurrent_fetches: 3,
        },
    )
}

fn body(response: &CachedResponse) -> String {
    String::from_utf8_lossy(&response.body).into_owned()
}

#[tokio::test]
async fn full_fetch_promotes_and_notifies() {
    let store: Arc<dyn BlobStore> = Arc::new(MemoryStore::new());
    let origin = Arc::new(Origin::default());
    origin.publish("v1", &ASSETS);
    let worker = worker(Arc::clone(&store), origin);
    let mut session = worker.clients().connect();

    let result = worker.update().await;
    assert!(matches!(result, PromotionResult::Promoted { entries: 3, notified: 1 }));

    assert_eq!(worker.live().keys().await.unwrap(), vec!["/a", "/b", "/c"]);
    assert_eq!(session.recv().await, Some(ClientMessage::Reload));
    assert_eq!(store.names().await.unwrap(), vec!["live"]);
}

#[tokio::test]
async fn single_failed_fetch_leaves_live_untouched() {
    let store: Arc<dyn BlobStore> = Arc::new(MemoryStore::new());
    let origin = Arc::new(Origin::default());
    origin.publish("v1", &ASSETS);
    let worker = worker(Arc::clone(&store), Arc::clone(&origin));
    assert!(worker.update().await.is_promoted());
    let before = worker.live().entries().await.unwrap();

    let mut session = worker.clients().connect();
    origin.publish("v2", &ASSETS);
    origin.fail("/b");

    let result = worker.update().await;
    assert!(matches!(
        result,
        PromotionResult::RolledBack(RollbackReason::StagingFailed(_))
    ));

    let after = worker.live().entries().await.unwrap();
    assert_eq!(after, before);
    assert!(after.values().all(|e| body(e).starts_with("v1")));
    assert!(!store.exists("staging").await.unwrap());
    assert_eq!(session.try_recv(), None);
}

#[tokio::test]
async fn missing_asset_status_rolls_back() {
    let store: Arc<dyn BlobStore> = Arc::new(MemoryStore::new());
    let origin = Arc::new(Origin::default());
    origin.publish("v1", &["/a", "/c"]);
    let worker = worker(Arc::clone(&store), origin);

    assert!(!worker.update().await.is_promoted());
    assert!(!worker.live().exists().await.unwrap());
    assert!(store.names().await.unwrap().is_empty());
}

#[tokio::test]
async fn offline_retrigger_keeps_previous_version() {
    let store: Arc<dyn BlobStore> = Arc::new(MemoryStore::new());
    let origin = Arc::new(Origin::default());
    origin.publish("v1", &ASSETS);
    let worker = worker(store, Arc::clone(&origin));

    assert!(worker.update().await.is_promoted());
    let first = worker.live().entries().await.unwrap();

    origin.set_offline(true);
    assert!(!worker.update().await.is_promoted());
    assert_eq!(worker.live().entries().await.unwrap(), first);
}

#[tokio::test]
async fn new_version_replaces_every_manifest_entry() {
    let store: Arc<dyn BlobStore> = Arc::new(MemoryStore::new());
    let origin = Arc::new(Origin::default());
    origin.publish("v1", &ASSETS);
    origin.publish("v1", &["/runtime"]);
    let worker = worker(store, Arc::clone(&origin));
    assert!(worker.update().await.is_promoted());

    // A runtime request outside the manifest lands in live
    let dispatched = worker.interceptor().dispatch("/runtime").await;
    dispatched.refresh.unwrap().await.unwrap();
    assert!(worker.live().match_any("/runtime").await.unwrap().is_some());

    origin.publish("v2", &ASSETS);
    assert!(worker.update().await.is_promoted());

    let entries = worker.live().entries().await.unwrap();
    assert_eq!(entries.keys().cloned().collect::<Vec<_>>(), vec!["/a", "/b", "/c"]);
    assert!(entries.values().all(|e| body(e).starts_with("v2")));
}

#[tokio::test]
async fn offline_requests_fall_back_then_miss() {
    let store: Arc<dyn BlobStore> = Arc::new(MemoryStore::new());
    let origin = Arc::new(Origin::default());
    origin.publish("v1", &ASSETS);
    let worker = worker(store, Arc::clone(&origin));
    assert!(worker.update().await.is_promoted());
    let cached = worker.live().match_any("/a").await.unwrap().unwrap();

    origin.set_offline(true);
    let hit = worker.interceptor().handle("/a").await;
    assert_eq!(hit.source, ResponseSource::Cache);
    assert_eq!(hit.response, cached);

    let miss = worker.interceptor().handle("/not-cached").await;
    assert_eq!(miss.source, ResponseSource::Synthetic);
    assert_eq!(miss.response.status, 408);
}

#[tokio::test]
async fn empty_store_offline_is_408() {
    let origin = Arc::new(Origin::default());
    origin.set_offline(true);
    let worker = worker(Arc::new(MemoryStore::new()), origin);

    for path in ["/a", "/anything"] {
        assert_eq!(worker.interceptor().handle(path).await.response.status, 408);
    }
}

#[tokio::test]
async fn refresh_on_read_overwrites_live_entry() {
    let origin = Arc::new(Origin::default());
    origin.publish("v1", &ASSETS);
    let worker = worker(Arc::new(MemoryStore::new()), Arc::clone(&origin));
    assert!(worker.update().await.is_promoted());

    origin.publish("v1.1", &["/a"]);
    let dispatched = worker.interceptor().dispatch("/a").await;
    assert_eq!(body(&dispatched.response.response), "v1.1 /a");
    dispatched.refresh.unwrap().await.unwrap();

    let stored = worker.live().match_any("/a").await.unwrap().unwrap();
    assert_eq!(stored, dispatched.response.response);
}

#[tokio::test]
async fn file_store_cycle_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let origin = Arc::new(Origin::default());
    origin.publish("v1", &ASSETS);

    {
        let store = FileStore::new(tmp.path()).await.unwrap();
        let worker = worker(Arc::new(store), Arc::clone(&origin));
        assert!(worker.update().await.is_promoted());
    }

    origin.set_offline(true);
    let store = FileStore::new(tmp.path()).await.unwrap();
    let worker = worker(Arc::new(store), origin);
    assert_eq!(worker.recover().await.unwrap(), RecoveryReport::default());

    let response = worker.interceptor().handle("/b").await;
    assert_eq!(response.source, ResponseSource::Cache);
    assert_eq!(body(&response.response), "v1 /b");
}

#[tokio::test]
async fn file_store_recovers_interrupted_swap() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::new(tmp.path()).await.unwrap();

    // Crash after the live container was deleted but before the rename
    let side = store.open("live-next").await.unwrap();
    for path in ASSETS {
        side.put(path, CachedResponse::new(200, "OK", vec![], format!("v2 {}", path)))
            .await
            .unwrap();
    }

    let worker = worker(Arc::new(store), Arc::new(Origin::default()));
    let report = worker.recover().await.unwrap();
    assert!(report.swap_completed);
    assert_eq!(worker.live().keys().await.unwrap(), vec!["/a", "/b", "/c"]);
}

#[tokio::test]
async fn refresh_during_copy_is_replaced_and_reads_keep_hitting() {
    let store = Arc::new(PausingStore::new("live-next"));
    let pause = Arc::clone(&store.pause);
    let origin = Arc::new(Origin::default());
    origin.publish("v1", &ASSETS);
    origin.publish("v1", &["/runtime"]);

    let worker = Arc::new(worker(store.clone(), Arc::clone(&origin)));
    assert!(worker.update().await.is_promoted());

    origin.publish("v2", &ASSETS);
    pause.armed.store(true, Ordering::SeqCst);
    let cycle = tokio::spawn({
        let worker = Arc::clone(&worker);
        async move { worker.update().await }
    });
    pause.reached.notified().await;

    // Mid-copy: live still serves v1 and accepts refreshes
    let hit = worker.live().match_any("/b").await.unwrap().unwrap();
    assert_eq!(body(&hit), "v1 /b");
    let dispatched = worker.interceptor().dispatch("/runtime").await;
    dispatched.refresh.unwrap().await.unwrap();
    assert!(worker.live().match_any("/runtime").await.unwrap().is_some());

    pause.resume.notify_one();
    assert!(cycle.await.unwrap().is_promoted());

    // The swap replaces live wholesale, so the mid-copy refresh is gone
    let entries = worker.live().entries().await.unwrap();
    assert_eq!(entries.keys().cloned().collect::<Vec<_>>(), vec!["/a", "/b", "/c"]);
    assert!(entries.values().all(|e| body(e).starts_with("v2")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn lookups_never_miss_across_swaps() {
    let store: Arc<dyn BlobStore> = Arc::new(MemoryStore::new());
    let origin = Arc::new(Origin::default());
    origin.publish("v1", &ASSETS);
    let worker = Arc::new(worker(store, Arc::clone(&origin)));
    assert!(worker.update().await.is_promoted());

    let stop = Arc::new(AtomicBool::new(false));
    let misses = Arc::new(AtomicUsize::new(0));
    let readers: Vec<_> = (0..3)
        .map(|_| {
            let worker = Arc::clone(&worker);
            let stop = Arc::clone(&stop);
            let misses = Arc::clone(&misses);
            tokio::spawn(async move {
                let mut lookups = 0usize;
                loop {
                    for path in ASSETS {
                        if worker.live().match_any(path).await.unwrap().is_none() {
                            misses.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                    lookups += 1;
                    if stop.load(Ordering::SeqCst) {
                        break lookups;
                    }
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    for version in 2..12 {
        origin.publish(&format!("v{}", version), &ASSETS);
        assert!(worker.update().await.is_promoted());
    }
    stop.store(true, Ordering::SeqCst);

    for reader in readers {
        assert!(reader.await.unwrap() > 0);
    }
    assert_eq!(misses.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn late_sibling_fetch_does_not_reach_live() {
    let store: Arc<dyn BlobStore> = Arc::new(MemoryStore::new());
    let origin = Arc::new(Origin::default());
    origin.publish("v1", &ASSETS);
    let worker = worker(Arc::clone(&store), Arc::clone(&origin));
    assert!(worker.update().await.is_promoted());
    let before = worker.live().entries().await.unwrap();

    // "/a" is still in flight when "/b" fails
    origin.publish("v2", &ASSETS);
    origin.delay("/a", Duration::from_millis(100));
    origin.fail("/b");

    let result = worker.update().await;
    assert!(matches!(
        result,
        PromotionResult::RolledBack(RollbackReason::StagingFailed(_))
    ));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(worker.live().entries().await.unwrap(), before);
    assert!(!store.exists("staging").await.unwrap());
    assert_eq!(store.names().await.unwrap(), vec!["live"]);
}

#[tokio::test]
async fn file_store_recovers_damaged_live_next_to_complete_copy() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::new(tmp.path()).await.unwrap();

    // Old live lost entries; the new version finished copying
    let live = store.open("live").await.unwrap();
    live.put("/a", CachedResponse::new(200, "OK", vec![], "v1 /a")).await.unwrap();
    let side = store.open("live-next").await.unwrap();
    for path in ASSETS {
        side.put(path, CachedResponse::new(200, "OK", vec![], format!("v2 {}", path)))
            .await
            .unwrap();
    }
    store.open("live-old").await.unwrap();

    let worker = worker(Arc::new(store), Arc::new(Origin::default()));
    let report = worker.recover().await.unwrap();
    assert!(report.swap_completed);
    assert!(!report.side_discarded);

    let entries = worker.live().entries().await.unwrap();
    assert_eq!(entries.keys().cloned().collect::<Vec<_>>(), vec!["/a", "/b", "/c"]);
    assert!(entries.values().all(|e| body(e).starts_with("v2")));
}
