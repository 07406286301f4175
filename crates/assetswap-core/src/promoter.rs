//! Validates a staged version and swaps it in as the live container.
//!
//! Promotion order:
//! 1. A failed staging goes straight to rollback.
//! 2. Staged keys must equal the manifest's key set exactly.
//! 3. Every staged entry is copied, one at a time, into a side container
//!    (`<live>-next`). The live container keeps serving meanwhile.
//! 4. Under the live gate: rename live to `<live>-old`, rename side to live.
//!    The old version is deleted afterwards.
//! 5. Delete staging, then tell clients to reload.
//!
//! Rollback deletes staging (and a partial side copy) and never touches live.
//! A crash during steps 3 to 5 leaves a side or retired container behind;
//! [`Promoter::recover`] finishes or discards it, so live never holds a mix of
//! two versions.

use std::collections::BTreeSet;

use tracing::{debug, error, info, warn};

use crate::error::{RollbackReason, StoreError, StoreResult};
use crate::manifest::AssetManifest;
use crate::notify::ClientHub;
use crate::stager::StagingResult;
use crate::store::LiveCache;

#[derive(Debug)]
pub enum PromotionResult {
    Promoted { entries: usize, notified: usize },
    RolledBack(RollbackReason),
}

impl PromotionResult {
    pub fn is_promoted(&self) -> bool {
        matches!(self, PromotionResult::Promoted { .. })
    }
}

/// What [`Promoter::recover`] found and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecoveryReport {
    pub staging_discarded: bool,
    pub side_discarded: bool,
    pub swap_completed: bool,
    pub retired_discarded: bool,
    pub retired_restored: bool,
}

impl RecoveryReport {
    /// True when recovery found nothing to clean up.
    pub fn is_clean(&self) -> bool {
        *self == RecoveryReport::default()
    }
}

/// Exact set comparison between staged keys and the manifest.
pub fn check_complete(manifest: &AssetManifest, staged_keys: &[String]) -> Result<(), RollbackReason> {
    let expected = manifest.key_set();
    let staged: BTreeSet<&str> = staged_keys.iter().map(String::as_str).collect();

    let missing = expected.difference(&staged).count();
    let unexpected = staged.difference(&expected).count();
    if missing == 0 && unexpected == 0 {
        Ok(())
    } else {
        Err(RollbackReason::IncompleteStaging {
            staged: staged.len(),
            expected: expected.len(),
            missing,
            unexpected,
        })
    }
}

pub struct Promoter {
    live: LiveCache,
    staging_name: String,
    clients: ClientHub,
}

impl Promoter {
    pub fn new(live: LiveCache, staging_name: impl Into<String>, clients: ClientHub) -> Self {
        Self {
            live,
            staging_name: staging_name.into(),
            clients,
        }
    }

    pub async fn promote(&self, manifest: &AssetManifest, staged: StagingResult) -> PromotionResult {
        let swapped = match staged {
            StagingResult::Failed(e) => Err(RollbackReason::StagingFailed(e)),
            StagingResult::Staged { .. } => self.swap(manifest).await,
        };

        match swapped {
            Ok(entries) => {
                if let Err(e) = self.live.store().delete(&self.staging_name).await {
                    warn!(staging = %self.staging_name, error = %e, "Failed to delete staging after promotion");
                }
                let notified = self.clients.broadcast_reload();
                info!(live = %self.live.name(), entries, notified, "Promoted staged version");
                PromotionResult::Promoted { entries, notified }
            }
            Err(reason) => {
                error!(reason = %reason, "Staging failed, keeping the current live cache");
                self.discard().await;
                PromotionResult::RolledBack(reason)
            }
        }
    }

    async fn swap(&self, manifest: &AssetManifest) -> Result<usize, RollbackReason> {
        let store = self.live.store();

        let Some(staging) = store.lookup(&self.staging_name).await? else {
            return Err(RollbackReason::IncompleteStaging {
                staged: 0,
                expected: manifest.len(),
                missing: manifest.len(),
                unexpected: 0,
            });
        };

        let staged_keys = staging.keys().await?;
        check_complete(manifest, &staged_keys)?;

        let side_name = self.live.side_name();
        if store.delete(&side_name).await? {
            debug!(side = %side_name, "Discarded stale side container");
        }
        let side = store.open(&side_name).await?;

        for key in &staged_keys {
            let entry = staging
                .get(key)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("{}{}", self.staging_name, key)))?;
            side.put(key, entry).await?;
        }

        self.live.swap_from(&side_name).await?;
        Ok(staged_keys.len())
    }

    /// Drop staging and any partial side copy. A side copy is kept only when
    /// live is gone, which means a swap failed halfway; `recover` owns that case.
    async fn discard(&self) {
        let store = self.live.store();
        if let Err(e) = store.delete(&self.staging_name).await {
            warn!(staging = %self.staging_name, error = %e, "Failed to delete staging container");
        }

        let side_name = self.live.side_name();
        match self.live.exists().await {
            Ok(true) => {
                if let Err(e) = store.delete(&side_name).await {
                    warn!(side = %side_name, error = %e, "Failed to delete side container");
                }
            }
            Ok(false) => match store.exists(&side_name).await {
                Ok(true) => {
                    warn!(side = %side_name, "Live container missing; leaving side container for recovery")
                }
                Ok(false) => {}
                Err(e) => warn!(side = %side_name, error = %e, "Failed to check side container"),
            },
            Err(e) => warn!(error = %e, "Failed to check live container"),
        }
    }

    /// Bring the store back to a clean state after an interrupted cycle.
    ///
    /// - A leftover staging container is deleted.
    /// - A side container holding exactly the manifest's keys finished copying,
    ///   so it is swapped in whatever state live is in. Any other side
    ///   container is a partial copy and is deleted.
    /// - A retired container is deleted when live exists, and renamed back to
    ///   live otherwise.
    pub async fn recover(&self, manifest: &AssetManifest) -> StoreResult<RecoveryReport> {
        let store = self.live.store();
        let mut report = RecoveryReport {
            staging_discarded: store.delete(&self.staging_name).await?,
            ..RecoveryReport::default()
        };

        let side_name = self.live.side_name();
        if let Some(side) = store.lookup(&side_name).await? {
            if check_complete(manifest, &side.keys().await?).is_ok() {
                self.live.swap_from(&side_name).await?;
                report.swap_completed = true;
                info!(live = %self.live.name(), "Completed interrupted promotion");
            } else {
                store.delete(&side_name).await?;
                report.side_discarded = true;
                info!(side = %side_name, "Discarded partial promotion copy");
            }
        }

        let retired = self.live.retired_name();
        if store.exists(&retired).await? {
            if self.live.exists().await? {
                store.delete(&retired).await?;
                report.retired_discarded = true;
                info!(retired = %retired, "Discarded retired live container");
            } else {
                store.rename(&retired, self.live.name()).await?;
                report.retired_restored = true;
                warn!(live = %self.live.name(), "Restored previous live container");
            }
        }

        Ok(report)
    }
}
