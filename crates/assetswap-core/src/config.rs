//! Application configuration management.
//!
//! Configuration is stored at `~/.config/assetswap/config.json` and names the
//! origin to fetch from, the asset manifest, and the container names.
//! `ASSETSWAP_ORIGIN` and `ASSETSWAP_STORE_DIR` override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::fetch::http::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::manifest::AssetManifest;
use crate::stager::DEFAULT_MAX_CONCURRENT_FETCHES;
use crate::worker::WorkerOptions;

/// Application name used for config/store directory paths
const APP_NAME: &str = "assetswap";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_LIVE_CACHE: &str = "assetswap-v1";
pub const DEFAULT_STAGING_CACHE: &str = "assetswap-temp-v1";

pub const ENV_ORIGIN: &str = "ASSETSWAP_ORIGIN";
pub const ENV_STORE_DIR: &str = "ASSETSWAP_STORE_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub origin: Option<String>,
    pub manifest: Vec<String>,
    pub live_cache: String,
    pub staging_cache: String,
    pub store_dir: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub max_concurrent_fetches: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: None,
            manifest: Vec::new(),
            live_cache: DEFAULT_LIVE_CACHE.to_string(),
            staging_cache: DEFAULT_STAGING_CACHE.to_string(),
            store_dir: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }
}

impl Config {
    /// Load from the default location, falling back to defaults when absent,
    /// then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var(ENV_ORIGIN).ok(),
            std::env::var(ENV_STORE_DIR).ok(),
        );
    }

    fn apply_overrides(&mut self, origin: Option<String>, store_dir: Option<String>) {
        if let Some(origin) = origin.filter(|o| !o.is_empty()) {
            self.origin = Some(origin);
        }
        if let Some(dir) = store_dir.filter(|d| !d.is_empty()) {
            self.store_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn origin(&self) -> Result<&str> {
        self.origin.as_deref().ok_or_else(|| {
            anyhow::anyhow!("No origin configured (set \"origin\" or {})", ENV_ORIGIN)
        })
    }

    pub fn manifest(&self) -> Result<AssetManifest> {
        AssetManifest::new(self.manifest.iter().cloned()).context("Invalid asset manifest")
    }

    pub fn store_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.store_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn worker_options(&self) -> WorkerOptions {
        WorkerOptions {
            live_cache: self.live_cache.clone(),
            staging_cache: self.staging_cache.clone(),
            max_concurrent_fetches: self.max_concurrent_fetches,
        }
    }
}
