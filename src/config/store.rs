use arc_swap::ArcSwap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::AppConfig;
use crate::error::{AppError, Result};

/// Configuration store backed by a JSON file
///
/// Uses `ArcSwap` for lock-free reads; writes go to disk first, then swap
/// the cached value.
#[derive(Clone)]
pub struct ConfigStore {
    path: PathBuf,
    /// Lock-free cache using ArcSwap for zero-cost reads
    cache: Arc<ArcSwap<AppConfig>>,
}

impl ConfigStore {
    /// Open the store, creating the file with defaults if missing
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let config = match tokio::fs::read(path).await {
            Ok(content) => serde_json::from_slice::<AppConfig>(&content).map_err(|e| {
                AppError::Config(format!("Invalid config file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Config file {} not found, writing defaults", path.display());
                let config = AppConfig::default();
                Self::save(path, &config).await?;
                config
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: path.to_path_buf(),
            cache: Arc::new(ArcSwap::from_pointee(config)),
        })
    }

    async fn save(path: &Path, config: &AppConfig) -> Result<()> {
        let content = serde_json::to_vec_pretty(config)?;
        // Write-then-rename keeps the file whole
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            warn!("Failed to replace {}: {}", path.display(), e);
            return Err(e.into());
        }
        Ok(())
    }

    /// Get current configuration (lock-free)
    pub fn get(&self) -> Arc<AppConfig> {
        self.cache.load_full()
    }

    /// Replace the whole configuration
    pub async fn set(&self, config: AppConfig) -> Result<()> {
        Self::save(&self.path, &config).await?;
        self.cache.store(Arc::new(config));
        Ok(())
    }

    /// Modify the configuration in place and persist it
    pub async fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = (*self.get()).clone();
        f(&mut config);
        self.set(config).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
