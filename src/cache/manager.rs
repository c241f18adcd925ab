// Asset cache manager - precache, version cleanup and cache-first fetch

use crate::cache::models::{
    AssetRequest, AssetResponse, CacheConfig, CacheReport, CacheStats, LifecycleState, RequestKey,
};
use crate::cache::network::Network;
use crate::cache::store::{Cache, CacheStore};
use crate::error::{Result, ShimError};
use crate::metrics;
use axum::http::Method;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Cache-first shim in front of the application origin.
///
/// Lifecycle: [`install`](Self::install) precaches the manifest into the
/// current version, [`activate`](Self::activate) deletes every other
/// version and starts controlling traffic, after which
/// [`handle_fetch`](Self::handle_fetch) serves GETs from the cache.
pub struct AssetCacheManager {
    config: CacheConfig,
    store: Arc<CacheStore>,
    state: RwLock<LifecycleState>,
    stats: RwLock<CacheStats>,
}

impl AssetCacheManager {
    pub fn new(config: CacheConfig, store: Arc<CacheStore>) -> Self {
        Self {
            config,
            store,
            state: RwLock::new(LifecycleState::Parsed),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    /// Fetch every manifest asset and store them together. Any failed
    /// fetch or non-success status fails the whole install and nothing
    /// is written.
    pub async fn install(&self, network: &dyn Network) -> Result<()> {
        let cache = self.store.open(&self.config.version).await?;
        info!(
            "Installing cache {} ({} assets)",
            self.config.version,
            self.config.assets.len()
        );

        let mut entries = Vec::with_capacity(self.config.assets.len());
        for path in &self.config.assets {
            let request = AssetRequest::get(path.clone());
            let response = network
                .fetch(&request)
                .await
                .map_err(|e| ShimError::Upstream(format!("Failed to precache {}: {}", path, e)))?;
            if !response.is_success() {
                return Err(ShimError::Upstream(format!(
                    "Failed to precache {}: status {}",
                    path, response.status
                )));
            }
            entries.push((request.key(), response));
        }
        cache.put_all(entries).await?;
        metrics::update_cache_entries(&self.config.version, cache.len().await);

        // Skip waiting: eligible for activation immediately.
        let mut state = self.state.write().await;
        if *state == LifecycleState::Parsed {
            *state = LifecycleState::Installed;
        }
        info!("Cache {} installed", self.config.version);
        Ok(())
    }

    /// Delete every cache version other than the current one, then claim
    /// traffic if install succeeded. Returns the deleted version names.
    pub async fn activate(&self) -> Result<Vec<String>> {
        let mut deleted = Vec::new();
        for name in self.store.keys().await {
            if name == self.config.version {
                continue;
            }
            match self.store.delete(&name).await {
                Ok(true) => {
                    info!("Deleted stale cache {}", name);
                    deleted.push(name);
                }
                Ok(false) => {}
                Err(e) => warn!("Failed to delete stale cache {}: {}", name, e),
            }
        }

        let mut state = self.state.write().await;
        match *state {
            LifecycleState::Parsed => {
                warn!(
                    "Cache {} was not installed; requests will pass through",
                    self.config.version
                );
            }
            LifecycleState::Installed | LifecycleState::Activated => {
                *state = LifecycleState::Activated;
                info!("Cache {} activated", self.config.version);
            }
        }
        Ok(deleted)
    }

    /// Answer one request.
    ///
    /// `Ok(None)` is the failed-response surrogate: a GET that missed the
    /// cache and whose network fetch failed. Errors only come from
    /// pass-through requests, which are not intercepted.
    pub async fn handle_fetch(
        &self,
        request: &AssetRequest,
        network: &dyn Network,
    ) -> Result<Option<AssetResponse>> {
        if request.method != Method::GET || self.state().await != LifecycleState::Activated {
            self.stats.write().await.passthroughs += 1;
            metrics::record_cache_event("passthrough");
            debug!("Passing through {} {}", request.method, request.path);
            return network.fetch(request).await.map(Some);
        }

        let key = request.key();
        let cache = self.store.open(&self.config.version).await?;
        if let Some(cached) = cache.match_request(&key).await {
            self.stats.write().await.hits += 1;
            metrics::record_cache_event("hit");
            debug!("Cache hit: {}", key);
            return Ok(Some(cached));
        }

        self.stats.write().await.misses += 1;
        metrics::record_cache_event("miss");
        debug!("Cache miss: {}", key);

        match network.fetch(request).await {
            Ok(response) => {
                self.store_copy(&cache, key, &response).await;
                Ok(Some(response))
            }
            Err(e) => {
                self.stats.write().await.network_failures += 1;
                metrics::record_cache_event("network_failure");
                debug!("Network failure for {}: {}", request.path, e);
                Ok(None)
            }
        }
    }

    /// Write a duplicate of `response`; failures are logged and ignored.
    async fn store_copy(&self, cache: &Cache, key: RequestKey, response: &AssetResponse) {
        let label = key.to_string();
        match cache.put(key, response.clone()).await {
            Ok(()) => {
                self.stats.write().await.stores += 1;
                metrics::record_cache_event("store");
                metrics::update_cache_entries(cache.name(), cache.len().await);
            }
            Err(e) => {
                self.stats.write().await.store_failures += 1;
                metrics::record_cache_event("store_failure");
                debug!("Ignoring cache write failure for {}: {}", label, e);
            }
        }
    }

    /// Get cache statistics
    pub async fn get_stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }

    pub async fn report(&self) -> CacheReport {
        let entries = match self.store.get(&self.config.version).await {
            Some(cache) => cache.len().await,
            None => 0,
        };
        CacheReport {
            current_version: self.config.version.clone(),
            versions: self.store.keys().await,
            state: self.state().await,
            entries,
            stats: self.get_stats().await,
        }
    }
}
