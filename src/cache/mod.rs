// Versioned, cache-first asset cache

pub mod manager;
pub mod models;
pub mod network;
pub mod store;

pub use manager::AssetCacheManager;
pub use models::{AssetRequest, AssetResponse, CacheConfig, CacheReport, CacheStats, LifecycleState, RequestKey};
pub use network::{Network, UpstreamClient};
pub use store::{Cache, CacheStore};
