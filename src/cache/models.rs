//! Request/response snapshots, cache configuration and statistics.

use crate::config::CacheSettings;
use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use serde::Serialize;
use std::fmt;

/// Identity of a cached request: method plus path and query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RequestKey {
    pub method: String,
    pub path: String,
}

impl RequestKey {
    pub fn new(method: &Method, path: impl Into<String>) -> Self {
        Self {
            method: method.as_str().to_string(),
            path: path.into(),
        }
    }

    /// Key for a GET of `path`, the only kind of request ever stored.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(&Method::GET, path)
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET.as_str()
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// An incoming request as seen by the cache manager.
#[derive(Debug, Clone)]
pub struct AssetRequest {
    pub method: Method,
    /// Path plus query string, e.g. `/index.html?v=2`.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl AssetRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, self.path.clone())
    }
}

/// A fully buffered response. Cloning it is the "duplicate" that gets
/// stored while the original goes back to the caller; the body is
/// reference counted so the copy is cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl AssetResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Configuration for the asset cache manager.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Name of the current cache version.
    pub version: String,
    /// Paths precached on install.
    pub assets: Vec<String>,
}

impl Default for CacheConfig {
    /// `exampro-cache-v1` with the `/` and `/index.html` manifest.
    fn default() -> Self {
        CacheConfig::from(&CacheSettings::default())
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            version: settings.version.clone(),
            assets: settings.assets.clone(),
        }
    }
}

/// Lifecycle of the manager for its current version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Created; install has not succeeded yet.
    Parsed,
    /// Precache complete; waiting for activation.
    Installed,
    /// Controlling traffic: GETs are served cache-first.
    Activated,
}

/// Statistics for cache operations.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CacheStats {
    /// GETs answered from the cache.
    pub hits: u64,
    /// GETs that went to the network.
    pub misses: u64,
    /// Responses written to the cache on a miss.
    pub stores: u64,
    /// Cache writes that failed and were ignored.
    pub store_failures: u64,
    /// Misses where the network request failed.
    pub network_failures: u64,
    /// Requests forwarded without interception.
    pub passthroughs: u64,
}

/// Snapshot returned by the admin endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub current_version: String,
    pub versions: Vec<String>,
    pub state: LifecycleState,
    pub entries: usize,
    pub stats: CacheStats,
}
