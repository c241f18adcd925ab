// Named cache versions and their entries, optionally persisted to disk

use crate::cache::models::{AssetResponse, RequestKey};
use crate::error::{Result, ShimError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const MANIFEST: &str = "manifest.json";

/// Registry of named caches. One of them is the current version; the
/// others are leftovers from earlier deployments until activation
/// deletes them.
///
/// A store opened with [`CacheStore::open_dir`] keeps each version in its
/// own directory, so versions and their entries survive a restart.
#[derive(Default)]
pub struct CacheStore {
    caches: RwLock<BTreeMap<String, Arc<Cache>>>,
    root: Option<PathBuf>,
}

impl CacheStore {
    /// A store that lives only in memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store persisted under `root`, loading every version already there.
    pub async fn open_dir(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;

        let mut caches = BTreeMap::new();
        let mut dirs = fs::read_dir(&root).await?;
        while let Some(entry) = dirs.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            match Cache::load(entry.path()).await {
                Ok(cache) => {
                    let entries = cache.len().await;
                    debug!("Loaded cache {} ({} entries)", cache.name, entries);
                    caches.insert(cache.name.clone(), Arc::new(cache));
                }
                Err(e) => {
                    warn!("Discarding unreadable cache at {}: {}", entry.path().display(), e);
                    fs::remove_dir_all(entry.path()).await?;
                }
            }
        }

        info!("Cache storage at {} ({} versions)", root.display(), caches.len());
        Ok(Self {
            caches: RwLock::new(caches),
            root: Some(root),
        })
    }

    /// Open the cache called `name`, creating it if absent.
    pub async fn open(&self, name: &str) -> Result<Arc<Cache>> {
        if let Some(cache) = self.caches.read().await.get(name) {
            return Ok(cache.clone());
        }
        let mut caches = self.caches.write().await;
        if let Some(cache) = caches.get(name) {
            return Ok(cache.clone());
        }

        debug!("Creating cache {}", name);
        let cache = match &self.root {
            Some(root) => Cache::create(name, free_dir(root, name).await?).await?,
            None => Cache::in_memory(name),
        };
        let cache = Arc::new(cache);
        caches.insert(name.to_string(), cache.clone());
        Ok(cache)
    }

    /// The cache called `name`, without creating it.
    pub async fn get(&self, name: &str) -> Option<Arc<Cache>> {
        self.caches.read().await.get(name).cloned()
    }

    pub async fn has(&self, name: &str) -> bool {
        self.caches.read().await.contains_key(name)
    }

    /// Remove a cache and all its entries. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let Some(cache) = self.caches.write().await.remove(name) else {
            return Ok(false);
        };
        if let Some(dir) = &cache.dir {
            fs::remove_dir_all(dir).await?;
        }
        Ok(true)
    }

    /// Names of every cache, in sorted order.
    pub async fn keys(&self) -> Vec<String> {
        self.caches.read().await.keys().cloned().collect()
    }
}

/// Directory for a cache name. Characters outside a portable set are
/// replaced; the real name is kept in the manifest.
fn dir_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

/// A directory under `root` not already holding another version.
async fn free_dir(root: &Path, name: &str) -> Result<PathBuf> {
    let base = dir_name(name);
    let mut candidate = root.join(&base);
    let mut suffix = 1;
    while fs::try_exists(&candidate).await? {
        candidate = root.join(format!("{}-{}", base, suffix));
        suffix += 1;
    }
    Ok(candidate)
}

/// On-disk index of one cache version; bodies live in their own files.
#[derive(Serialize, Deserialize)]
struct Manifest {
    name: String,
    entries: Vec<ManifestEntry>,
}

#[derive(Serialize, Deserialize)]
struct ManifestEntry {
    method: String,
    path: String,
    status: u16,
    headers: Vec<(String, String)>,
    body: u64,
}

#[derive(Clone)]
struct Entry {
    response: AssetResponse,
    body: u64,
}

/// One cache version: a map from request identity to stored response.
pub struct Cache {
    name: String,
    dir: Option<PathBuf>,
    entries: RwLock<HashMap<RequestKey, Entry>>,
    next_body: AtomicU64,
}

impl Cache {
    fn in_memory(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dir: None,
            entries: RwLock::new(HashMap::new()),
            next_body: AtomicU64::new(0),
        }
    }

    async fn create(name: &str, dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        let cache = Self {
            dir: Some(dir),
            ..Self::in_memory(name)
        };
        cache.write_manifest(&HashMap::new()).await?;
        Ok(cache)
    }

    async fn load(dir: PathBuf) -> Result<Self> {
        let manifest: Manifest = serde_json::from_slice(&fs::read(dir.join(MANIFEST)).await?)?;
        let mut entries = HashMap::new();
        let mut next_body = 0;
        for stored in manifest.entries {
            let body = fs::read(body_path(&dir, stored.body)).await?;
            next_body = next_body.max(stored.body + 1);
            entries.insert(
                RequestKey {
                    method: stored.method,
                    path: stored.path,
                },
                Entry {
                    response: AssetResponse {
                        status: stored.status,
                        headers: stored.headers,
                        body: body.into(),
                    },
                    body: stored.body,
                },
            );
        }
        Ok(Self {
            name: manifest.name,
            dir: Some(dir),
            entries: RwLock::new(entries),
            next_body: AtomicU64::new(next_body),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn match_request(&self, key: &RequestKey) -> Option<AssetResponse> {
        self.entries.read().await.get(key).map(|entry| entry.response.clone())
    }

    /// Store `response` under `key`, replacing any earlier entry.
    pub async fn put(&self, key: RequestKey, response: AssetResponse) -> Result<()> {
        self.put_all(vec![(key, response)]).await
    }

    /// Store every entry or none of them.
    pub async fn put_all(&self, entries: Vec<(RequestKey, AssetResponse)>) -> Result<()> {
        for (key, response) in &entries {
            Self::check_storable(key, response)?;
        }

        let mut map = self.entries.write().await;
        let mut updated = map.clone();
        let mut written = Vec::with_capacity(entries.len());
        let mut replaced = Vec::new();
        for (key, response) in entries {
            let body = self.next_body.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = self.write_body(body, &response).await {
                self.remove_bodies(&written).await;
                return Err(e);
            }
            written.push(body);
            if let Some(previous) = updated.insert(key, Entry { response, body }) {
                replaced.push(previous.body);
            }
        }
        if let Err(e) = self.write_manifest(&updated).await {
            self.remove_bodies(&written).await;
            return Err(e);
        }

        *map = updated;
        self.remove_bodies(&replaced).await;
        Ok(())
    }

    pub async fn keys(&self) -> Vec<RequestKey> {
        let mut keys: Vec<RequestKey> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn write_body(&self, body: u64, response: &AssetResponse) -> Result<()> {
        if let Some(dir) = &self.dir {
            fs::write(body_path(dir, body), &response.body).await?;
        }
        Ok(())
    }

    async fn remove_bodies(&self, bodies: &[u64]) {
        let Some(dir) = &self.dir else {
            return;
        };
        for body in bodies {
            if let Err(e) = fs::remove_file(body_path(dir, *body)).await {
                warn!("Failed to remove cached body {} of {}: {}", body, self.name, e);
            }
        }
    }

    /// Replace the manifest in one rename so a crash never leaves it half written.
    async fn write_manifest(&self, entries: &HashMap<RequestKey, Entry>) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let mut stored: Vec<ManifestEntry> = entries
            .iter()
            .map(|(key, entry)| ManifestEntry {
                method: key.method.clone(),
                path: key.path.clone(),
                status: entry.response.status,
                headers: entry.response.headers.clone(),
                body: entry.body,
            })
            .collect();
        stored.sort_by_key(|entry| entry.body);
        let manifest = Manifest {
            name: self.name.clone(),
            entries: stored,
        };

        let staging = dir.join(format!("{}.tmp", MANIFEST));
        fs::write(&staging, serde_json::to_vec_pretty(&manifest)?).await?;
        fs::rename(&staging, dir.join(MANIFEST)).await?;
        Ok(())
    }

    /// Cache storage only accepts complete responses to GET requests.
    fn check_storable(key: &RequestKey, response: &AssetResponse) -> Result<()> {
        if !key.is_get() {
            return Err(ShimError::Cache(format!(
                "Request method '{}' is unsupported",
                key.method
            )));
        }
        if response.status == 206 {
            return Err(ShimError::Cache("Partial response (status code 206) is unsupported".into()));
        }
        if response.header("vary").is_some_and(|v| v.trim() == "*") {
            return Err(ShimError::Cache("Vary header contains *".into()));
        }
        Ok(())
    }
}

fn body_path(dir: &Path, body: u64) -> PathBuf {
    dir.join(format!("{}.body", body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    #[tokio::test]
    async fn test_open_creates_once() {
        let store = CacheStore::new();
        let first = store.open("v1").await.unwrap();
        first.put(RequestKey::get("/"), AssetResponse::new(200, "home")).await.unwrap();

        let second = store.open("v1").await.unwrap();
        assert_eq!(second.len().await, 1);
        assert!(store.has("v1").await);
        assert_eq!(store.keys().await, vec!["v1"]);
    }

    #[tokio::test]
    async fn test_delete_removes_entries() {
        let store = CacheStore::new();
        store.open("old").await.unwrap();
        store.open("new").await.unwrap();

        assert!(store.delete("old").await.unwrap());
        assert!(!store.delete("old").await.unwrap());
        assert_eq!(store.keys().await, vec!["new"]);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = CacheStore::new();
        let cache = store.open("v1").await.unwrap();
        let key = RequestKey::get("/app.js");
        cache.put(key.clone(), AssetResponse::new(200, "one")).await.unwrap();
        cache.put(key.clone(), AssetResponse::new(200, "two")).await.unwrap();

        let stored = cache.match_request(&key).await.unwrap();
        assert_eq!(stored.body, "two");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_rejects_unstorable_entries() {
        let store = CacheStore::new();
        let cache = store.open("v1").await.unwrap();

        let post = RequestKey::new(&Method::POST, "/api");
        assert!(cache.put(post, AssetResponse::new(200, "")).await.is_err());

        let partial = AssetResponse::new(206, "part");
        assert!(cache.put(RequestKey::get("/video"), partial).await.is_err());

        let vary = AssetResponse::new(200, "").with_header("Vary", "*");
        assert!(cache.put(RequestKey::get("/vary"), vary).await.is_err());

        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_put_all_is_all_or_nothing() {
        let store = CacheStore::new();
        let cache = store.open("v1").await.unwrap();
        let result = cache
            .put_all(vec![
                (RequestKey::get("/"), AssetResponse::new(200, "ok")),
                (RequestKey::get("/bad"), AssetResponse::new(206, "partial")),
            ])
            .await;

        assert!(result.is_err());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_entries_survive_reopening() {
        let root = tempfile::tempdir().unwrap();
        {
            let store = CacheStore::open_dir(root.path()).await.unwrap();
            let cache = store.open("exampro-cache-v1").await.unwrap();
            let index = AssetResponse::new(200, "<html>").with_header("content-type", "text/html");
            cache.put(RequestKey::get("/index.html"), index).await.unwrap();
            cache.put(RequestKey::get("/app.js"), AssetResponse::new(200, "one")).await.unwrap();
            cache.put(RequestKey::get("/app.js"), AssetResponse::new(200, "two")).await.unwrap();
        }

        let store = CacheStore::open_dir(root.path()).await.unwrap();
        assert_eq!(store.keys().await, vec!["exampro-cache-v1"]);
        let cache = store.get("exampro-cache-v1").await.unwrap();
        assert_eq!(cache.len().await, 2);

        let index = cache.match_request(&RequestKey::get("/index.html")).await.unwrap();
        assert_eq!(index.body, "<html>");
        assert_eq!(index.header("content-type"), Some("text/html"));
        let script = cache.match_request(&RequestKey::get("/app.js")).await.unwrap();
        assert_eq!(script.body, "two");

        // Overwritten bodies are not left behind.
        let dir = root.path().join("exampro-cache-v1");
        let bodies = std::fs::read_dir(dir)
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().extension().is_some_and(|x| x == "body"))
            .count();
        assert_eq!(bodies, 2);
    }

    #[tokio::test]
    async fn test_delete_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let store = CacheStore::open_dir(root.path()).await.unwrap();
        store.open("old").await.unwrap();
        assert!(root.path().join("old").is_dir());

        assert!(store.delete("old").await.unwrap());
        assert!(!root.path().join("old").exists());

        let reopened = CacheStore::open_dir(root.path()).await.unwrap();
        assert!(reopened.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_put_all_is_not_persisted() {
        let root = tempfile::tempdir().unwrap();
        let store = CacheStore::open_dir(root.path()).await.unwrap();
        let cache = store.open("v1").await.unwrap();
        let result = cache
            .put_all(vec![
                (RequestKey::get("/"), AssetResponse::new(200, "ok")),
                (RequestKey::get("/bad"), AssetResponse::new(206, "partial")),
            ])
            .await;
        assert!(result.is_err());

        let reopened = CacheStore::open_dir(root.path()).await.unwrap();
        assert!(reopened.get("v1").await.unwrap().is_empty().await);
    }

    #[tokio::test]
    async fn test_names_are_kept_apart_on_disk() {
        let root = tempfile::tempdir().unwrap();
        {
            let store = CacheStore::open_dir(root.path()).await.unwrap();
            store.open("a/b").await.unwrap();
            store.open("a_b").await.unwrap();
            store.open("../up").await.unwrap();
        }
        assert!(!root.path().parent().unwrap().join("up").exists());

        let store = CacheStore::open_dir(root.path()).await.unwrap();
        assert_eq!(store.keys().await, vec!["../up", "a/b", "a_b"]);
    }

    #[tokio::test]
    async fn test_unreadable_version_is_discarded() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("broken")).unwrap();
        std::fs::write(root.path().join("broken").join(MANIFEST), "{not json").unwrap();

        let store = CacheStore::open_dir(root.path()).await.unwrap();
        assert!(store.keys().await.is_empty());
        assert!(!root.path().join("broken").exists());
    }
}
