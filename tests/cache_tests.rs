// Asset cache lifecycle against a fake origin

use exampro_shim::cache::{
    AssetCacheManager, AssetRequest, CacheConfig, CacheStore, LifecycleState, UpstreamClient,
};
use exampro_shim::config::UpstreamConfig;
use std::sync::Arc;

fn client(base_url: &str) -> UpstreamClient {
    UpstreamClient::new(&UpstreamConfig {
        base_url: base_url.to_string(),
        timeout_seconds: 5,
    })
    .unwrap()
}

/// An origin nobody listens on.
fn offline() -> UpstreamClient {
    client("http://127.0.0.1:9")
}

fn manager(version: &str, store: Arc<CacheStore>) -> AssetCacheManager {
    AssetCacheManager::new(
        CacheConfig {
            version: version.to_string(),
            assets: vec!["/".to_string(), "/index.html".to_string()],
        },
        store,
    )
}

#[tokio::test]
async fn test_precached_assets_survive_going_offline() {
    let mut origin = mockito::Server::new_async().await;
    let root = origin
        .mock("GET", "/")
        .with_status(200)
        .with_body("<html>root</html>")
        .create_async()
        .await;
    let index = origin
        .mock("GET", "/index.html")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html>index</html>")
        .create_async()
        .await;

    let cache = manager("exampro-cache-v1", Arc::new(CacheStore::new()));
    cache.install(&client(&origin.url())).await.unwrap();
    cache.activate().await.unwrap();
    root.assert_async().await;
    index.assert_async().await;
    assert_eq!(cache.state().await, LifecycleState::Activated);

    let response = cache
        .handle_fetch(&AssetRequest::get("/index.html"), &offline())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "<html>index</html>");
    assert_eq!(response.header("content-type"), Some("text/html"));

    let stats = cache.get_stats().await;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 0);
}

#[tokio::test]
async fn test_offline_and_uncached_yields_surrogate() {
    let store = Arc::new(CacheStore::new());
    let cache = AssetCacheManager::new(
        CacheConfig {
            version: "exampro-cache-v1".to_string(),
            assets: Vec::new(),
        },
        store,
    );
    cache.install(&offline()).await.unwrap();
    cache.activate().await.unwrap();

    let outcome = cache
        .handle_fetch(&AssetRequest::get("/index.html"), &offline())
        .await
        .unwrap();

    assert!(outcome.is_none());
    assert_eq!(cache.get_stats().await.network_failures, 1);
}

#[tokio::test]
async fn test_runtime_caching_of_misses() {
    let mut origin = mockito::Server::new_async().await;
    let _root = origin.mock("GET", "/").with_body("root").create_async().await;
    let _index = origin.mock("GET", "/index.html").with_body("index").create_async().await;
    let asset = origin
        .mock("GET", "/assets/app.js")
        .with_header("content-type", "text/javascript")
        .with_body("console.log(1)")
        .expect(1)
        .create_async()
        .await;

    let network = client(&origin.url());
    let cache = manager("exampro-cache-v1", Arc::new(CacheStore::new()));
    cache.install(&network).await.unwrap();
    cache.activate().await.unwrap();

    let request = AssetRequest::get("/assets/app.js");
    let first = cache.handle_fetch(&request, &network).await.unwrap().unwrap();
    let second = cache.handle_fetch(&request, &offline()).await.unwrap().unwrap();

    assert_eq!(first, second);
    asset.assert_async().await;
}

#[tokio::test]
async fn test_failed_install_leaves_requests_passing_through() {
    let mut origin = mockito::Server::new_async().await;
    let _root = origin.mock("GET", "/").with_body("root").create_async().await;
    let _index = origin
        .mock("GET", "/index.html")
        .with_status(404)
        .create_async()
        .await;

    let store = Arc::new(CacheStore::new());
    let network = client(&origin.url());
    let cache = manager("exampro-cache-v1", store.clone());

    assert!(cache.install(&network).await.is_err());
    cache.activate().await.unwrap();
    assert_eq!(cache.state().await, LifecycleState::Parsed);

    // Nothing from the failed precache was kept
    let entries = store.open("exampro-cache-v1").await.unwrap().len().await;
    assert_eq!(entries, 0);

    let response = cache
        .handle_fetch(&AssetRequest::get("/"), &network)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.body, "root");
    assert_eq!(cache.get_stats().await.passthroughs, 1);
}

#[tokio::test]
async fn test_new_version_retires_old_ones() {
    let mut origin = mockito::Server::new_async().await;
    let _root = origin.mock("GET", "/").with_body("root").expect_at_least(1).create_async().await;
    let _index = origin.mock("GET", "/index.html").with_body("index").expect_at_least(1).create_async().await;
    let network = client(&origin.url());
    let store = Arc::new(CacheStore::new());

    let old = manager("exampro-cache-v1", store.clone());
    old.install(&network).await.unwrap();
    old.activate().await.unwrap();

    let new = manager("exampro-cache-v2", store.clone());
    new.install(&network).await.unwrap();
    let retired = new.activate().await.unwrap();

    assert_eq!(retired, vec!["exampro-cache-v1".to_string()]);
    assert_eq!(store.keys().await, vec!["exampro-cache-v2".to_string()]);

    let report = new.report().await;
    assert_eq!(report.current_version, "exampro-cache-v2");
    assert_eq!(report.entries, 2);
}
