// Router tests using tower::ServiceExt::oneshot

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use exampro_shim::cache::{
    AssetCacheManager, AssetRequest, AssetResponse, CacheConfig, CacheStore, Network,
};
use exampro_shim::config::AppConfig;
use exampro_shim::error::{Result, ShimError};
use exampro_shim::server::create_router;
use http_body_util::BodyExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

/// Origin that serves every path until switched off.
struct SwitchableOrigin {
    online: AtomicBool,
}

#[async_trait]
impl Network for SwitchableOrigin {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(ShimError::Upstream("connection refused".to_string()));
        }
        Ok(AssetResponse::new(200, format!("{} {}", request.method, request.path))
            .with_header("content-type", "text/plain"))
    }
}

async fn app(activate: bool) -> (Router, Arc<SwitchableOrigin>) {
    let config = AppConfig::default();
    let origin = Arc::new(SwitchableOrigin {
        online: AtomicBool::new(true),
    });
    let manager = Arc::new(AssetCacheManager::new(
        CacheConfig::from(&config.cache),
        Arc::new(CacheStore::new()),
    ));
    if activate {
        manager.install(origin.as_ref()).await.unwrap();
        manager.activate().await.unwrap();
    }
    let router = create_router(config, manager, origin.clone()).unwrap();
    (router, origin)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

fn grade_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/grade")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_grade_endpoint() {
    let (router, _) = app(true).await;
    let body = r#"{
        "functionName": "add",
        "starter": "function add(a,b){return a+b}",
        "code": "",
        "tests": [{"args":[1,2],"expected":3},{"args":[2,2],"expected":5}]
    }"#;

    let (status, body) = send(&router, grade_request(body)).await;
    let result: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(result, serde_json::json!({ "passed": 1, "total": 2 }));
}

#[tokio::test]
async fn test_grade_rejects_malformed_json() {
    let (router, _) = app(true).await;

    let (status, body) = send(&router, grade_request("{\"functionName\": ")).await;
    let error: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn test_grade_without_function_name_scores_zero() {
    let (router, _) = app(true).await;

    let (status, body) = send(
        &router,
        grade_request(r#"{"code": "function f() { return 1; }", "tests": [{"args": [], "expected": 1}]}"#),
    )
    .await;
    let result: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(result, serde_json::json!({ "passed": 0, "total": 1 }));
}

#[tokio::test]
async fn test_grade_with_malformed_fields_scores_zero() {
    let (router, _) = app(true).await;
    let body = r#"{
        "functionName": "add",
        "code": 12,
        "tests": [{"args": 5, "expected": 3}, {"args": [1, 2], "expected": 3}]
    }"#;

    let (status, body) = send(&router, grade_request(body)).await;
    let result: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(result, serde_json::json!({ "passed": 0, "total": 2 }));
}

#[tokio::test]
async fn test_cached_asset_served_while_offline() {
    let (router, origin) = app(true).await;
    origin.online.store(false, Ordering::SeqCst);

    let (status, body) = send(&router, get("/index.html")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"GET /index.html");
}

#[tokio::test]
async fn test_offline_miss_is_gateway_timeout() {
    let (router, origin) = app(true).await;
    origin.online.store(false, Ordering::SeqCst);

    let (status, body) = send(&router, get("/assets/missing.css")).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_post_passes_through_with_query() {
    let (router, _) = app(true).await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/feedback?source=app")
        .body(Body::from("hello"))
        .unwrap();

    let (status, body) = send(&router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"POST /api/feedback?source=app");
}

#[tokio::test]
async fn test_pass_through_failure_is_bad_gateway() {
    let (router, origin) = app(false).await;
    origin.online.store(false, Ordering::SeqCst);

    let (status, _) = send(&router, get("/index.html")).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_health_reports_cache_state() {
    let (router, _) = app(false).await;

    let (status, body) = send(&router, get("/health")).await;
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["cache_version"], "exampro-cache-v1");
    assert_eq!(health["cache_state"], "parsed");
    assert!(health["timestamp"].is_string());
}

#[tokio::test]
async fn test_admin_cache_and_metrics() {
    let (router, _) = app(true).await;
    send(&router, get("/index.html")).await;

    let (status, body) = send(&router, get("/admin/cache")).await;
    let report: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["state"], "activated");
    assert_eq!(report["entries"], 2);
    assert_eq!(report["stats"]["hits"], 1);

    let (status, body) = send(&router, get("/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8_lossy(&body).contains("cache_operations_total"));
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let (router, _) = app(true).await;

    let response = router.oneshot(get("/health")).await.unwrap();

    assert!(response.headers().contains_key("x-request-id"));
}
