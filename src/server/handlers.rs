// HTTP request handlers

use super::routes::AppState;
use crate::cache::{AssetRequest, AssetResponse, CacheReport, LifecycleState};
use crate::error::ShimError;
use crate::grader::{GradingRequest, GradingResult};
use crate::metrics;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub cache_version: String,
    pub cache_state: LifecycleState,
    pub checks: HashMap<String, HealthCheck>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Serialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: String,
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut checks = HashMap::new();
    let mut overall_status = HealthStatus::Healthy;

    // An unactivated cache still serves traffic, but only by passing it through
    let cache_state = state.cache_manager.state().await;
    let cache_check = if cache_state == LifecycleState::Activated {
        HealthCheck {
            status: "ok".to_string(),
            message: format!("Version {} is controlling", state.cache_manager.version()),
        }
    } else {
        overall_status = HealthStatus::Degraded;
        HealthCheck {
            status: "warning".to_string(),
            message: format!(
                "Version {} is {:?}; requests pass through to the origin",
                state.cache_manager.version(),
                cache_state
            ),
        }
    };
    checks.insert("asset_cache".to_string(), cache_check);

    let upstream_check = HealthCheck {
        status: "ok".to_string(),
        message: format!("Origin: {}", state.config.upstream.base_url),
    };
    checks.insert("configuration".to_string(), upstream_check);

    let grader_check = HealthCheck {
        status: "ok".to_string(),
        message: format!("Equality mode: {:?}", state.grader.equality()),
    };
    checks.insert("grader".to_string(), grader_check);

    Json(HealthResponse {
        status: overall_status,
        cache_version: state.cache_manager.version().to_string(),
        cache_state,
        checks,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Handler for /api/grade
pub async fn grade_handler(
    State(state): State<AppState>,
    body: String, // Raw JSON so malformed bodies get the error envelope
) -> Result<Json<GradingResult>, ShimError> {
    // Only unparseable bodies are rejected; malformed fields grade as failures.
    let json: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
        debug!("Rejected grading request: {}", e);
        ShimError::InvalidRequest(format!("JSON deserialization error: {}", e))
    })?;
    let request = GradingRequest::from_json(json);

    info!(
        "Received grading request: function={}, tests={}",
        request.function_name,
        request.total()
    );

    let result = state.grader.grade(request).await?;
    Ok(Json(result))
}

pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

pub async fn cache_admin_handler(State(state): State<AppState>) -> Json<CacheReport> {
    Json(state.cache_manager.report().await)
}

/// Every unrouted request goes through the cache manager.
pub async fn fallback_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ShimError> {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    let request = AssetRequest {
        method,
        path,
        headers,
        body,
    };

    match state
        .cache_manager
        .handle_fetch(&request, state.network.as_ref())
        .await?
    {
        Some(response) => Ok(to_http_response(response)),
        None => {
            // Failed-response surrogate: nothing cached and the origin is unreachable
            warn!("Offline with no cached copy of {}", request.path);
            Ok((StatusCode::GATEWAY_TIMEOUT, Body::empty()).into_response())
        }
    }
}

fn to_http_response(asset: AssetResponse) -> Response {
    let status = StatusCode::from_u16(asset.status).unwrap_or_else(|_| {
        error!("Origin returned invalid status {}", asset.status);
        StatusCode::BAD_GATEWAY
    });

    let mut response = Response::new(Body::from(asset.body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    for (name, value) in &asset.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => debug!("Dropping unrepresentable header {}", name),
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_http_response_copies_status_and_headers() {
        let asset = AssetResponse::new(201, "body")
            .with_header("content-type", "text/plain")
            .with_header("x-bad header", "ignored");

        let response = to_http_response(asset);
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["content-type"], "text/plain");
        assert_eq!(response.headers().len(), 1);
    }

    #[test]
    fn test_to_http_response_invalid_status() {
        let response = to_http_response(AssetResponse::new(42, ""));
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
