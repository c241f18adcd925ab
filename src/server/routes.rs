// HTTP routes configuration

use super::handlers::{
    cache_admin_handler, fallback_handler, grade_handler, health_handler, metrics_handler,
};
use super::middleware::{request_id_layers, track_metrics};
use crate::cache::{AssetCacheManager, Network};
use crate::config::AppConfig;
use crate::error::Result;
use crate::grader::GradingWorker;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub cache_manager: Arc<AssetCacheManager>,
    pub network: Arc<dyn Network>,
    pub grader: GradingWorker,
}

pub fn create_router(
    config: AppConfig,
    cache_manager: Arc<AssetCacheManager>,
    network: Arc<dyn Network>,
) -> Result<Router> {
    let max_body_bytes = config.grader.max_body_bytes;
    let state = AppState {
        grader: GradingWorker::new(config.grader.equality),
        config,
        cache_manager,
        network,
    };

    let (set_request_id, propagate_request_id) = request_id_layers();

    let app = Router::new()
        .route(
            "/api/grade",
            post(grade_handler).layer(RequestBodyLimitLayer::new(max_body_bytes)),
        )
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/admin/cache", get(cache_admin_handler))
        // Everything else goes through the asset cache
        .fallback(fallback_handler)
        .layer(middleware::from_fn(track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id)
        .layer(set_request_id)
        .with_state(state);

    Ok(app)
}
