//! Axum HTTP server for exampro-shim.
//!
//! One router carries both components: the grading endpoint and, as the
//! fallback for every other path, the cache-first asset handler.
//!
//! # Components
//!
//! - `handlers`: grade, health, metrics, cache admin and the asset fallback.
//! - `middleware`: request ID propagation and per-route request metrics.
//! - `routes`: router assembly and shared [`AppState`].

mod handlers;
mod middleware;
mod routes;

pub use handlers::{HealthCheck, HealthResponse, HealthStatus};
pub use routes::{create_router, AppState};
