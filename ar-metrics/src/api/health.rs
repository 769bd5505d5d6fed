//! Liveness endpoint
//!
//! Answers as soon as the router is up. Store readiness is reported by
//! `/api/status`, so a load balancer can tell "process alive" apart from
//! "data uploaded".

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

const SERVICE_NAME: &str = "ar-metrics";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process serves requests
    pub status: &'static str,
    pub module: &'static str,
    /// Crate version of the running binary
    pub version: &'static str,
}

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        module: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
