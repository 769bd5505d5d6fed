//! ar-metrics library - weekly AR metrics service
//!
//! HTTP surface over the ar-common engine: CSV upload, current metrics,
//! historical series and store status.

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::trace::TraceLayer;

use ar_common::db::WeeklyRecordStore;

pub mod api;
pub mod error;

pub use crate::error::{ApiError, ApiResult};

/// Largest accepted upload body
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Weekly record store (owns the database pool and the writer lock)
    pub store: WeeklyRecordStore,
}

impl AppState {
    /// Create new application state
    pub fn new(store: WeeklyRecordStore) -> Self {
        Self { store }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::upload_routes())
        .merge(api::metrics_routes())
        .merge(api::status_routes())
        .merge(api::health_routes())
        .fallback(api::not_found)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
