//! HTTP API handlers for ar-metrics

pub mod health;
pub mod metrics;
pub mod status;
pub mod upload;

pub use health::health_routes;
pub use metrics::{get_current_metrics, get_historical_metrics, metrics_routes};
pub use status::{get_status, status_routes};
pub use upload::{upload_csv, upload_routes};

use axum::http::Uri;

use crate::ApiError;

/// Fallback for unknown routes
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(uri.path().to_string())
}
