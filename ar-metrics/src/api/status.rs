//! Store status endpoint

use axum::{extract::State, routing::get, Json, Router};

use ar_common::db::StoreStatus;

use crate::{ApiResult, AppState};

/// GET /api/status
///
/// `{lastUploadTimestamp, latestDataWeek, totalRecords, status}`
pub async fn get_status(State(state): State<AppState>) -> ApiResult<Json<StoreStatus>> {
    Ok(Json(state.store.status().await?))
}

/// Build status routes
pub fn status_routes() -> Router<AppState> {
    Router::new().route("/api/status", get(get_status))
}
