//! Metrics query endpoints
//!
//! GET /api/metrics/current, GET /api/metrics/historical

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use ar_common::history::{historical_series, HistoryPoint, DEFAULT_HISTORY_MONTHS};
use ar_common::metrics::{current_metrics, MetricsReport};
use ar_common::QueryOutcome;

use crate::{ApiError, ApiResult, AppState};

/// Query parameters for the current metrics
#[derive(Debug, Deserialize)]
pub struct CurrentQuery {
    /// Reference week override (YYYY-MM-DD); defaults to the latest stored week
    pub week: Option<NaiveDate>,
}

/// Query parameters for the historical series
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalQuery {
    #[serde(default = "default_months")]
    pub months: u32,
    pub as_of: Option<NaiveDate>,
}

fn default_months() -> u32 {
    DEFAULT_HISTORY_MONTHS
}

#[derive(Debug, Serialize)]
pub struct HistoricalResponse {
    pub data: Vec<HistoryPoint>,
}

/// GET /api/metrics/current
pub async fn get_current_metrics(
    State(state): State<AppState>,
    query: Result<Query<CurrentQuery>, QueryRejection>,
) -> ApiResult<Json<MetricsReport>> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    match current_metrics(&state.store, query.week).await? {
        QueryOutcome::Ready(report) => Ok(Json(report)),
        QueryOutcome::Empty => Err(ApiError::NoData(
            "No weekly data has been uploaded yet".to_string(),
        )),
    }
}

/// GET /api/metrics/historical
pub async fn get_historical_metrics(
    State(state): State<AppState>,
    query: Result<Query<HistoricalQuery>, QueryRejection>,
) -> ApiResult<Json<HistoricalResponse>> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let data = historical_series(&state.store, query.months, query.as_of).await?;
    tracing::debug!(months = query.months, points = data.len(), "Historical query");

    Ok(Json(HistoricalResponse { data }))
}

/// Build metrics routes
pub fn metrics_routes() -> Router<AppState> {
    Router::new()
        .route("/api/metrics/current", get(get_current_metrics))
        .route("/api/metrics/historical", get(get_historical_metrics))
}
