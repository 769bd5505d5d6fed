//! CSV upload endpoint
//!
//! POST /api/upload?filename=<name> with the raw CSV file as the request body.

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use ar_common::ingest::{ingest_csv, UploadReport};

use crate::{ApiError, ApiResult, AppState};

const DEFAULT_FILENAME: &str = "upload.csv";

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: Option<String>,
}

/// POST /api/upload
///
/// 200 when the batch was committed, 422 when it was rejected for structural
/// errors. Both carry the same report body.
pub async fn upload_csv(
    State(state): State<AppState>,
    query: Result<Query<UploadQuery>, QueryRejection>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<UploadReport>)> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let filename = query
        .filename
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string());

    tracing::debug!(filename = %filename, bytes = body.len(), "Received upload");

    let report = ingest_csv(&state.store, &filename, &body, ar_common::time::now()).await?;
    let status = if report.success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };

    Ok((status, Json(report)))
}

/// Build upload routes
pub fn upload_routes() -> Router<AppState> {
    Router::new().route("/api/upload", post(upload_csv))
}
