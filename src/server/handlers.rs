use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::model::{ConversionRequest, ConversionResult};
use crate::server::error::ApiError;
use crate::server::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Liveness only; no downstream checks.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Blocks until every page is rendered and uploaded. URL checks happen in
/// [`crate::convert::ConversionPipeline::convert`].
pub async fn convert_pdf(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ConversionRequest>, JsonRejection>,
) -> Result<Json<ConversionResult>, ApiError> {
    let Json(request) = payload?;
    let result = state.pipeline().convert(&request).await?;
    Ok(Json(result))
}
