//! HTTP surface: `POST /convert-pdf` and `GET /health`.
//!
//! Compiled only with the `server` feature. The router is built from an
//! [`AppState`] so tests can drive it in-process with fake collaborators.

pub mod error;
pub mod handlers;
pub mod state;

use crate::error::Pdf2ImgError;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::AppState;

/// Origins allowed when none are configured.
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost",
    "http://localhost:8080",
    "http://localhost:3000",
];

pub fn create_router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    Router::new()
        .route("/convert-pdf", post(handlers::convert_pdf))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS for an explicit origin list with credentials.
///
/// Browsers reject `*` together with credentials, so methods and headers
/// are mirrored from the preflight instead.
pub fn cors_layer<S: AsRef<str>>(origins: &[S]) -> Result<CorsLayer, Pdf2ImgError> {
    let origins = origins
        .iter()
        .map(|o| o.as_ref().trim())
        .filter(|o| !o.is_empty())
        .map(|o| {
            HeaderValue::from_str(o)
                .map_err(|e| Pdf2ImgError::InvalidConfig(format!("invalid origin '{o}': {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}
