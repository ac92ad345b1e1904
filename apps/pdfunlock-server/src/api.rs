//! API handlers for the pdfunlock server
//!
//! Provides REST endpoints for:
//! - Single-file password removal (base64 in, base64 out)
//! - Batch unlocking with per-file passwords and a combined download

use axum::{
    body::Bytes,
    extract::DefaultBodyLimit,
    routing::{get, post},
    Json, Router,
};
use pdfunlock_core::{
    remove_password, run_batch, BatchRequest, BatchResponse, OutcomeKind, RemovePasswordRequest,
    RemovePasswordResponse,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use crate::error::{RemovePasswordError, ServerError};

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "pdfunlock-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Handler: POST /api/remove-password
///
/// The body is parsed by hand so that empty and malformed bodies produce the
/// same `{"error": ...}` shape as every other failure on this route.
pub async fn handle_remove_password(
    body: Bytes,
) -> Result<Json<RemovePasswordResponse>, RemovePasswordError> {
    if body.is_empty() {
        return Err(RemovePasswordError("Request body is empty".into()));
    }
    let req: RemovePasswordRequest = serde_json::from_slice(&body)
        .map_err(|e| RemovePasswordError(format!("Invalid JSON body: {}", e)))?;

    let result = tokio::task::spawn_blocking(move || remove_password(&req))
        .await
        .map_err(|e| {
            error!("Unlock task failed: {}", e);
            RemovePasswordError("Unknown error".into())
        })?;

    match result {
        Ok(response) => {
            info!("Removed password from uploaded PDF");
            Ok(Json(response))
        }
        Err(err) => {
            info!("Remove-password request rejected: {}", err);
            Err(err.into())
        }
    }
}

/// Handler: POST /api/unlock
pub async fn handle_unlock(
    Json(req): Json<BatchRequest>,
) -> Result<Json<BatchResponse>, ServerError> {
    if req.files.is_empty() {
        return Err(ServerError::InvalidRequest("No files uploaded".into()));
    }
    info!(
        "Unlock request: {} file(s), same_password={}",
        req.files.len(),
        req.same_password.is_some()
    );

    let response = tokio::task::spawn_blocking(move || run_batch(req))
        .await
        .map_err(|e| ServerError::Internal(format!("Unlock task failed: {}", e)))??;

    info!(
        "Unlock finished in {}ms: {} of {} unlocked",
        response.metrics.processing_time_ms,
        response
            .outcomes
            .iter()
            .filter(|o| o.kind == OutcomeKind::Success)
            .count(),
        response.metrics.document_count
    );

    Ok(Json(response))
}

/// All routes with body limit, CORS and request tracing. Rate limiting is
/// added by `main` because it needs the peer address.
pub fn build_router(max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/remove-password", post(handle_remove_password))
        .route("/api/unlock", post(handle_unlock))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
}
