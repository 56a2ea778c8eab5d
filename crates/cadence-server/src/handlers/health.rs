//! Health check handler

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::{AppError, AppState};
use cadence_core::AIBackend;

/// AI backend status included in the health response
#[derive(Serialize)]
pub struct AiHealth {
    pub host: String,
    pub model: String,
    pub healthy: bool,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    /// None when no AI backend is configured
    pub ai: Option<AiHealth>,
}

/// GET /api/health - Service liveness plus AI backend reachability
pub async fn health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, AppError> {
    let ai = match state.engine.ai() {
        Some(client) => Some(AiHealth {
            host: client.host().to_string(),
            model: client.model().to_string(),
            healthy: client.health_check().await,
        }),
        None => None,
    };

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        ai,
    }))
}
