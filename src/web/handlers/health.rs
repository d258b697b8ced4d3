//! Health check handler

use axum::{extract::State, response::Response};

use crate::web::{
    AppState,
    responses::{HealthResponse, ok},
};

/// Liveness plus cache and background task statistics
pub async fn health_check(State(state): State<AppState>) -> Response {
    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cache: state.pipeline.cache().stats().await,
        background: state.pipeline.background_tasks().stats(),
    };

    ok(response)
}
