//! HTTP response types and error mapping
//!
//! Resize results are returned as a bare JSON array; every other JSON body
//! (health, errors) uses the [`ApiResponse`] envelope.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::services::{BackgroundTaskStats, ResizeCacheStats};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now(),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Service health, including cache and background task counters
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub cache: ResizeCacheStats,
    pub background: BackgroundTaskStats,
}

/// Status code an error is reported with
pub fn status_for(error: &AppError) -> StatusCode {
    match error {
        AppError::Validation { .. } => StatusCode::BAD_REQUEST,
        AppError::NotFound { .. } => StatusCode::NOT_FOUND,
        AppError::Fetch(_)
        | AppError::Transform(_)
        | AppError::Configuration { .. }
        | AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert AppError to an HTTP response
pub fn handle_error(error: AppError) -> Response {
    let status = status_for(&error);
    let message = match &error {
        AppError::Validation { message } => message.clone(),
        AppError::NotFound { resource, id } => format!("{resource} '{id}' not found"),
        other => other.to_string(),
    };

    if status.is_server_error() {
        tracing::error!(error = %error, "Request failed");
    }

    error_response(status, message)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        handle_error(self)
    }
}

pub fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

pub fn created<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

pub fn error_response<S: Into<String>>(status: StatusCode, message: S) -> Response {
    (status, Json(ApiResponse::error(message.into()))).into_response()
}

pub fn bad_request(message: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, message)
}

pub fn service_unavailable(message: &str) -> Response {
    error_response(StatusCode::SERVICE_UNAVAILABLE, message)
}
