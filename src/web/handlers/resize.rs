//! `POST /v1/resize`

use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    response::Response,
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::{ResizeMode, ResizeRequest};
use crate::web::{
    AppState,
    responses::{bad_request, created, handle_error, service_unavailable},
};

#[derive(Debug, Default, Deserialize)]
pub struct ResizeParams {
    #[serde(rename = "async")]
    pub async_mode: Option<String>,
}

impl ResizeParams {
    /// Only the literal `true` selects asynchronous mode
    pub fn mode(&self) -> ResizeMode {
        match self.async_mode.as_deref() {
            Some("true") => ResizeMode::Async,
            _ => ResizeMode::Sync,
        }
    }
}

/// Resize a batch of source images and answer with one result per url
pub async fn resize_images(
    State(state): State<AppState>,
    Query(params): Query<ResizeParams>,
    body: Result<Json<ResizeRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "Rejected resize body");
            return bad_request("Failed to parse request");
        }
    };

    let mode = params.mode();
    let timeout = state.config.web.request_timeout;

    match tokio::time::timeout(timeout, state.pipeline.process(&request, mode)).await {
        Ok(Ok(results)) => created(results),
        Ok(Err(e)) => handle_error(e),
        Err(_) => {
            warn!(
                urls = request.urls.len(),
                timeout = ?timeout,
                "Resize request timed out"
            );
            service_unavailable("Request has timed out")
        }
    }
}
