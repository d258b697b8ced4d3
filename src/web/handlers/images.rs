//! `GET /v1/image/{file}`

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};

use crate::errors::AppError;
use crate::services::ImageHandle;
use crate::web::{AppState, responses::handle_error};

/// Serve a cached image by its handle file name (`<fingerprint>.jpeg`)
pub async fn get_image(State(state): State<AppState>, Path(file): Path<String>) -> Response {
    let Some(handle) = ImageHandle::from_file_name(&file) else {
        return handle_error(AppError::not_found("image", file));
    };

    match state.pipeline.get(&handle).await {
        Some(data) => ([(header::CONTENT_TYPE, "image/jpeg")], data).into_response(),
        None => handle_error(AppError::not_found("image", file)),
    }
}
