//! The relay's public routes. Paths and headers are the ones existing
//! clients already speak.

use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use http::{HeaderMap, StatusCode};

use common::prelude::RelayError;

pub mod download;
pub mod download_token;
pub mod health;
pub mod upload;
pub mod upload_token;

pub use download::{DownloadRequest, DownloadResponse};
pub use download_token::DownloadTokenRequest;
pub use upload::{UploadReceipt, UploadRequest};
pub use upload_token::{UploadTokenMode, UploadTokenRequest};

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/upload", post(upload::handler))
        .route("/upload-token", post(upload_token::handler))
        .route("/download-token", post(download_token::handler))
        .route("/download-file", get(download::fixed_handler))
        .route("/download-file/:task_id", get(download::handler))
        .route("/health", get(health::handler))
        .with_state(state)
}

/// A header as a string, empty when missing or not valid text.
pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or("")
}

/// Map a relay failure to a response. Nothing about why a credential was
/// refused or whether a task ever existed leaks into the body.
pub(crate) fn relay_error_response(err: RelayError) -> Response {
    match err {
        RelayError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
        RelayError::NotFound => (StatusCode::NOT_FOUND, "Not found").into_response(),
        RelayError::PayloadTooLarge { .. } => {
            (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large").into_response()
        }
        RelayError::Interrupted(msg) => {
            tracing::info!("upload interrupted: {}", msg);
            (StatusCode::BAD_REQUEST, "Upload interrupted").into_response()
        }
        err @ (RelayError::Configuration | RelayError::Storage(_)) => {
            tracing::error!("relay failure: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "Unexpected error").into_response()
        }
    }
}
