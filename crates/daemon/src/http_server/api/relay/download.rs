use axum::body::Body;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, StatusCode};
use reqwest::{Client, RequestBuilder, Url};

use common::prelude::{Delivery, RelayError, TaskId};

use super::{header_str, relay_error_response};
use crate::http_server::api::client::{ApiError, ApiRequest, ApiResponse};
use crate::http_server::{DECRYPTION_KEY_HEADER, DOWNLOAD_TOKEN_HEADER};
use crate::ServiceState;

/// Fetch a payload with a one-time download credential. Without a task id
/// the fixed endpoint is used and the credential decides the task.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub credential: String,
    pub task_id: Option<TaskId>,
}

/// A delivered payload and the key that was uploaded alongside it. The body
/// is read with [`DownloadResponse::chunk`] so it never has to sit in memory
/// whole.
#[derive(Debug)]
pub struct DownloadResponse {
    pub key: Option<String>,
    /// Length announced by the relay
    pub len: Option<u64>,
    response: reqwest::Response,
}

impl DownloadResponse {
    /// Next piece of the payload, `None` once it is complete.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, ApiError> {
        Ok(self.response.chunk().await?)
    }
}

/// `GET /download-file`
pub async fn fixed_handler(
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<Response, DownloadError> {
    let credential = header_str(&headers, DOWNLOAD_TOKEN_HEADER);
    let delivery = state.relay().download(credential, None).await?;
    Ok(delivery_response(delivery))
}

/// `GET /download-file/:task_id`
pub async fn handler(
    State(state): State<ServiceState>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, DownloadError> {
    // an id that can't exist can't match any credential binding
    let task_id = task_id
        .parse::<TaskId>()
        .map_err(|_| RelayError::Unauthorized)?;
    let credential = header_str(&headers, DOWNLOAD_TOKEN_HEADER);
    let delivery = state.relay().download(credential, Some(task_id)).await?;
    Ok(delivery_response(delivery))
}

fn delivery_response(delivery: Delivery) -> Response {
    let task_id = delivery.task_id();
    let len = delivery.len();
    let key = delivery
        .auxiliary_key()
        .and_then(|k| HeaderValue::from_str(k).ok());

    let mut response = Response::new(Body::from_stream(delivery));
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    if let Ok(disposition) =
        HeaderValue::from_str(&format!("attachment; filename=\"{}.bin\"", task_id))
    {
        headers.insert(CONTENT_DISPOSITION, disposition);
    }
    if let Some(key) = key {
        headers.insert(DECRYPTION_KEY_HEADER, key);
    }
    response
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl IntoResponse for DownloadError {
    fn into_response(self) -> Response {
        match self {
            DownloadError::Relay(err) => relay_error_response(err),
        }
    }
}

// Client implementation - builds request for this operation
impl ApiRequest for DownloadRequest {
    type Response = DownloadResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        let path = match self.task_id {
            Some(id) => format!("/download-file/{}", id),
            None => "/download-file".to_string(),
        };
        let full_url = base_url.join(&path).unwrap();
        client
            .get(full_url)
            .header(DOWNLOAD_TOKEN_HEADER, self.credential)
    }
}

#[async_trait::async_trait]
impl ApiResponse for DownloadResponse {
    async fn from_response(response: reqwest::Response) -> Result<Self, ApiError> {
        let key = response
            .headers()
            .get(DECRYPTION_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(Self {
            key,
            len: response.content_length(),
            response,
        })
    }
}
