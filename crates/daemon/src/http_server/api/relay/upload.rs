use std::fmt;

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::response::{IntoResponse, Response};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Url};

use common::prelude::{RelayError, TaskId};

use super::{header_str, relay_error_response};
use crate::http_server::api::client::{ApiError, ApiRequest, ApiResponse};
use crate::http_server::UPLOAD_TOKEN_HEADER;
use crate::ServiceState;

/// Upload a payload. `credential` is the long-lived secret or a one-time
/// upload credential. The body is streamed; `len` must be its exact length so
/// the request carries a Content-Length the relay can check up front.
#[derive(Debug)]
pub struct UploadRequest {
    pub credential: String,
    pub file_name: String,
    pub body: reqwest::Body,
    pub len: u64,
    pub key: Option<String>,
}

impl UploadRequest {
    /// Stream an open file as the payload.
    pub async fn from_file(
        credential: String,
        file_name: String,
        file: tokio::fs::File,
        key: Option<String>,
    ) -> std::io::Result<Self> {
        let len = file.metadata().await?.len();
        Ok(Self {
            credential,
            file_name,
            body: reqwest::Body::from(file),
            len,
            key,
        })
    }
}

/// Parsed `task_id|download_credential` answer.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub task_id: TaskId,
    pub download_token: String,
}

impl fmt::Display for UploadReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.task_id, self.download_token)
    }
}

/// Stream the `file` field straight into a staged blob.
///
/// The credential is redeemed before the body is read. The optional `key`
/// field may come before or after `file`; it is attached when the upload is
/// committed.
pub async fn handler(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, UploadError> {
    let relay = state.relay();
    let limit = relay.config().max_upload_bytes;
    let credential = header_str(&headers, UPLOAD_TOKEN_HEADER);
    let declared_len = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let mut session = relay.begin_upload(credential, declared_len).await?;
    let mut key: Option<String> = None;
    let mut saw_file = false;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadError::from_multipart(e, limit))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "file" => {
                if saw_file {
                    return Err(UploadError::InvalidForm("more than one file field".into()));
                }
                saw_file = true;
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| UploadError::from_multipart(e, limit))?
                {
                    session.write(&chunk).await?;
                }
            }
            "key" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| UploadError::from_multipart(e, limit))?;
                key = parse_key(text)?;
            }
            _ => {
                tracing::warn!("Ignoring unknown field: {}", field_name);
            }
        }
    }

    if !saw_file {
        return Err(UploadError::InvalidForm("file field is required".into()));
    }

    let receipt = session.finish(key).await?;
    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        receipt.to_string(),
    ))
}

/// The key is handed back verbatim in a response header, so it has to
/// survive header parsing byte for byte: printable ASCII, no leading or
/// trailing whitespace. Empty means no key.
fn parse_key(text: String) -> Result<Option<String>, UploadError> {
    if text.is_empty() {
        return Ok(None);
    }
    let printable = text.bytes().all(|b| (0x20..0x7f).contains(&b));
    if !printable || text.trim() != text {
        return Err(UploadError::InvalidKey);
    }
    Ok(Some(text))
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Invalid form: {0}")]
    InvalidForm(String),
    #[error("key must be printable ASCII without surrounding whitespace")]
    InvalidKey,
    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl UploadError {
    fn from_multipart(err: MultipartError, limit: u64) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return UploadError::Relay(RelayError::PayloadTooLarge { limit });
        }
        tracing::debug!("multipart error: {}", err);
        UploadError::InvalidForm(err.body_text())
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        match self {
            UploadError::InvalidForm(msg) => {
                (StatusCode::BAD_REQUEST, format!("Bad request: {}", msg)).into_response()
            }
            UploadError::InvalidKey => (
                StatusCode::BAD_REQUEST,
                "Bad request: key must be printable ASCII without surrounding whitespace",
            )
                .into_response(),
            UploadError::Relay(err) => relay_error_response(err),
        }
    }
}

// Client implementation - builds request for this operation
impl ApiRequest for UploadRequest {
    type Response = UploadReceipt;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        let full_url = base_url.join("/upload").unwrap();
        let part = Part::stream_with_length(self.body, self.len).file_name(self.file_name);
        let mut form = Form::new().part("file", part);
        if let Some(key) = self.key {
            form = form.text("key", key);
        }
        client
            .post(full_url)
            .header(UPLOAD_TOKEN_HEADER, self.credential)
            .multipart(form)
    }
}

#[async_trait::async_trait]
impl ApiResponse for UploadReceipt {
    async fn from_response(response: reqwest::Response) -> Result<Self, ApiError> {
        let body = response.text().await?;
        let (task_id, download_token) = body
            .trim()
            .split_once('|')
            .ok_or_else(|| ApiError::Malformed(body.clone()))?;
        let task_id = task_id
            .parse()
            .map_err(|_| ApiError::Malformed(body.clone()))?;
        Ok(Self {
            task_id,
            download_token: download_token.to_string(),
        })
    }
}
