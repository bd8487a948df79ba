use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, StatusCode};
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::prelude::{RelayError, UploadMode};

use super::{header_str, relay_error_response};
use crate::http_server::api::client::ApiRequest;
use crate::http_server::UPLOAD_TOKEN_HEADER;
use crate::ServiceState;

/// Which kind of upload a one-time credential grants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UploadTokenMode {
    /// a fresh task, burned after its one download
    #[default]
    Task,
    /// overwrite the shared latest slot
    Latest,
}

impl From<UploadTokenMode> for UploadMode {
    fn from(mode: UploadTokenMode) -> Self {
        match mode {
            UploadTokenMode::Task => UploadMode::PerTask,
            UploadTokenMode::Latest => UploadMode::LatestSlot,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadTokenQuery {
    #[serde(default)]
    pub mode: UploadTokenMode,
}

/// Ask for a one-time upload credential.
#[derive(Debug, Clone, clap::Args)]
pub struct UploadTokenRequest {
    /// Long-lived upload secret
    #[arg(long, env = "UPLOAD_TOKEN", hide_env_values = true)]
    pub secret: String,

    /// Upload mode the credential grants
    #[arg(long, value_enum, default_value_t = UploadTokenMode::Task)]
    pub mode: UploadTokenMode,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Query(query): Query<UploadTokenQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, UploadTokenError> {
    let secret = header_str(&headers, UPLOAD_TOKEN_HEADER);
    let token = state
        .relay()
        .issue_upload_credential(secret, query.mode.into())
        .await?;

    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        token.to_string(),
    ))
}

#[derive(Debug, thiserror::Error)]
pub enum UploadTokenError {
    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl IntoResponse for UploadTokenError {
    fn into_response(self) -> Response {
        match self {
            UploadTokenError::Relay(err) => relay_error_response(err),
        }
    }
}

// Client implementation - builds request for this operation
impl ApiRequest for UploadTokenRequest {
    type Response = String;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        let full_url = base_url.join("/upload-token").unwrap();
        client
            .post(full_url)
            .query(&UploadTokenQuery { mode: self.mode })
            .header(UPLOAD_TOKEN_HEADER, self.secret)
    }
}
