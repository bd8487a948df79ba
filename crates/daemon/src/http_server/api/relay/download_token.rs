use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, StatusCode};
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::prelude::{RelayError, TaskId};

use super::{header_str, relay_error_response};
use crate::http_server::api::client::ApiRequest;
use crate::http_server::UPLOAD_TOKEN_HEADER;
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTokenQuery {
    pub task_id: String,
}

/// Reissue a one-time download credential for a pending task, e.g. after the
/// original one was lost.
#[derive(Debug, Clone, clap::Args)]
pub struct DownloadTokenRequest {
    /// Long-lived upload secret
    #[arg(long, env = "UPLOAD_TOKEN", hide_env_values = true)]
    pub secret: String,

    /// Task to issue the credential for
    #[arg(long)]
    pub task_id: TaskId,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Query(query): Query<DownloadTokenQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, DownloadTokenError> {
    let relay = state.relay();
    let secret = header_str(&headers, UPLOAD_TOKEN_HEADER);

    let Ok(task_id) = query.task_id.parse::<TaskId>() else {
        // no such task can exist, but the caller still has to be authorized
        // to learn that
        relay.authorize_secret(secret)?;
        return Err(RelayError::NotFound.into());
    };

    let token = relay.reissue_download_credential(secret, task_id).await?;
    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        token.to_string(),
    ))
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadTokenError {
    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl IntoResponse for DownloadTokenError {
    fn into_response(self) -> Response {
        match self {
            DownloadTokenError::Relay(err) => relay_error_response(err),
        }
    }
}

// Client implementation - builds request for this operation
impl ApiRequest for DownloadTokenRequest {
    type Response = String;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        let full_url = base_url.join("/download-token").unwrap();
        client
            .post(full_url)
            .query(&DownloadTokenQuery {
                task_id: self.task_id.to_string(),
            })
            .header(UPLOAD_TOKEN_HEADER, self.secret)
    }
}
