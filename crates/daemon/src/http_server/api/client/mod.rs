#[allow(clippy::module_inception)]
mod client;
mod error;

pub use client::ApiClient;
pub use error::ApiError;

use reqwest::{Client, RequestBuilder, Response, Url};

pub trait ApiRequest {
    type Response: ApiResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder;
}

/// Decoding of a successful response. The relay answers in plain text or raw
/// bytes rather than JSON, so each response type reads the body itself.
#[async_trait::async_trait]
pub trait ApiResponse: Sized {
    async fn from_response(response: Response) -> Result<Self, ApiError>;
}

#[async_trait::async_trait]
impl ApiResponse for String {
    async fn from_response(response: Response) -> Result<Self, ApiError> {
        Ok(response.text().await?.trim().to_string())
    }
}
