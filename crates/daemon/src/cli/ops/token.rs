use clap::Args;

use burnbox_daemon::http_server::api::client::ApiError;
use burnbox_daemon::http_server::api::relay::UploadTokenRequest;

/// Mint a one-time upload credential
#[derive(Args, Debug, Clone)]
pub struct Token {
    #[command(flatten)]
    pub request: UploadTokenRequest,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Token {
    type Error = TokenError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        Ok(ctx.client.call(self.request.clone()).await?)
    }
}
