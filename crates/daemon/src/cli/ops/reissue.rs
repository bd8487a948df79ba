use clap::Args;

use burnbox_daemon::http_server::api::client::ApiError;
use burnbox_daemon::http_server::api::relay::DownloadTokenRequest;

/// Issue a fresh download credential for a task that is still pending
#[derive(Args, Debug, Clone)]
pub struct Reissue {
    #[command(flatten)]
    pub request: DownloadTokenRequest,
}

#[derive(Debug, thiserror::Error)]
pub enum ReissueError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Reissue {
    type Error = ReissueError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        Ok(ctx.client.call(self.request.clone()).await?)
    }
}
