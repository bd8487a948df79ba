use std::path::PathBuf;

use clap::Args;

use burnbox_daemon::http_server::api::client::ApiError;
use burnbox_daemon::http_server::api::relay::{UploadReceipt, UploadRequest};

/// Upload a file. Prints `task_id|download_token`.
#[derive(Args, Debug, Clone)]
pub struct Push {
    /// File to upload
    pub path: PathBuf,

    /// Upload secret or a one-time upload credential
    #[arg(long, env = "UPLOAD_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Key handed back to whoever downloads the file
    #[arg(long)]
    pub key: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, std::io::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Push {
    type Error = PushError;
    type Output = UploadReceipt;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| PushError::Read(self.path.clone(), e))?;
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());

        let request =
            UploadRequest::from_file(self.token.clone(), file_name, file, self.key.clone())
                .await
                .map_err(|e| PushError::Read(self.path.clone(), e))?;
        Ok(ctx.client.call(request).await?)
    }
}
