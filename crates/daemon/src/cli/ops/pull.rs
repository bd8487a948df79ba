use std::path::{Path, PathBuf};

use clap::Args;
use tokio::io::AsyncWriteExt;

use burnbox_daemon::http_server::api::client::ApiError;
use burnbox_daemon::http_server::api::relay::{DownloadRequest, DownloadResponse};
use common::prelude::TaskId;

/// Download a file once. The credential is spent even if writing the output
/// fails afterwards.
#[derive(Args, Debug, Clone)]
pub struct Pull {
    /// One-time download credential
    #[arg(long)]
    pub token: String,

    /// Task the credential was issued for; omit to let the credential decide
    #[arg(long)]
    pub task_id: Option<TaskId>,

    /// Where to write the payload
    #[arg(long, short)]
    pub output: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum PullError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("failed to write {0}: {1}")]
    Write(PathBuf, std::io::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Pull {
    type Error = PullError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let request = DownloadRequest {
            credential: self.token.clone(),
            task_id: self.task_id,
        };
        let mut response = ctx.client.call(request).await?;

        let written = match write_payload(&mut response, &self.output).await {
            Ok(written) => written,
            Err(e) => {
                // the credential is spent either way, don't leave half a file behind
                let _ = tokio::fs::remove_file(&self.output).await;
                return Err(e);
            }
        };

        let mut out = format!("wrote {} bytes to {}", written, self.output.display());
        if let Some(key) = response.key {
            out.push_str(&format!("\nkey: {}", key));
        }
        Ok(out)
    }
}

async fn write_payload(response: &mut DownloadResponse, path: &Path) -> Result<u64, PullError> {
    let write_err = |e: std::io::Error| PullError::Write(path.to_path_buf(), e);
    let mut file = tokio::fs::File::create(path).await.map_err(write_err)?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await.map_err(write_err)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(write_err)?;
    Ok(written)
}
