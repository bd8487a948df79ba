use clap::Args;

use common::build_info;

/// Print this binary's build and, if one answers at `--remote`, the relay's.
#[derive(Args, Debug, Clone)]
pub struct Version {
    /// Only report the local build
    #[arg(long)]
    pub local: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("Version operation failed: {0}")]
    Failed(String),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Version {
    type Error = VersionError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut out = format!("burnbox\n{}", build_info!());
        if self.local {
            return Ok(out);
        }

        let base = ctx.client.base_url();
        let url = format!("{}/_status/version", base.as_str().trim_end_matches('/'));
        let remote = match ctx.client.http_client().get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v.get("version").and_then(|v| v.as_str()).map(str::to_string))
                .unwrap_or_else(|| "unknown".to_string()),
            Ok(resp) => format!("unavailable ({})", resp.status()),
            Err(_) => "not reachable".to_string(),
        };
        out.push_str(&format!("\n\nrelay ({}): {}", base, remote));
        Ok(out)
    }
}
