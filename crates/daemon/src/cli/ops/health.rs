use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct Health;

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("Health check failed: {0}")]
    Failed(String),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Health {
    type Error = HealthError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let base = ctx.client.base_url();
        let client = ctx.client.http_client();
        let root = base.as_str().trim_end_matches('/');

        let mut lines = vec![format!("Daemon ({}):", base)];
        for (label, path) in [
            ("health", "/health"),
            ("livez ", "/_status/livez"),
            ("readyz", "/_status/readyz"),
        ] {
            let line = match client.get(format!("{}{}", root, path)).send().await {
                Ok(resp) if resp.status().is_success() => format!("  {}:  OK", label),
                Ok(resp) => format!("  {}:  UNHEALTHY ({})", label, resp.status()),
                Err(_) => format!("  {}:  NOT REACHABLE", label),
            };
            lines.push(line);
        }

        Ok(lines.join("\n"))
    }
}
