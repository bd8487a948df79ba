use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use burnbox_daemon::{spawn_service, ServiceConfig};
use common::relay::{
    DEFAULT_DOWNLOAD_CREDENTIAL_TTL, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_RETENTION,
    DEFAULT_UPLOAD_CREDENTIAL_TTL,
};

#[derive(Args, Debug, Clone)]
pub struct Daemon {
    /// Long-lived secret that authorizes uploads and credential issuance
    #[arg(long, env = "UPLOAD_TOKEN", hide_env_values = true)]
    pub upload_token: Option<String>,

    /// Directory payloads are stored in
    #[arg(long, env = "UPLOAD_DIR", default_value = "/tmp")]
    pub upload_dir: PathBuf,

    /// Lifetime of a one-time upload credential, in seconds
    #[arg(long, env = "UPLOAD_TOKEN_TTL_SECONDS", default_value_t = DEFAULT_UPLOAD_CREDENTIAL_TTL.as_secs())]
    pub upload_token_ttl_seconds: u64,

    /// Lifetime of a one-time download credential, in seconds
    #[arg(long, env = "DOWNLOAD_TOKEN_TTL_SECONDS", default_value_t = DEFAULT_DOWNLOAD_CREDENTIAL_TTL.as_secs())]
    pub download_token_ttl_seconds: u64,

    /// How long an undelivered payload is kept, in seconds
    #[arg(long, env = "TASK_TTL_SECONDS", default_value_t = DEFAULT_RETENTION.as_secs())]
    pub task_ttl_seconds: u64,

    /// Largest accepted upload
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: u64,

    /// Interval of the background expiry sweep, in seconds
    #[arg(long, env = "SWEEP_INTERVAL_SECONDS", default_value_t = 60)]
    pub sweep_interval_seconds: u64,

    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8000")]
    pub listen_addr: SocketAddr,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: tracing::Level,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long, env = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("daemon failed: {0}")]
    Failed(String),
}

impl Daemon {
    fn service_config(&self) -> ServiceConfig {
        let upload_secret = self
            .upload_token
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        ServiceConfig {
            upload_secret,
            upload_dir: self.upload_dir.clone(),
            upload_token_ttl: Duration::from_secs(self.upload_token_ttl_seconds),
            download_token_ttl: Duration::from_secs(self.download_token_ttl_seconds),
            task_ttl: Duration::from_secs(self.task_ttl_seconds),
            max_upload_bytes: self.max_upload_bytes,
            // a zero period would make the interval panic
            sweep_interval: Duration::from_secs(self.sweep_interval_seconds.max(1)),
            listen_addr: self.listen_addr,
            log_level: self.log_level,
            log_dir: self.log_dir.clone(),
        }
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Daemon {
    type Error = DaemonError;
    type Output = String;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        spawn_service(&self.service_config()).await;
        Ok("daemon ended".to_string())
    }
}
