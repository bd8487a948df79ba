use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use common::prelude::RelayConfig;

#[derive(Clone)]
pub struct Config {
    // relay configuration
    /// long-lived secret that authorizes uploads and credential issuance,
    ///  the service refuses to start without it
    pub upload_secret: Option<String>,
    /// directory the payload blobs are written to
    pub upload_dir: PathBuf,
    pub upload_token_ttl: Duration,
    pub download_token_ttl: Duration,
    /// how long an undelivered task is kept
    pub task_ttl: Duration,
    pub max_upload_bytes: u64,
    /// how often the background sweeper runs
    pub sweep_interval: Duration,

    // http server configuration
    pub listen_addr: SocketAddr,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// The subset of settings the relay core consumes.
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            upload_secret: self.upload_secret.clone(),
            upload_credential_ttl: self.upload_token_ttl,
            download_credential_ttl: self.download_token_ttl,
            retention: self.task_ttl,
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("upload_secret", &self.upload_secret.as_ref().map(|_| "<redacted>"))
            .field("upload_dir", &self.upload_dir)
            .field("upload_token_ttl", &self.upload_token_ttl)
            .field("download_token_ttl", &self.download_token_ttl)
            .field("task_ttl", &self.task_ttl)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("sweep_interval", &self.sweep_interval)
            .field("listen_addr", &self.listen_addr)
            .field("log_level", &self.log_level)
            .field("log_dir", &self.log_dir)
            .finish()
    }
}
