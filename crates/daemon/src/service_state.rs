use std::sync::Arc;

use common::prelude::{BlobStore, BlobStoreError, BurnWorker, Relay, SystemClock};

use crate::ServiceConfig;

/// Shared state handed to every request handler.
#[derive(Clone, Debug)]
pub struct State {
    relay: Relay,
}

impl State {
    /// Build the relay from config. The burn worker is returned separately so
    /// the caller decides where it runs.
    pub async fn from_config(config: &ServiceConfig) -> Result<(Self, BurnWorker), StateSetupError> {
        match config.upload_secret.as_deref() {
            Some(secret) if !secret.trim().is_empty() => {}
            _ => return Err(StateSetupError::MissingSecret),
        }

        let blobs = BlobStore::new(&config.upload_dir).await?;
        tracing::info!(dir = %config.upload_dir.display(), "blob store opened");

        let (relay, worker) = Relay::new(config.relay_config(), blobs, Arc::new(SystemClock));
        Ok((Self { relay }, worker))
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }
}

impl From<Relay> for State {
    fn from(relay: Relay) -> Self {
        Self { relay }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("UPLOAD_TOKEN is not set, refusing to start")]
    MissingSecret,
    #[error("failed to open the upload directory: {0}")]
    BlobStore(#[from] BlobStoreError),
}
