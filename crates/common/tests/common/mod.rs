//! Shared test utilities for relay integration tests
#![allow(dead_code)]

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use tempfile::TempDir;

use common::prelude::*;

pub const SECRET: &str = "integration-secret";

pub struct TestEnv {
    pub relay: Relay,
    pub worker: BurnWorker,
    pub clock: ManualClock,
    pub dir: TempDir,
}

impl TestEnv {
    pub fn blobs(&self) -> &BlobStore {
        self.relay.tasks().blobs()
    }

    /// Every file in the blob directory, staging files included
    pub fn stored_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.blobs().root())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

/// Set up a relay over a fresh temp directory with a manual clock
pub async fn setup_test_env() -> TestEnv {
    setup_with_config(RelayConfig::default()).await
}

pub async fn setup_with_config(config: RelayConfig) -> TestEnv {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    let blobs = BlobStore::new(dir.path().join("blobs")).await.unwrap();
    let config = RelayConfig {
        upload_secret: Some(SECRET.to_string()),
        ..config
    };
    let (relay, worker) = Relay::new(config, blobs, Arc::new(clock.clone()));
    TestEnv {
        relay,
        worker,
        clock,
        dir,
    }
}

/// Single-chunk body stream
pub fn body(data: &[u8]) -> impl futures::Stream<Item = Result<Bytes, io::Error>> + Unpin {
    futures::stream::iter(vec![Ok(Bytes::copy_from_slice(data))])
}

/// Upload `data` with `credential`, returning the receipt
pub async fn upload(
    relay: &Relay,
    credential: &str,
    data: &[u8],
    key: Option<&str>,
) -> Result<Receipt, RelayError> {
    relay
        .upload(
            credential,
            Some(data.len() as u64),
            body(data),
            key.map(str::to_string),
        )
        .await
}

/// Drain a delivery into memory
pub async fn read_all(delivery: Delivery) -> Vec<u8> {
    delivery
        .try_fold(Vec::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await
        .unwrap()
}
