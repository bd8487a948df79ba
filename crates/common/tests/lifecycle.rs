//! Integration tests for expiry, retention and size limits

mod common;

use std::time::Duration;

use ::common::prelude::*;

#[tokio::test]
async fn test_retention_sweep_releases_task_and_blob() {
    let env = common::setup_test_env().await;
    let retention = env.relay.config().retention;
    let receipt = common::upload(&env.relay, common::SECRET, b"short lived", None)
        .await
        .unwrap();

    env.clock.advance(retention - Duration::from_secs(1));
    assert!(env
        .relay
        .reissue_download_credential(common::SECRET, receipt.task_id)
        .await
        .is_ok());

    env.clock.advance(Duration::from_secs(2));
    assert!(matches!(
        env.relay
            .reissue_download_credential(common::SECRET, receipt.task_id)
            .await,
        Err(RelayError::NotFound)
    ));
    assert!(env.relay.tasks().is_empty());
    assert!(env.stored_files().is_empty());
}

#[tokio::test]
async fn test_download_after_retention_is_not_found() {
    let config = RelayConfig {
        retention: Duration::from_secs(60),
        download_credential_ttl: Duration::from_secs(600),
        ..Default::default()
    };
    let env = common::setup_with_config(config).await;
    let receipt = common::upload(&env.relay, common::SECRET, b"expired", None)
        .await
        .unwrap();

    env.clock.advance(Duration::from_secs(61));
    assert!(matches!(
        env.relay
            .download(receipt.download_credential.as_str(), None)
            .await,
        Err(RelayError::NotFound)
    ));
    assert!(env.stored_files().is_empty());
}

#[tokio::test]
async fn test_download_credential_expiry_boundary() {
    let env = common::setup_test_env().await;
    let ttl = env.relay.config().download_credential_ttl;
    let receipt = common::upload(&env.relay, common::SECRET, b"data", None)
        .await
        .unwrap();
    let late = env
        .relay
        .reissue_download_credential(common::SECRET, receipt.task_id)
        .await
        .unwrap();

    env.clock.advance(ttl - Duration::from_millis(1));
    let delivery = env
        .relay
        .download(receipt.download_credential.as_str(), None)
        .await
        .unwrap();
    drop(delivery);

    env.clock.advance(Duration::from_millis(1));
    assert!(matches!(
        env.relay.download(late.as_str(), None).await,
        Err(RelayError::Unauthorized)
    ));
}

#[tokio::test]
async fn test_upload_credential_expires() {
    let env = common::setup_test_env().await;
    let ttl = env.relay.config().upload_credential_ttl;
    let credential = env
        .relay
        .issue_upload_credential(common::SECRET, UploadMode::PerTask)
        .await
        .unwrap();

    env.clock.advance(ttl);
    assert!(matches!(
        common::upload(&env.relay, credential.as_str(), b"late", None).await,
        Err(RelayError::Unauthorized)
    ));
    assert!(env.stored_files().is_empty());
}

#[tokio::test]
async fn test_sweep_drops_expired_credentials() {
    let env = common::setup_test_env().await;
    env.relay
        .issue_upload_credential(common::SECRET, UploadMode::PerTask)
        .await
        .unwrap();
    common::upload(&env.relay, common::SECRET, b"x", None)
        .await
        .unwrap();
    assert_eq!(env.relay.credentials().len(), 2);

    env.clock.advance(env.relay.config().upload_credential_ttl);
    env.relay.sweep().await;
    assert!(env.relay.credentials().is_empty());
}

#[tokio::test]
async fn test_declared_oversize_writes_nothing() {
    let config = RelayConfig {
        max_upload_bytes: 16,
        ..Default::default()
    };
    let env = common::setup_with_config(config).await;

    let result = env
        .relay
        .upload(common::SECRET, Some(17), common::body(&[0u8; 17]), None)
        .await;
    assert!(matches!(
        result,
        Err(RelayError::PayloadTooLarge { limit: 16 })
    ));
    assert!(env.stored_files().is_empty());
    assert!(env.relay.tasks().is_empty());

    // exactly at the limit is fine
    assert!(common::upload(&env.relay, common::SECRET, &[1u8; 16], None)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_undeclared_oversize_is_cut_off() {
    let config = RelayConfig {
        max_upload_bytes: 16,
        ..Default::default()
    };
    let env = common::setup_with_config(config).await;

    let result = env
        .relay
        .upload(common::SECRET, None, common::body(&[0u8; 32]), None)
        .await;
    assert!(matches!(result, Err(RelayError::PayloadTooLarge { .. })));
    assert!(env.stored_files().is_empty());
}

#[tokio::test]
async fn test_keep_forever_lifetimes() {
    let forever = Duration::from_secs(u64::MAX);
    let config = RelayConfig {
        retention: forever,
        upload_credential_ttl: forever,
        download_credential_ttl: forever,
        ..Default::default()
    };
    let env = common::setup_with_config(config).await;

    let upload_token = env
        .relay
        .issue_upload_credential(common::SECRET, UploadMode::PerTask)
        .await
        .unwrap();
    let first = common::upload(&env.relay, upload_token.as_str(), b"one", None)
        .await
        .unwrap();
    let second = common::upload(&env.relay, common::SECRET, b"two", None)
        .await
        .unwrap();

    env.clock.advance(Duration::from_secs(10 * 365 * 24 * 3600));
    env.relay.sweep().await;
    assert_eq!(env.relay.tasks().len(), 2);

    let delivery = env
        .relay
        .download(first.download_credential.as_str(), Some(first.task_id))
        .await
        .unwrap();
    assert_eq!(common::read_all(delivery).await, b"one");
    assert!(env
        .relay
        .download(second.download_credential.as_str(), None)
        .await
        .is_ok());
}
