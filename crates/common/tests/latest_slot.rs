//! Integration tests for the overwrite-in-place latest slot

mod common;

use ::common::prelude::*;

async fn slot_credential(env: &common::TestEnv) -> Token {
    env.relay
        .issue_upload_credential(common::SECRET, UploadMode::LatestSlot)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_overwrite_keeps_only_newest() {
    let env = common::setup_test_env().await;

    let credential = slot_credential(&env).await;
    let a = common::upload(&env.relay, credential.as_str(), b"payload A", Some("ka"))
        .await
        .unwrap();
    let credential = slot_credential(&env).await;
    let b = common::upload(&env.relay, credential.as_str(), b"payload B", Some("kb"))
        .await
        .unwrap();
    assert_ne!(a.task_id, b.task_id);

    // A is gone along with every credential bound to it
    assert!(matches!(
        env.relay.download(a.download_credential.as_str(), None).await,
        Err(RelayError::Unauthorized)
    ));
    assert!(matches!(
        env.relay
            .reissue_download_credential(common::SECRET, a.task_id)
            .await,
        Err(RelayError::NotFound)
    ));

    let delivery = env
        .relay
        .download(b.download_credential.as_str(), Some(b.task_id))
        .await
        .unwrap();
    assert_eq!(delivery.auxiliary_key(), Some("kb"));
    assert_eq!(common::read_all(delivery).await, b"payload B");

    assert_eq!(env.relay.tasks().len(), 1);
    assert_eq!(env.stored_files(), vec!["latest"]);
}

#[tokio::test]
async fn test_slot_survives_delivery() {
    let env = common::setup_test_env().await;
    let credential = slot_credential(&env).await;
    let receipt = common::upload(&env.relay, credential.as_str(), b"sticky", None)
        .await
        .unwrap();

    let delivery = env
        .relay
        .download(receipt.download_credential.as_str(), None)
        .await
        .unwrap();
    assert_eq!(common::read_all(delivery).await, b"sticky");
    assert_eq!(env.worker.run_pending().await, 0);

    // the download credential was still single use
    assert!(matches!(
        env.relay
            .download(receipt.download_credential.as_str(), None)
            .await,
        Err(RelayError::Unauthorized)
    ));

    let again = env
        .relay
        .reissue_download_credential(common::SECRET, receipt.task_id)
        .await
        .unwrap();
    let delivery = env.relay.download(again.as_str(), None).await.unwrap();
    assert_eq!(delivery.auxiliary_key(), None);
    assert_eq!(common::read_all(delivery).await, b"sticky");
}

#[tokio::test]
async fn test_keyless_upload_clears_previous_key() {
    let env = common::setup_test_env().await;
    let credential = slot_credential(&env).await;
    common::upload(&env.relay, credential.as_str(), b"one", Some("old-key"))
        .await
        .unwrap();
    let credential = slot_credential(&env).await;
    let receipt = common::upload(&env.relay, credential.as_str(), b"two", None)
        .await
        .unwrap();

    let delivery = env
        .relay
        .download(receipt.download_credential.as_str(), None)
        .await
        .unwrap();
    assert_eq!(delivery.auxiliary_key(), None);
    assert_eq!(env.stored_files(), vec!["latest"]);
}

#[tokio::test]
async fn test_abandoned_overwrite_leaves_previous_intact() {
    let env = common::setup_test_env().await;
    let credential = slot_credential(&env).await;
    let committed = common::upload(&env.relay, credential.as_str(), b"committed", Some("k"))
        .await
        .unwrap();

    let credential = slot_credential(&env).await;
    let mut session = env
        .relay
        .begin_upload(credential.as_str(), None)
        .await
        .unwrap();
    assert_eq!(session.mode(), UploadMode::LatestSlot);
    session.write(b"half of a new pay").await.unwrap();
    assert_eq!(env.stored_files().len(), 2);
    drop(session);

    assert_eq!(env.stored_files(), vec!["latest"]);
    assert_eq!(env.relay.tasks().current_slot(), Some(committed.task_id));

    let delivery = env
        .relay
        .download(committed.download_credential.as_str(), None)
        .await
        .unwrap();
    assert_eq!(delivery.auxiliary_key(), Some("k"));
    assert_eq!(common::read_all(delivery).await, b"committed");
}

#[tokio::test]
async fn test_reader_keeps_old_content_across_overwrite() {
    let env = common::setup_test_env().await;
    let credential = slot_credential(&env).await;
    let first = common::upload(&env.relay, credential.as_str(), b"first", Some("k1"))
        .await
        .unwrap();

    let delivery = env
        .relay
        .download(first.download_credential.as_str(), None)
        .await
        .unwrap();

    let credential = slot_credential(&env).await;
    common::upload(&env.relay, credential.as_str(), b"second", Some("k2"))
        .await
        .unwrap();

    // the open delivery still pairs the old key with the old bytes
    assert_eq!(delivery.auxiliary_key(), Some("k1"));
    assert_eq!(common::read_all(delivery).await, b"first");
}

#[tokio::test]
async fn test_secret_uploads_never_touch_the_slot() {
    let env = common::setup_test_env().await;
    let credential = slot_credential(&env).await;
    let slot = common::upload(&env.relay, credential.as_str(), b"slot", None)
        .await
        .unwrap();
    let task = common::upload(&env.relay, common::SECRET, b"task", None)
        .await
        .unwrap();

    assert_eq!(env.relay.tasks().current_slot(), Some(slot.task_id));
    assert_eq!(env.relay.tasks().len(), 2);
    assert!(env
        .stored_files()
        .contains(&format!("{}.bin", task.task_id)));
}
