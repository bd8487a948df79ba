//! The relay service: upload, credential issuance and one-shot delivery.
//!
//! A [`Relay`] owns the credential and task registries and is the only thing
//! transports talk to. It is cheap to clone and safe to share between
//! request handlers.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::oneshot;

use crate::blob_store::{BlobStore, StagedBlob};
use crate::burn::{BurnDispatcher, BurnWorker};
use crate::clock::SharedClock;
use crate::credentials::{CredentialRegistry, UploadMode};
use crate::error::RelayError;
use crate::tasks::{TaskId, TaskRegistry};
use crate::token::{secret_matches, Token};

/// Size of the chunks a [`Delivery`] yields
pub const CHUNK_SIZE: usize = 64 * 1024;

pub const DEFAULT_UPLOAD_CREDENTIAL_TTL: Duration = Duration::from_secs(600);
pub const DEFAULT_DOWNLOAD_CREDENTIAL_TTL: Duration = Duration::from_secs(180);
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 60 * 1024 * 1024;

/// Immutable settings the relay is built with.
#[derive(Clone)]
pub struct RelayConfig {
    /// Long-lived secret. Without it the relay refuses every operation.
    pub upload_secret: Option<String>,
    pub upload_credential_ttl: Duration,
    pub download_credential_ttl: Duration,
    /// How long a task may wait for its download
    pub retention: Duration,
    pub max_upload_bytes: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            upload_secret: None,
            upload_credential_ttl: DEFAULT_UPLOAD_CREDENTIAL_TTL,
            download_credential_ttl: DEFAULT_DOWNLOAD_CREDENTIAL_TTL,
            retention: DEFAULT_RETENTION,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("upload_secret", &self.upload_secret.as_ref().map(|_| "<redacted>"))
            .field("upload_credential_ttl", &self.upload_credential_ttl)
            .field("download_credential_ttl", &self.download_credential_ttl)
            .field("retention", &self.retention)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

/// What a successful upload hands back to the sender.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub task_id: TaskId,
    pub download_credential: Token,
}

impl fmt::Display for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.task_id, self.download_credential)
    }
}

struct Inner {
    config: RelayConfig,
    credentials: CredentialRegistry,
    tasks: TaskRegistry,
    burns: BurnDispatcher,
}

#[derive(Clone)]
pub struct Relay {
    inner: Arc<Inner>,
}

impl Relay {
    /// Build a relay over `blobs`. The returned worker must be run for
    /// delivered tasks to be burned.
    pub fn new(config: RelayConfig, blobs: BlobStore, clock: SharedClock) -> (Self, BurnWorker) {
        let (burns, rx) = BurnDispatcher::new();
        let relay = Self {
            inner: Arc::new(Inner {
                config,
                credentials: CredentialRegistry::new(clock.clone()),
                tasks: TaskRegistry::new(clock, blobs),
                burns,
            }),
        };
        let worker = BurnWorker::new(relay.clone(), rx);
        (relay, worker)
    }

    pub fn config(&self) -> &RelayConfig {
        &self.inner.config
    }

    pub fn credentials(&self) -> &CredentialRegistry {
        &self.inner.credentials
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.inner.tasks
    }

    pub(crate) fn burns(&self) -> &BurnDispatcher {
        &self.inner.burns
    }

    fn configured_secret(&self) -> Result<&str, RelayError> {
        match self.inner.config.upload_secret.as_deref() {
            Some(secret) if !secret.is_empty() => Ok(secret),
            _ => {
                tracing::error!("refusing request, upload secret is not configured");
                Err(RelayError::Configuration)
            }
        }
    }

    /// Check `presented` against the long-lived secret.
    pub fn authorize_secret(&self, presented: &str) -> Result<(), RelayError> {
        let secret = self.configured_secret()?;
        if presented.is_empty() || !secret_matches(secret, presented) {
            return Err(RelayError::Unauthorized);
        }
        Ok(())
    }

    /// Drop expired credentials and retention-expired tasks.
    pub async fn sweep(&self) {
        let credentials = self.inner.credentials.sweep_expired();
        let swept = self.inner.tasks.sweep_expired(self.inner.config.retention).await;
        for id in swept.ids() {
            self.inner.credentials.revoke_task(id);
        }
        let tasks = swept.removed.len() + swept.failed.len();
        for failure in swept.failed {
            tracing::warn!(error = %failure, "retention sweep could not delete blob");
            self.inner
                .burns
                .retry_delete(failure.task.storage_handle, 1);
        }
        if credentials > 0 || tasks > 0 {
            tracing::debug!(credentials, tasks, "swept expired entries");
        }
    }

    /// Issue a one-time upload credential. Requires the long-lived secret.
    pub async fn issue_upload_credential(
        &self,
        secret: &str,
        mode: UploadMode,
    ) -> Result<Token, RelayError> {
        self.authorize_secret(secret)?;
        self.sweep().await;
        let token = self
            .inner
            .credentials
            .issue_upload(self.inner.config.upload_credential_ttl, mode);
        tracing::info!(?mode, "issued upload credential");
        Ok(token)
    }

    /// Authorize an upload and open a staged blob for its body.
    ///
    /// `credential` is either the long-lived secret, which grants a per-task
    /// upload, or a one-time upload credential, which is redeemed here before
    /// anything is written. `declared_len` is checked against the size limit
    /// after redemption.
    pub async fn begin_upload(
        &self,
        credential: &str,
        declared_len: Option<u64>,
    ) -> Result<UploadSession, RelayError> {
        let secret = self.configured_secret()?;
        if credential.is_empty() {
            return Err(RelayError::Unauthorized);
        }

        let mode = if secret_matches(secret, credential) {
            UploadMode::PerTask
        } else {
            self.inner
                .credentials
                .redeem_upload(&Token::from(credential))
                .map_err(|e| {
                    tracing::debug!(reason = %e, "upload credential rejected");
                    RelayError::Unauthorized
                })?
        };

        self.sweep().await;

        let limit = self.inner.config.max_upload_bytes;
        if declared_len.is_some_and(|len| len > limit) {
            tracing::info!(?declared_len, limit, "rejecting oversized upload");
            return Err(RelayError::PayloadTooLarge { limit });
        }

        let staged = self.inner.tasks.blobs().stage().await?;
        Ok(UploadSession {
            relay: self.clone(),
            mode,
            staged,
            limit,
        })
    }

    /// Upload a whole body stream in one call.
    pub async fn upload<S, E>(
        &self,
        credential: &str,
        declared_len: Option<u64>,
        mut body: S,
        auxiliary_key: Option<String>,
    ) -> Result<Receipt, RelayError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: fmt::Display,
    {
        let mut session = self.begin_upload(credential, declared_len).await?;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| RelayError::Interrupted(e.to_string()))?;
            session.write(&chunk).await?;
        }
        session.finish(auxiliary_key).await
    }

    /// Issue a fresh download credential for an existing task. Requires the
    /// long-lived secret.
    pub async fn reissue_download_credential(
        &self,
        secret: &str,
        task_id: TaskId,
    ) -> Result<Token, RelayError> {
        self.authorize_secret(secret)?;
        self.sweep().await;

        let task = self.inner.tasks.get(task_id).ok_or(RelayError::NotFound)?;
        if !self.inner.tasks.blob_exists(&task).await? {
            tracing::warn!(%task_id, "task blob is missing, discarding record");
            self.destroy_task(task_id).await;
            return Err(RelayError::NotFound);
        }

        let token = self
            .inner
            .credentials
            .issue_download(task_id, self.inner.config.download_credential_ttl);
        tracing::info!(%task_id, "reissued download credential");
        Ok(token)
    }

    /// Redeem a download credential and open the task's blob for streaming.
    ///
    /// With `expected` set the credential must be bound to that task;
    /// otherwise the task is the one the credential is bound to.
    pub async fn download(
        &self,
        credential: &str,
        expected: Option<TaskId>,
    ) -> Result<Delivery, RelayError> {
        self.configured_secret()?;
        if credential.is_empty() {
            return Err(RelayError::Unauthorized);
        }

        let task_id = self
            .inner
            .credentials
            .redeem_download(&Token::from(credential), expected)
            .map_err(|e| {
                tracing::debug!(reason = %e, "download credential rejected");
                RelayError::Unauthorized
            })?;

        self.sweep().await;

        let task = self.inner.tasks.get(task_id).ok_or(RelayError::NotFound)?;
        let Some(reader) = self.inner.tasks.open(&task).await? else {
            tracing::warn!(%task_id, "task blob is missing, discarding record");
            self.destroy_task(task_id).await;
            return Err(RelayError::NotFound);
        };

        tracing::info!(%task_id, len = reader.len, burn = task.burn_on_delivery, "delivering task");
        let burn = task.burn_on_delivery.then(|| BurnTicket {
            burns: self.inner.burns.clone(),
            task_id,
        });
        let mut delivery = Delivery {
            task_id,
            auxiliary_key: task.auxiliary_key,
            len: reader.len,
            sent: 0,
            file: reader.file,
            buf: vec![0u8; CHUNK_SIZE].into_boxed_slice(),
            burn,
            done: false,
        };
        // an empty payload is handed off as soon as the headers are, and a
        // transport may never poll a zero-length body at all
        if delivery.is_empty() {
            delivery.fire_burn();
        }
        Ok(delivery)
    }

    /// Revoke a task's credentials and destroy it. Blob deletion failures
    /// are queued for retry rather than returned.
    pub async fn destroy_task(&self, task_id: TaskId) {
        self.inner.credentials.revoke_task(task_id);
        match self.inner.tasks.destroy(task_id).await {
            Ok(Some(_)) => tracing::info!(%task_id, "task destroyed"),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "task destroyed, blob deletion will be retried");
                self.inner.burns.retry_delete(e.task.storage_handle, 1);
            }
        }
    }
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("config", &self.inner.config)
            .field("credentials", &self.inner.credentials)
            .field("tasks", &self.inner.tasks)
            .finish()
    }
}

/// An authorized upload whose body is being written.
///
/// Dropping the session before [`finish`](Self::finish) discards everything
/// written so far; no task is created.
#[derive(Debug)]
pub struct UploadSession {
    relay: Relay,
    mode: UploadMode,
    staged: StagedBlob,
    limit: u64,
}

impl UploadSession {
    pub fn mode(&self) -> UploadMode {
        self.mode
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.staged.len()
    }

    /// Append a chunk of the body, enforcing the size limit on the running
    /// total.
    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), RelayError> {
        if self.staged.len() + chunk.len() as u64 > self.limit {
            tracing::info!(limit = self.limit, "upload body exceeded the size limit");
            return Err(RelayError::PayloadTooLarge { limit: self.limit });
        }
        self.staged.write(chunk).await?;
        Ok(())
    }

    /// Commit the body and make it available for exactly one download.
    ///
    /// The commit runs on its own task. If this future is dropped once the
    /// commit has started, the task it produced is destroyed again.
    pub async fn finish(self, auxiliary_key: Option<String>) -> Result<Receipt, RelayError> {
        let Self {
            relay,
            mode,
            staged,
            ..
        } = self;

        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let result = relay.commit_upload(mode, staged, auxiliary_key).await;
            if let Err(Ok(receipt)) = tx.send(result) {
                tracing::info!(task_id = %receipt.task_id, "upload abandoned during commit, discarding");
                relay.destroy_task(receipt.task_id).await;
            }
        });

        rx.await
            .map_err(|_| RelayError::Interrupted("upload commit did not complete".into()))?
    }
}

impl Relay {
    async fn commit_upload(
        &self,
        mode: UploadMode,
        staged: StagedBlob,
        auxiliary_key: Option<String>,
    ) -> Result<Receipt, RelayError> {
        let inner = &self.inner;

        let task_id = match mode {
            UploadMode::PerTask => {
                let task_id = TaskId::new();
                let size = inner
                    .tasks
                    .blobs()
                    .commit(staged, &task_id.storage_handle())
                    .await?;
                inner.tasks.create(task_id, true, auxiliary_key, size);
                tracing::info!(%task_id, size, "stored task");
                task_id
            }
            UploadMode::LatestSlot => {
                let (task_id, superseded) = inner.tasks.commit_slot(staged, auxiliary_key).await?;
                if let Some(previous) = superseded {
                    inner.credentials.revoke_task(previous.id);
                    tracing::info!(previous = %previous.id, "latest slot superseded");
                }
                tracing::info!(%task_id, "stored latest slot");
                task_id
            }
        };

        let download_credential = inner
            .credentials
            .issue_download(task_id, inner.config.download_credential_ttl);
        Ok(Receipt {
            task_id,
            download_credential,
        })
    }
}

struct BurnTicket {
    burns: BurnDispatcher,
    task_id: TaskId,
}

impl BurnTicket {
    fn fire(self) {
        if let Err(e) = self.burns.dispatch_burn(self.task_id) {
            tracing::error!(task_id = %self.task_id, error = %e, "failed to queue burn");
        }
    }
}

/// A task's payload on its way to the receiver.
///
/// Yields the blob in [`CHUNK_SIZE`] pieces. A burn-on-delivery task is
/// queued for destruction once the last byte of the blob has been yielded,
/// or the end of the file is reached, whichever comes first. Transports that
/// know the length stop polling after the last byte, so waiting for the end
/// of the stream alone is not enough. A delivery dropped before that burns
/// nothing.
pub struct Delivery {
    task_id: TaskId,
    auxiliary_key: Option<String>,
    len: u64,
    sent: u64,
    file: tokio::fs::File,
    buf: Box<[u8]>,
    burn: Option<BurnTicket>,
    done: bool,
}

impl Delivery {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn auxiliary_key(&self) -> Option<&str> {
        self.auxiliary_key.as_deref()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn fire_burn(&mut self) {
        if let Some(ticket) = self.burn.take() {
            ticket.fire();
        }
    }
}

impl Stream for Delivery {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        let mut read_buf = ReadBuf::new(&mut this.buf);
        match Pin::new(&mut this.file).poll_read(cx, &mut read_buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => {
                this.done = true;
                tracing::warn!(task_id = %this.task_id, error = %e, "delivery read failed");
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(Ok(())) if read_buf.filled().is_empty() => {
                this.done = true;
                this.fire_burn();
                Poll::Ready(None)
            }
            Poll::Ready(Ok(())) => {
                let chunk = Bytes::copy_from_slice(read_buf.filled());
                this.sent += chunk.len() as u64;
                if this.sent >= this.len {
                    this.fire_burn();
                }
                Poll::Ready(Some(Ok(chunk)))
            }
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("task_id", &self.task_id)
            .field("len", &self.len)
            .field("burn", &self.burn.is_some())
            .finish()
    }
}
