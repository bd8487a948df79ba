//! Post-delivery cleanup queue
//!
//! Burning a delivered task must not happen before the payload has been
//! handed to the transport, so the download stream only enqueues a job when
//! it reaches the end. A background [`BurnWorker`] drains the queue. Jobs are
//! idempotent and failed blob deletions are re-queued with backoff, which
//! makes cleanup at-least-once.

use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;

use crate::blob_store::StorageHandle;
use crate::relay::Relay;
use crate::tasks::TaskId;

/// Give up on deleting a blob after this many attempts
pub const MAX_DELETE_ATTEMPTS: u32 = 5;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Cleanup jobs handled by the burn worker
#[derive(Debug, Clone)]
pub enum Job {
    /// Destroy a delivered task: revoke its credentials, drop the record and
    /// delete the blob.
    Burn { task_id: TaskId },

    /// Retry deleting a blob whose record is already gone.
    DeleteBlob {
        handle: StorageHandle,
        attempt: u32,
    },
}

/// Cloneable handle for queueing cleanup jobs.
#[derive(Debug, Clone)]
pub struct BurnDispatcher {
    tx: flume::Sender<Job>,
}

impl BurnDispatcher {
    /// Create a dispatcher and the receiver the worker drains.
    pub fn new() -> (Self, BurnReceiver) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, BurnReceiver { rx })
    }

    /// Queue a job. Fails only if the receiver has been dropped.
    pub fn dispatch(&self, job: Job) -> Result<()> {
        tracing::debug!(?job, "dispatching cleanup job");
        self.tx
            .send(job)
            .map_err(|_| anyhow::anyhow!("burn receiver has been dropped"))
    }

    pub fn dispatch_burn(&self, task_id: TaskId) -> Result<()> {
        self.dispatch(Job::Burn { task_id })
    }

    /// Queue a blob deletion retry after a backoff delay.
    pub fn retry_delete(&self, handle: StorageHandle, attempt: u32) {
        if attempt > MAX_DELETE_ATTEMPTS {
            tracing::error!(%handle, "giving up on deleting blob");
            return;
        }
        let dispatcher = self.clone();
        let delay = RETRY_BASE_DELAY * 2u32.pow(attempt.saturating_sub(1));
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = dispatcher.dispatch(Job::DeleteBlob { handle, attempt }) {
                tracing::warn!(error = %e, "failed to requeue blob deletion");
            }
        });
    }
}

/// Receiving end of the cleanup queue.
#[derive(Debug)]
pub struct BurnReceiver {
    rx: flume::Receiver<Job>,
}

impl BurnReceiver {
    pub async fn recv(&self) -> Option<Job> {
        self.rx.recv_async().await.ok()
    }

    pub fn try_recv(&self) -> Option<Job> {
        self.rx.try_recv().ok()
    }
}

/// Drains the cleanup queue against a relay.
#[derive(Debug)]
pub struct BurnWorker {
    relay: Relay,
    rx: BurnReceiver,
}

impl BurnWorker {
    pub(crate) fn new(relay: Relay, rx: BurnReceiver) -> Self {
        Self { relay, rx }
    }

    /// Process jobs until shutdown is signalled.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<()>) {
        tracing::info!("burn worker started");
        loop {
            tokio::select! {
                job = self.rx.recv() => match job {
                    Some(job) => self.handle(job).await,
                    None => break,
                },
                _ = shutdown_rx.changed() => {
                    // finish what is already queued before exiting
                    self.run_pending().await;
                    break;
                }
            }
        }
        tracing::info!("burn worker stopped");
    }

    /// Process every job currently queued, returning how many ran.
    pub async fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Some(job) = self.rx.try_recv() {
            self.handle(job).await;
            ran += 1;
        }
        ran
    }

    async fn handle(&self, job: Job) {
        match job {
            Job::Burn { task_id } => {
                tracing::info!(%task_id, "burning delivered task");
                self.relay.destroy_task(task_id).await;
            }
            Job::DeleteBlob { handle, attempt } => {
                match self.relay.tasks().delete_orphan(&handle).await {
                    Ok(true) => tracing::debug!(%handle, attempt, "orphaned blob deleted"),
                    Ok(false) => tracing::debug!("slot reused, skipping stale delete"),
                    Err(e) => {
                        tracing::warn!(%handle, attempt, error = %e, "blob deletion failed");
                        self.relay.burns().retry_delete(handle, attempt + 1);
                    }
                }
            }
        }
    }
}
