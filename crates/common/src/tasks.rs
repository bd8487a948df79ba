//! Registry of pending transfers.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::blob_store::{BlobReader, BlobStore, BlobStoreError, StagedBlob, StorageHandle};
use crate::clock::SharedClock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The per-task blob handle for this id.
    pub fn storage_handle(&self) -> StorageHandle {
        StorageHandle::from_trusted(format!("{}.bin", self.0))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// One pending transfer. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub storage_handle: StorageHandle,
    pub auxiliary_key: Option<String>,
    pub burn_on_delivery: bool,
    pub size: u64,
    pub created_at: Instant,
}

impl Task {
    /// A retention too long to represent never expires.
    pub fn is_expired(&self, retention: Duration, now: Instant) -> bool {
        self.created_at
            .checked_add(retention)
            .is_some_and(|deadline| deadline <= now)
    }
}

/// The record was removed but its blob could not be deleted.
#[derive(Debug, thiserror::Error)]
#[error("task {} removed but its blob could not be deleted: {source}", task.id)]
pub struct DestroyError {
    pub task: Task,
    #[source]
    pub source: BlobStoreError,
}

/// Result of a retention sweep. Every listed record is gone from the
/// registry; `failed` ones still have a blob on disk.
#[derive(Debug, Default)]
pub struct Swept {
    pub removed: Vec<Task>,
    pub failed: Vec<DestroyError>,
}

impl Swept {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.failed.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.removed
            .iter()
            .map(|task| task.id)
            .chain(self.failed.iter().map(|e| e.task.id))
    }
}

#[derive(Default)]
struct Inner {
    tasks: HashMap<TaskId, Task>,
    // the one record, if any, that owns the latest-slot handle
    slot: Option<TaskId>,
}

impl Inner {
    fn remove(&mut self, id: TaskId) -> Option<Task> {
        let task = self.tasks.remove(&id)?;
        if self.slot == Some(id) {
            self.slot = None;
        }
        Some(task)
    }
}

/// Task records plus the blobs they own.
///
/// Record changes happen under a short synchronous lock; blob I/O always
/// happens after it is released. The latest slot additionally has an async
/// lock that orders slot commits, slot deletions and slot opens, because all
/// of them touch the same file.
pub struct TaskRegistry {
    clock: SharedClock,
    blobs: BlobStore,
    inner: Mutex<Inner>,
    slot_lock: tokio::sync::Mutex<()>,
}

impl TaskRegistry {
    pub fn new(clock: SharedClock, blobs: BlobStore) -> Self {
        Self {
            clock,
            blobs,
            inner: Mutex::new(Inner::default()),
            slot_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Register a per-task transfer whose blob is already committed under
    /// `id.storage_handle()`.
    pub fn create(
        &self,
        id: TaskId,
        burn_on_delivery: bool,
        auxiliary_key: Option<String>,
        size: u64,
    ) -> TaskId {
        let task = Task {
            id,
            storage_handle: id.storage_handle(),
            auxiliary_key,
            burn_on_delivery,
            size,
            created_at: self.clock.now(),
        };
        self.inner.lock().tasks.insert(id, task);
        id
    }

    /// Commit `staged` into the latest slot and register it as the new slot
    /// task, superseding the previous one.
    ///
    /// The blob is swapped in by atomic rename. The key is only kept on the
    /// in-memory record, which flips under the registry lock afterwards, so a
    /// reader (holding the slot lock) always gets a blob and key that were
    /// uploaded together. If the commit fails the previous slot stays
    /// registered and readable. Returns the new id and the superseded record.
    pub async fn commit_slot(
        &self,
        staged: StagedBlob,
        auxiliary_key: Option<String>,
    ) -> Result<(TaskId, Option<Task>), BlobStoreError> {
        let handle = StorageHandle::latest();
        let _slot = self.slot_lock.lock().await;

        let size = self.blobs.commit(staged, &handle).await?;

        let id = TaskId::new();
        let task = Task {
            id,
            storage_handle: handle,
            auxiliary_key,
            burn_on_delivery: false,
            size,
            created_at: self.clock.now(),
        };

        let mut inner = self.inner.lock();
        let superseded = match inner.slot.take() {
            Some(previous) => inner.tasks.remove(&previous),
            None => None,
        };
        inner.tasks.insert(id, task);
        inner.slot = Some(id);
        Ok((id, superseded))
    }

    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.inner.lock().tasks.get(&id).cloned()
    }

    pub fn current_slot(&self) -> Option<TaskId> {
        self.inner.lock().slot
    }

    pub fn len(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open the blob behind `task` for reading. `None` means the record is
    /// stale: the file is gone, or the slot moved on to a newer upload.
    pub async fn open(&self, task: &Task) -> Result<Option<BlobReader>, BlobStoreError> {
        if !task.storage_handle.is_latest() {
            return self.blobs.open(&task.storage_handle).await;
        }

        // an open file handle keeps reading the old content after a later
        // rename, so only the open itself needs to be ordered with commits
        let _slot = self.slot_lock.lock().await;
        if self.current_slot() != Some(task.id) {
            return Ok(None);
        }
        self.blobs.open(&task.storage_handle).await
    }

    /// Whether the blob behind `task` still exists.
    pub async fn blob_exists(&self, task: &Task) -> Result<bool, BlobStoreError> {
        self.blobs.exists(&task.storage_handle).await
    }

    /// Remove the record and delete its blob. Destroying an unknown or
    /// already destroyed id is a no-op.
    ///
    /// The record is gone even when deleting the blob fails; the error is
    /// returned together with the record so the caller can retry the delete.
    pub async fn destroy(&self, id: TaskId) -> Result<Option<Task>, DestroyError> {
        let is_slot = match self.get(id) {
            Some(task) => task.storage_handle.is_latest(),
            None => return Ok(None),
        };

        // a slot record is only ever present while it owns the slot file, so
        // removing it under the slot lock means the file is still ours
        let _slot = if is_slot {
            Some(self.slot_lock.lock().await)
        } else {
            None
        };

        let Some(task) = self.inner.lock().remove(id) else {
            return Ok(None);
        };
        match self.blobs.delete(&task.storage_handle).await {
            Ok(()) => Ok(Some(task)),
            Err(source) => Err(DestroyError { task, source }),
        }
    }

    /// Delete a blob whose record is already gone. Returns `false` and leaves
    /// the file alone when `handle` is the slot and a newer upload owns it.
    pub async fn delete_orphan(&self, handle: &StorageHandle) -> Result<bool, BlobStoreError> {
        if !handle.is_latest() {
            self.blobs.delete(handle).await?;
            return Ok(true);
        }

        let _slot = self.slot_lock.lock().await;
        if self.current_slot().is_some() {
            return Ok(false);
        }
        self.blobs.delete(handle).await?;
        Ok(true)
    }

    /// Remove every record whose retention has run out and delete the blobs.
    pub async fn sweep_expired(&self, retention: Duration) -> Swept {
        let now = self.clock.now();
        let expired: Vec<TaskId> = self
            .inner
            .lock()
            .tasks
            .values()
            .filter(|task| task.is_expired(retention, now))
            .map(|task| task.id)
            .collect();

        let mut swept = Swept::default();
        for id in expired {
            match self.destroy(id).await {
                Ok(Some(task)) => swept.removed.push(task),
                Ok(None) => {}
                Err(e) => swept.failed.push(e),
            }
        }
        swept
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("len", &self.len())
            .field("root", &self.blobs.root())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::clock::ManualClock;

    async fn setup() -> (TaskRegistry, ManualClock, TempDir) {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new();
        let blobs = BlobStore::new(dir.path()).await.unwrap();
        (TaskRegistry::new(Arc::new(clock.clone()), blobs), clock, dir)
    }

    async fn stored_task(registry: &TaskRegistry, data: &[u8]) -> TaskId {
        let id = TaskId::new();
        registry
            .blobs()
            .put(&id.storage_handle(), data)
            .await
            .unwrap();
        registry.create(id, true, Some("key".into()), data.len() as u64)
    }

    #[test]
    fn test_task_id_round_trips_through_display() {
        let id = TaskId::new();
        assert_eq!(id.to_string().parse::<TaskId>().unwrap(), id);
        assert!("not-a-uuid".parse::<TaskId>().is_err());
        assert_eq!(id.storage_handle().as_str(), format!("{}.bin", id));
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (registry, _, _dir) = setup().await;
        let id = stored_task(&registry, b"payload").await;

        let task = registry.get(id).unwrap();
        assert_eq!(task.id, id);
        assert_eq!(task.size, 7);
        assert!(task.burn_on_delivery);
        assert_eq!(task.auxiliary_key.as_deref(), Some("key"));
        assert!(registry.get(TaskId::new()).is_none());
    }

    #[tokio::test]
    async fn test_destroy_removes_record_and_blob() {
        let (registry, _, _dir) = setup().await;
        let id = stored_task(&registry, b"payload").await;
        let handle = id.storage_handle();

        let destroyed = registry.destroy(id).await.unwrap().unwrap();
        assert_eq!(destroyed.id, id);
        assert!(registry.get(id).is_none());
        assert!(!registry.blobs().exists(&handle).await.unwrap());

        // second destroy is a no-op
        assert!(registry.destroy(id).await.unwrap().is_none());
        assert!(registry.destroy(TaskId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_expired_respects_retention() {
        let (registry, clock, _dir) = setup().await;
        let retention = Duration::from_secs(3600);
        let old = stored_task(&registry, b"old").await;
        clock.advance(Duration::from_secs(1800));
        let young = stored_task(&registry, b"young").await;

        clock.advance(Duration::from_secs(1799));
        assert!(registry.sweep_expired(retention).await.is_empty());

        clock.advance(Duration::from_secs(1));
        let swept = registry.sweep_expired(retention).await;
        assert!(swept.failed.is_empty());
        assert_eq!(swept.ids().collect::<Vec<_>>(), vec![old]);
        assert!(!registry.blobs().exists(&old.storage_handle()).await.unwrap());
        assert!(registry.get(young).is_some());
    }

    #[tokio::test]
    async fn test_unrepresentable_retention_never_expires() {
        let (registry, clock, _dir) = setup().await;
        let id = stored_task(&registry, b"kept").await;

        clock.advance(Duration::from_secs(365 * 24 * 3600));
        assert!(registry.sweep_expired(Duration::from_secs(u64::MAX)).await.is_empty());
        assert!(registry.get(id).is_some());
    }

    #[tokio::test]
    async fn test_commit_slot_supersedes_previous() {
        let (registry, _, _dir) = setup().await;

        let mut staged = registry.blobs().stage().await.unwrap();
        staged.write(b"A").await.unwrap();
        let (first, superseded) = registry.commit_slot(staged, Some("ka".into())).await.unwrap();
        assert!(superseded.is_none());
        assert!(!registry.get(first).unwrap().burn_on_delivery);

        let mut staged = registry.blobs().stage().await.unwrap();
        staged.write(b"BB").await.unwrap();
        let (second, superseded) = registry.commit_slot(staged, Some("kb".into())).await.unwrap();
        assert_eq!(superseded.unwrap().id, first);

        assert!(registry.get(first).is_none());
        assert_eq!(registry.current_slot(), Some(second));
        assert_eq!(registry.len(), 1);

        let latest = StorageHandle::latest();
        assert_eq!(registry.blobs().read(&latest).await.unwrap().unwrap(), b"BB");
        assert_eq!(
            registry.get(second).unwrap().auxiliary_key.as_deref(),
            Some("kb")
        );
        // the key never touches the disk
        let files = std::fs::read_dir(registry.blobs().root()).unwrap().count();
        assert_eq!(files, 1);
    }

    #[tokio::test]
    async fn test_stale_slot_record_does_not_open() {
        let (registry, _, _dir) = setup().await;

        let staged = registry.blobs().stage().await.unwrap();
        let (first, _) = registry.commit_slot(staged, None).await.unwrap();
        let first_task = registry.get(first).unwrap();

        let staged = registry.blobs().stage().await.unwrap();
        registry.commit_slot(staged, None).await.unwrap();

        assert!(registry.open(&first_task).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_orphan_spares_owned_slot() {
        let (registry, _, _dir) = setup().await;
        let staged = registry.blobs().stage().await.unwrap();
        registry.commit_slot(staged, None).await.unwrap();

        let latest = StorageHandle::latest();
        assert!(!registry.delete_orphan(&latest).await.unwrap());
        assert!(registry.blobs().exists(&latest).await.unwrap());

        let orphan = StorageHandle::new("orphan.bin").unwrap();
        registry.blobs().put(&orphan, b"x").await.unwrap();
        assert!(registry.delete_orphan(&orphan).await.unwrap());
        assert!(!registry.blobs().exists(&orphan).await.unwrap());
    }

    #[tokio::test]
    async fn test_destroy_slot_deletes_slot_file() {
        let (registry, _, _dir) = setup().await;
        let staged = registry.blobs().stage().await.unwrap();
        let (id, _) = registry.commit_slot(staged, Some("k".into())).await.unwrap();

        registry.destroy(id).await.unwrap();
        assert_eq!(registry.current_slot(), None);
        let latest = StorageHandle::latest();
        assert!(!registry.blobs().exists(&latest).await.unwrap());
    }
}
