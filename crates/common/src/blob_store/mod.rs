//! Local directory storage for opaque blobs.
//!
//! One file per [`StorageHandle`]. Writes always go through a [`StagedBlob`]
//! and become visible only through an atomic rename, so a reader either sees
//! the previous committed content or the new one, never a partial file.

mod error;
mod staged;

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use error::{BlobStoreError, Result};
pub use staged::StagedBlob;

const STAGING_PREFIX: &str = ".staging-";

/// Name of a blob inside the store directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageHandle(String);

impl StorageHandle {
    /// Handle of the reserved latest-slot blob.
    pub const LATEST: &'static str = "latest";

    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\'])
            && Path::new(&name).components().count() == 1;
        if !valid {
            return Err(BlobStoreError::InvalidHandle(name));
        }
        Ok(Self(name))
    }

    /// For names built by this crate that are known to be single components.
    pub(crate) fn from_trusted(name: String) -> Self {
        Self(name)
    }

    pub fn latest() -> Self {
        Self(Self::LATEST.to_string())
    }

    pub fn is_latest(&self) -> bool {
        self.0 == Self::LATEST
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An open committed blob.
#[derive(Debug)]
pub struct BlobReader {
    pub file: tokio::fs::File,
    pub len: u64,
}

#[derive(Debug, Clone)]
pub struct BlobStore {
    root: Arc<PathBuf>,
}

impl BlobStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        tracing::debug!(path = %root.display(), "blob store ready");
        Ok(Self {
            root: Arc::new(root),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, handle: &StorageHandle) -> PathBuf {
        self.root.join(handle.as_str())
    }

    /// Start a new write-once blob.
    pub async fn stage(&self) -> Result<StagedBlob> {
        let temp = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(self.root.as_path())?;
        StagedBlob::new(temp)
    }

    /// Atomically move a staged blob into place under `handle`, replacing any
    /// previous blob with that handle. Returns the committed length.
    ///
    /// If the rename fails the staged file is removed and whatever was stored
    /// under `handle` before is left untouched.
    pub async fn commit(&self, staged: StagedBlob, handle: &StorageHandle) -> Result<u64> {
        let (temp, len) = staged.finish().await?;
        let path = self.path(handle);
        tokio::task::spawn_blocking(move || temp.persist(path).map(|_| ()))
            .await
            .map_err(|e| BlobStoreError::Io(std::io::Error::other(e)))?
            .map_err(|e| BlobStoreError::Persist(e.error))?;
        Ok(len)
    }

    /// Stage, write and commit a small buffer in one go.
    pub async fn put(&self, handle: &StorageHandle, data: &[u8]) -> Result<()> {
        let mut staged = self.stage().await?;
        staged.write(data).await?;
        self.commit(staged, handle).await?;
        Ok(())
    }

    /// Open a committed blob for streaming, `None` if it doesn't exist.
    pub async fn open(&self, handle: &StorageHandle) -> Result<Option<BlobReader>> {
        let file = match tokio::fs::File::open(self.path(handle)).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata().await?.len();
        Ok(Some(BlobReader { file, len }))
    }

    /// Read a whole blob into memory.
    pub async fn read(&self, handle: &StorageHandle) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path(handle)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, handle: &StorageHandle) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path(handle)).await?)
    }

    /// Delete a blob. Deleting something that is already gone is not an
    /// error.
    pub async fn delete(&self, handle: &StorageHandle) -> Result<()> {
        match tokio::fs::remove_file(self.path(handle)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
