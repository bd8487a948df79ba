use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use super::error::Result;

/// A blob that is being written but is not yet visible under any handle.
///
/// The backing temp file lives in the store directory so the final rename
/// stays on one filesystem. Dropping a `StagedBlob` without committing it
/// deletes the temp file, which covers failed writes, rejected uploads and
/// request futures that are cancelled mid-stream.
#[derive(Debug)]
pub struct StagedBlob {
    temp: NamedTempFile,
    file: tokio::fs::File,
    written: u64,
}

impl StagedBlob {
    pub(crate) fn new(temp: NamedTempFile) -> Result<Self> {
        let file = tokio::fs::File::from_std(temp.as_file().try_clone()?);
        Ok(Self {
            temp,
            file,
            written: 0,
        })
    }

    /// Append a chunk to the staged blob.
    pub async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> u64 {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Flush and fsync, handing back the temp file ready to be renamed.
    pub(crate) async fn finish(mut self) -> Result<(NamedTempFile, u64)> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok((self.temp, self.written))
    }
}
