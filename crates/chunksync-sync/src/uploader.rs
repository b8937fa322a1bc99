use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chunksync_types::{ChunkLocation, ChunkMeta, ContentHasher};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("remote rejected chunk: {0}")]
    Rejected(String),

    #[error("payload does not match hash for {0}")]
    HashMismatch(ChunkLocation),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type UploadResult<T> = Result<T, UploadError>;

/// Capability that moves one chunk to the remote store.
///
/// The synchronizer treats this as opaque: transport, authentication and
/// any server-side retry belong to the implementation. Returning `Ok` means
/// the remote accepted exactly `payload` for `chunk.location`.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload_chunk(&self, chunk: &ChunkMeta, payload: Bytes) -> UploadResult<()>;
}

/// Uploader whose "remote" is a local directory.
///
/// Each chunk lands at `<root>/<file name of its location>`. The payload is
/// checked against the chunk hash before it is written.
#[derive(Clone, Debug)]
pub struct DirectoryUploader {
    root: PathBuf,
}

impl DirectoryUploader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `chunk` is placed under the remote root.
    pub fn remote_path(&self, chunk: &ChunkMeta) -> PathBuf {
        let location = chunk.location.to_path();
        let name = location
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| format!("chunk.{}", chunk.index).into());
        self.root.join(name)
    }
}

#[async_trait]
impl Uploader for DirectoryUploader {
    async fn upload_chunk(&self, chunk: &ChunkMeta, payload: Bytes) -> UploadResult<()> {
        if !ContentHasher::CHUNK.verify(&payload, &chunk.content_hash) {
            return Err(UploadError::HashMismatch(chunk.location.clone()));
        }
        tokio::fs::create_dir_all(&self.root).await?;
        let target = self.remote_path(chunk);
        tokio::fs::write(&target, &payload).await?;
        debug!(location = %chunk.location, target = %target.display(), "chunk stored remotely");
        Ok(())
    }
}
