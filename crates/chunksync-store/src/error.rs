use std::path::PathBuf;

use chunksync_types::ChunkLocation;

/// Errors from chunk and manifest storage.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested chunk payload does not exist.
    #[error("chunk not found: {0}")]
    ChunkNotFound(ChunkLocation),

    /// A manifest file exists but cannot be decoded.
    #[error("corrupt manifest {path}: {reason}")]
    CorruptManifest { path: PathBuf, reason: String },

    /// Serialization failure while writing a manifest.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
