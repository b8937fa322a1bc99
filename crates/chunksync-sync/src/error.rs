use chunksync_types::ChunkLocation;
use thiserror::Error;

use crate::types::SyncReport;
use crate::uploader::UploadError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("upload of {location} failed")]
    Upload {
        location: ChunkLocation,
        source: UploadError,
    },

    /// At least one chunk failed; `report` says which chunks did land.
    #[error(
        "synchronization incomplete ({} uploaded, {} failed, {} not attempted)",
        .report.uploaded.len(),
        .report.failed.len(),
        .report.not_attempted.len()
    )]
    Incomplete {
        #[source]
        first: Box<SyncError>,
        report: Box<SyncReport>,
    },

    #[error("worker pool error: {0}")]
    WorkerPool(String),

    #[error("file watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("chunk error: {0}")]
    Chunk(#[from] chunksync_chunker::ChunkError),

    #[error("store error: {0}")]
    Store(#[from] chunksync_store::StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// The per-chunk report attached to an incomplete pass.
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncError::Incomplete { report, .. } => Some(report.as_ref()),
            _ => None,
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
