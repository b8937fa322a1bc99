use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("chunk size must be positive")]
    InvalidChunkSize,

    #[error("worker count must be positive")]
    InvalidWorkerCount,

    #[error("worker pool error: {0}")]
    WorkerPool(String),

    #[error("store error: {0}")]
    Store(#[from] chunksync_store::StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ChunkResult<T> = Result<T, ChunkError>;
