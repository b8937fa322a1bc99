//! Splitting files into fixed-size chunks and putting them back together.
//!
//! - [`FileChunker`] / [`DefaultFileChunker`] -- sequential and parallel
//!   splitting; every payload is hashed and written to a [`ChunkStore`]
//! - [`reconstruct`] -- concatenate stored payloads in index order
//! - [`verify_chunks`] -- re-hash stored payloads against a manifest
//!
//! [`ChunkStore`]: chunksync_store::ChunkStore

pub mod chunker;
pub mod error;
pub mod reconstruct;

pub use chunker::{ChunkMode, DefaultFileChunker, FileChunker};
pub use error::{ChunkError, ChunkResult};
pub use reconstruct::{reconstruct, verify_chunks, VerifyReport};

/// Default chunk size: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;
