//! Foundation types for chunksync.
//!
//! Every other chunksync crate depends on `chunksync-types`. Nothing in here
//! performs I/O; the crate only defines identities and the manifest model.
//!
//! # Key Types
//!
//! - [`ContentHash`] - BLAKE3 digest of a chunk payload
//! - [`ContentHasher`] - Domain-separated hasher producing [`ContentHash`]es
//! - [`ChunkLocation`] - Chunk-store identifier, unique per (file, index)
//! - [`ChunkMeta`] - Location, hash and index of one chunk
//! - [`Manifest`] - Last chunk state accepted by the remote side

pub mod chunk;
pub mod error;
pub mod hash;
pub mod manifest;

pub use chunk::{ChunkLocation, ChunkMeta};
pub use error::TypeError;
pub use hash::{ContentHash, ContentHasher};
pub use manifest::{Manifest, SharedManifest};

/// Size of the worker pools used for parallel chunking and uploading.
pub const DEFAULT_WORKERS: usize = 4;
