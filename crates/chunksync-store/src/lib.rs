//! Chunk payload storage and manifest persistence for chunksync.
//!
//! Two concerns live here, both behind traits so the splitter, reconstructor
//! and synchronizer can be exercised against in-memory doubles:
//!
//! - [`ChunkStore`] -- payload bytes addressable by [`ChunkLocation`]
//!   - [`FsChunkStore`] -- one file per chunk, `<path>.chunk.<index>`
//!   - [`InMemoryChunkStore`] -- `HashMap`-based store for tests and embedding
//! - [`ManifestStore`] -- durable load/save of the [`Manifest`]
//!   - [`JsonManifestStore`] -- pretty-printed JSON, replaced atomically
//!
//! # Design Rules
//!
//! 1. A chunk location is written by exactly one splitter worker per pass.
//! 2. Readers never mutate payloads.
//! 3. A missing manifest is "no prior state"; a malformed one is an error.
//! 4. All I/O errors are propagated, never silently ignored.
//!
//! [`ChunkLocation`]: chunksync_types::ChunkLocation
//! [`Manifest`]: chunksync_types::Manifest

pub mod error;
pub mod fs;
pub mod manifest;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsChunkStore;
pub use manifest::{default_manifest_path, JsonManifestStore, ManifestStore};
pub use memory::InMemoryChunkStore;
pub use traits::ChunkStore;
