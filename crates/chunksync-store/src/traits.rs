use std::io::Read;
use std::path::Path;

use chunksync_types::ChunkLocation;

use crate::error::StoreResult;

/// Storage for chunk payloads.
///
/// All implementations must satisfy these invariants:
/// - `location` is deterministic and unique per (source, index).
/// - `put` replaces any previous payload at the location.
/// - Distinct locations may be written concurrently.
/// - Reading a location that was never written is `StoreError::ChunkNotFound`.
pub trait ChunkStore: Send + Sync {
    /// Derive the location for chunk `index` of `source`.
    fn location(&self, source: &Path, index: u64) -> ChunkLocation;

    /// Persist a payload at `location`.
    fn put(&self, location: &ChunkLocation, payload: &[u8]) -> StoreResult<()>;

    /// Read the whole payload at `location`.
    fn get(&self, location: &ChunkLocation) -> StoreResult<Vec<u8>>;

    /// Open the payload at `location` for streaming reads.
    fn open(&self, location: &ChunkLocation) -> StoreResult<Box<dyn Read + Send>>;

    /// Check whether a payload exists at `location`.
    fn exists(&self, location: &ChunkLocation) -> StoreResult<bool>;

    /// Remove the payload at `location`. Returns `true` if it existed.
    fn remove(&self, location: &ChunkLocation) -> StoreResult<bool>;
}
