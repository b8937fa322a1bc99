use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::RwLock;

use chunksync_types::ChunkLocation;

use crate::error::{StoreError, StoreResult};
use crate::traits::ChunkStore;

/// In-memory, HashMap-based chunk store.
///
/// Intended for tests and embedding. Payloads are held behind a `RwLock`
/// and cloned on read.
pub struct InMemoryChunkStore {
    chunks: RwLock<HashMap<ChunkLocation, Vec<u8>>>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
        }
    }

    /// Number of payloads currently stored.
    pub fn len(&self) -> usize {
        self.chunks.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored payloads.
    pub fn total_bytes(&self) -> u64 {
        self.chunks
            .read()
            .expect("lock poisoned")
            .values()
            .map(|p| p.len() as u64)
            .sum()
    }

    /// Sorted list of stored locations.
    pub fn locations(&self) -> Vec<ChunkLocation> {
        let map = self.chunks.read().expect("lock poisoned");
        let mut locations: Vec<ChunkLocation> = map.keys().cloned().collect();
        locations.sort();
        locations
    }
}

impl Default for InMemoryChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkStore for InMemoryChunkStore {
    fn location(&self, source: &Path, index: u64) -> ChunkLocation {
        ChunkLocation::beside(source, index)
    }

    fn put(&self, location: &ChunkLocation, payload: &[u8]) -> StoreResult<()> {
        let mut map = self.chunks.write().expect("lock poisoned");
        map.insert(location.clone(), payload.to_vec());
        Ok(())
    }

    fn get(&self, location: &ChunkLocation) -> StoreResult<Vec<u8>> {
        let map = self.chunks.read().expect("lock poisoned");
        map.get(location)
            .cloned()
            .ok_or_else(|| StoreError::ChunkNotFound(location.clone()))
    }

    fn open(&self, location: &ChunkLocation) -> StoreResult<Box<dyn Read + Send>> {
        let payload = self.get(location)?;
        Ok(Box::new(Cursor::new(payload)))
    }

    fn exists(&self, location: &ChunkLocation) -> StoreResult<bool> {
        let map = self.chunks.read().expect("lock poisoned");
        Ok(map.contains_key(location))
    }

    fn remove(&self, location: &ChunkLocation) -> StoreResult<bool> {
        let mut map = self.chunks.write().expect("lock poisoned");
        Ok(map.remove(location).is_some())
    }
}

impl std::fmt::Debug for InMemoryChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryChunkStore")
            .field("chunk_count", &self.len())
            .finish()
    }
}
