use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::chunk::{ChunkLocation, ChunkMeta};

/// Manifest shared between synchronization workers.
///
/// Every read-check and every entry write goes through the mutex; the lock is
/// never held across an upload.
pub type SharedManifest = Arc<Mutex<Manifest>>;

/// Mapping from chunk location to the last [`ChunkMeta`] accepted remotely.
///
/// An entry may only be written after the upload of that exact payload has
/// succeeded, which makes the manifest the record of what the remote side
/// believes it has. Entries are kept in a `BTreeMap` so the persisted form
/// is ordered and stable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<ChunkLocation, ChunkMeta>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, location: &ChunkLocation) -> Option<&ChunkMeta> {
        self.entries.get(location)
    }

    /// Record a chunk as synchronized, returning the entry it replaced.
    pub fn insert(&mut self, chunk: ChunkMeta) -> Option<ChunkMeta> {
        self.entries.insert(chunk.location.clone(), chunk)
    }

    pub fn remove(&mut self, location: &ChunkLocation) -> Option<ChunkMeta> {
        self.entries.remove(location)
    }

    /// A chunk is dirty when its location is unknown or its hash changed.
    pub fn is_dirty(&self, chunk: &ChunkMeta) -> bool {
        match self.entries.get(&chunk.location) {
            Some(known) => known.content_hash != chunk.content_hash,
            None => true,
        }
    }

    /// Drop entries whose index is `chunk_count` or higher, returning them.
    ///
    /// Used after a file shrank so the manifest stops describing chunks the
    /// file no longer has.
    pub fn truncate(&mut self, chunk_count: u64) -> Vec<ChunkMeta> {
        let stale: Vec<ChunkLocation> = self
            .entries
            .values()
            .filter(|c| c.index >= chunk_count)
            .map(|c| c.location.clone())
            .collect();
        stale
            .iter()
            .filter_map(|location| self.entries.remove(location))
            .collect()
    }

    /// The subset of `chunks` that needs uploading.
    pub fn dirty_chunks<'a>(&self, chunks: &'a [ChunkMeta]) -> Vec<&'a ChunkMeta> {
        chunks.iter().filter(|c| self.is_dirty(c)).collect()
    }

    /// Iterate entries in location order.
    pub fn iter(&self) -> impl Iterator<Item = &ChunkMeta> {
        self.entries.values()
    }

    /// All entries sorted by ascending chunk index.
    pub fn by_index(&self) -> Vec<ChunkMeta> {
        let mut chunks: Vec<ChunkMeta> = self.entries.values().cloned().collect();
        chunks.sort_by_key(|c| c.index);
        chunks
    }

    /// Wrap the manifest for use by concurrent workers.
    pub fn into_shared(self) -> SharedManifest {
        Arc::new(Mutex::new(self))
    }
}

impl FromIterator<ChunkMeta> for Manifest {
    fn from_iter<I: IntoIterator<Item = ChunkMeta>>(iter: I) -> Self {
        let mut manifest = Manifest::new();
        for chunk in iter {
            manifest.insert(chunk);
        }
        manifest
    }
}
