use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::hash::{ContentHash, ContentHasher};

/// Chunk-store identifier for one chunk of one source file.
///
/// Locations are derived deterministically from the source path and the
/// chunk index, so the same (file, index) pair always maps to the same
/// location and no two pairs share one. The location is also the identity
/// of a [`ChunkMeta`] inside the manifest.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkLocation(String);

impl ChunkLocation {
    /// Wrap an already-derived location string.
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    /// `<source>.chunk.<index>`, next to the source file.
    pub fn beside(source: &Path, index: u64) -> Self {
        Self(format!("{}.chunk.{index}", source.display()))
    }

    /// `<dir>/<source file name>.chunk.<index>`.
    pub fn under(dir: &Path, source: &Path, index: u64) -> Self {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "source".to_string());
        Self(
            dir.join(format!("{name}.chunk.{index}"))
                .display()
                .to_string(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The location interpreted as a filesystem path.
    pub fn to_path(&self) -> PathBuf {
        PathBuf::from(&self.0)
    }
}

impl fmt::Debug for ChunkLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkLocation({})", self.0)
    }
}

impl fmt::Display for ChunkLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChunkLocation {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Metadata for one chunk produced by a chunking pass.
///
/// A fresh set of `ChunkMeta` values is produced on every pass; the manifest
/// keeps the copies that were last accepted by the remote side.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkMeta {
    /// Where the payload lives in the chunk store.
    pub location: ChunkLocation,
    /// Digest of the payload bytes.
    pub content_hash: ContentHash,
    /// Position of the chunk in the source file, starting at 0.
    pub index: u64,
}

impl ChunkMeta {
    pub fn new(location: ChunkLocation, content_hash: ContentHash, index: u64) -> Self {
        Self {
            location,
            content_hash,
            index,
        }
    }

    /// Build metadata by hashing the payload.
    pub fn for_payload(location: ChunkLocation, index: u64, payload: &[u8]) -> Self {
        Self::new(location, ContentHasher::CHUNK.hash(payload), index)
    }
}
