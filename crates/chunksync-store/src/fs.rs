use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use chunksync_types::ChunkLocation;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::ChunkStore;

/// Filesystem chunk store: one file per chunk.
///
/// Without a chunk directory, payloads sit next to the source file as
/// `<path>.chunk.<index>`. With one, they go to
/// `<chunk_dir>/<file name>.chunk.<index>`.
#[derive(Clone, Debug, Default)]
pub struct FsChunkStore {
    chunk_dir: Option<PathBuf>,
}

impl FsChunkStore {
    /// Store chunks beside their source files.
    pub fn new() -> Self {
        Self { chunk_dir: None }
    }

    /// Store chunks under `dir`.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            chunk_dir: Some(dir.into()),
        }
    }

    pub fn chunk_dir(&self) -> Option<&Path> {
        self.chunk_dir.as_deref()
    }
}

fn not_found_as_missing(err: io::Error, location: &ChunkLocation) -> StoreError {
    if err.kind() == io::ErrorKind::NotFound {
        StoreError::ChunkNotFound(location.clone())
    } else {
        StoreError::Io(err)
    }
}

impl ChunkStore for FsChunkStore {
    fn location(&self, source: &Path, index: u64) -> ChunkLocation {
        match &self.chunk_dir {
            Some(dir) => ChunkLocation::under(dir, source, index),
            None => ChunkLocation::beside(source, index),
        }
    }

    fn put(&self, location: &ChunkLocation, payload: &[u8]) -> StoreResult<()> {
        let path = location.to_path();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = File::create(&path)?;
        file.write_all(payload)?;
        debug!(location = %location, len = payload.len(), "chunk written");
        Ok(())
    }

    fn get(&self, location: &ChunkLocation) -> StoreResult<Vec<u8>> {
        fs::read(location.to_path()).map_err(|e| not_found_as_missing(e, location))
    }

    fn open(&self, location: &ChunkLocation) -> StoreResult<Box<dyn Read + Send>> {
        let file = File::open(location.to_path()).map_err(|e| not_found_as_missing(e, location))?;
        Ok(Box::new(file))
    }

    fn exists(&self, location: &ChunkLocation) -> StoreResult<bool> {
        Ok(location.to_path().is_file())
    }

    fn remove(&self, location: &ChunkLocation) -> StoreResult<bool> {
        match fs::remove_file(location.to_path()) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
