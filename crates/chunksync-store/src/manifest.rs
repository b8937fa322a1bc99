use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chunksync_types::Manifest;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// Durable storage for the [`Manifest`].
///
/// Implementations must not cache: every `load` re-reads durable storage,
/// and a `save` followed by a `load` returns an equal manifest.
pub trait ManifestStore: Send + Sync {
    /// Load the manifest at `path`.
    ///
    /// A missing or unreadable manifest yields an empty one. A manifest that
    /// exists but cannot be decoded is an error.
    fn load(&self, path: &Path) -> StoreResult<Manifest>;

    /// Persist `manifest` at `path`, replacing any previous version.
    fn save(&self, path: &Path, manifest: &Manifest) -> StoreResult<()>;
}

/// Manifest path used for a source file: `<path>.metadata.json`.
pub fn default_manifest_path(source: &Path) -> PathBuf {
    let mut name = source.as_os_str().to_owned();
    name.push(".metadata.json");
    PathBuf::from(name)
}

/// JSON manifest store.
///
/// The file is a pretty-printed object keyed by chunk location whose values
/// are `{location, content_hash, index}`. Saves go through a temp file in the
/// target directory and a rename, so readers see either the old or the new
/// manifest and never a torn one.
#[derive(Clone, Debug, Default)]
pub struct JsonManifestStore;

impl JsonManifestStore {
    pub fn new() -> Self {
        Self
    }
}

impl ManifestStore for JsonManifestStore {
    fn load(&self, path: &Path) -> StoreResult<Manifest> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no manifest yet, starting fresh");
                return Ok(Manifest::new());
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "manifest unreadable, starting fresh");
                return Ok(Manifest::new());
            }
        };

        let manifest: Manifest =
            serde_json::from_slice(&data).map_err(|e| StoreError::CorruptManifest {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        debug!(path = %path.display(), entries = manifest.len(), "manifest loaded");
        Ok(manifest)
    }

    fn save(&self, path: &Path, manifest: &Manifest) -> StoreResult<()> {
        let data = serde_json::to_vec_pretty(manifest)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;

        debug!(path = %path.display(), entries = manifest.len(), "manifest saved");
        Ok(())
    }
}
