use std::path::{Path, PathBuf};
use std::sync::Arc;

use chunksync_chunker::{ChunkMode, FileChunker};
use chunksync_store::{default_manifest_path, ManifestStore};
use chunksync_types::{ChunkMeta, Manifest, SharedManifest};
use tracing::{debug, error, info};

use crate::error::{SyncError, SyncResult};
use crate::synchronizer::Synchronizer;
use crate::types::SyncReport;

/// One source file wired to its chunker, manifest and synchronizer.
///
/// The manifest is loaded once at construction and kept in memory across
/// passes. Every pass ends with a save, including passes that failed part
/// way, so entries for chunks that did upload survive a restart.
pub struct SyncPipeline {
    source: PathBuf,
    manifest_path: PathBuf,
    mode: ChunkMode,
    chunker: Arc<dyn FileChunker>,
    manifests: Arc<dyn ManifestStore>,
    synchronizer: Synchronizer,
    manifest: SharedManifest,
}

impl SyncPipeline {
    /// Build a pipeline using the default manifest path for `source`.
    pub fn new(
        source: impl Into<PathBuf>,
        chunker: Arc<dyn FileChunker>,
        manifests: Arc<dyn ManifestStore>,
        synchronizer: Synchronizer,
    ) -> SyncResult<Self> {
        let source = source.into();
        let manifest_path = default_manifest_path(&source);
        Self::with_manifest_path(source, manifest_path, chunker, manifests, synchronizer)
    }

    pub fn with_manifest_path(
        source: impl Into<PathBuf>,
        manifest_path: impl Into<PathBuf>,
        chunker: Arc<dyn FileChunker>,
        manifests: Arc<dyn ManifestStore>,
        synchronizer: Synchronizer,
    ) -> SyncResult<Self> {
        let source = source.into();
        let manifest_path = manifest_path.into();
        let manifest = manifests.load(&manifest_path)?;
        debug!(
            source = %source.display(),
            manifest = %manifest_path.display(),
            entries = manifest.len(),
            "pipeline ready"
        );
        Ok(Self {
            source,
            manifest_path,
            mode: ChunkMode::default(),
            chunker,
            manifests,
            synchronizer,
            manifest: manifest.into_shared(),
        })
    }

    pub fn with_mode(mut self, mode: ChunkMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Copy of the in-memory manifest.
    pub fn manifest(&self) -> Manifest {
        self.manifest.lock().expect("lock poisoned").clone()
    }

    /// Split the source, upload dirty chunks, save the manifest.
    ///
    /// After a fully successful pass, entries and stored payloads for chunk
    /// indices past the current end of the file are dropped. A failed pass
    /// leaves them in place.
    pub async fn run_pass(&self) -> SyncResult<SyncReport> {
        let chunks = self.split().await?;
        let outcome = self.synchronizer.synchronize(&chunks, &self.manifest).await;

        let pruned = match &outcome {
            Ok(_) => self.prune_past(chunks.len() as u64),
            Err(_) => Ok(()),
        };
        let saved = self.save_manifest();

        if let Err(save_err) = saved {
            if let Err(sync_err) = &outcome {
                error!(error = %sync_err, "pass failed before manifest save failed");
            }
            return Err(save_err);
        }
        pruned?;

        let report = outcome?;
        info!(
            source = %self.source.display(),
            chunks = chunks.len(),
            uploaded = report.uploaded.len(),
            "pass complete"
        );
        Ok(report)
    }

    /// Split the source and return the chunks that a pass would upload.
    ///
    /// Chunk payloads are written to the chunk store as a side effect; the
    /// manifest is left untouched.
    pub async fn status(&self) -> SyncResult<Vec<ChunkMeta>> {
        let chunks = self.split().await?;
        let manifest = self.manifest.lock().expect("lock poisoned");
        Ok(manifest.dirty_chunks(&chunks).into_iter().cloned().collect())
    }

    async fn split(&self) -> SyncResult<Vec<ChunkMeta>> {
        let chunker = Arc::clone(&self.chunker);
        let source = self.source.clone();
        let mode = self.mode;
        let chunks = tokio::task::spawn_blocking(move || chunker.split(&source, mode))
            .await
            .map_err(|e| SyncError::WorkerPool(e.to_string()))??;
        Ok(chunks)
    }

    fn prune_past(&self, chunk_count: u64) -> SyncResult<()> {
        let stale = self
            .manifest
            .lock()
            .expect("lock poisoned")
            .truncate(chunk_count);
        if stale.is_empty() {
            return Ok(());
        }
        let store = self.synchronizer.store();
        for chunk in &stale {
            store.remove(&chunk.location)?;
        }
        info!(
            source = %self.source.display(),
            dropped = stale.len(),
            chunks = chunk_count,
            "dropped chunks past end of file"
        );
        Ok(())
    }

    fn save_manifest(&self) -> SyncResult<()> {
        let snapshot = self.manifest();
        self.manifests.save(&self.manifest_path, &snapshot)?;
        Ok(())
    }
}
