use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chunksync_store::{ChunkStore, StoreError};
use chunksync_types::{ChunkLocation, ContentHasher, Manifest};
use tracing::{info, warn};

use crate::error::ChunkResult;

/// Rebuild a file by concatenating the manifest's chunks in index order.
///
/// The output is created or truncated. Payloads are streamed from the store;
/// a missing or unreadable chunk aborts immediately. Hashes are not checked
/// here, see [`verify_chunks`].
///
/// Returns the number of bytes written.
pub fn reconstruct(manifest: &Manifest, store: &dyn ChunkStore, output: &Path) -> ChunkResult<u64> {
    let chunks = manifest.by_index();
    let mut out = BufWriter::new(File::create(output)?);
    let mut written = 0u64;

    for chunk in &chunks {
        let mut payload = store.open(&chunk.location)?;
        written += io::copy(&mut payload, &mut out)?;
    }
    out.flush()?;

    info!(output = %output.display(), chunks = chunks.len(), bytes = written, "file reconstructed");
    Ok(written)
}

/// Outcome of [`verify_chunks`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub chunks_checked: usize,
    pub missing: Vec<ChunkLocation>,
    pub mismatched: Vec<ChunkLocation>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.mismatched.is_empty()
    }
}

/// Re-hash every stored payload listed in the manifest.
///
/// Missing payloads and hash mismatches are collected rather than treated as
/// errors; other I/O failures are propagated.
pub fn verify_chunks(manifest: &Manifest, store: &dyn ChunkStore) -> ChunkResult<VerifyReport> {
    let mut report = VerifyReport::default();

    for chunk in manifest.by_index() {
        report.chunks_checked += 1;
        match store.get(&chunk.location) {
            Ok(payload) => {
                if !ContentHasher::CHUNK.verify(&payload, &chunk.content_hash) {
                    warn!(location = %chunk.location, "chunk hash mismatch");
                    report.mismatched.push(chunk.location);
                }
            }
            Err(StoreError::ChunkNotFound(location)) => {
                warn!(location = %location, "chunk missing");
                report.missing.push(location);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(report)
}
