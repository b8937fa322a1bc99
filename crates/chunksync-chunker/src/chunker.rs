//! Fixed-size file splitting.
//!
//! Two modes share one contract: every chunk of the file is hashed, its
//! payload written to the chunk store, and its [`ChunkMeta`] returned.
//!
//! - **Sequential** reads the file front to back; results come back in
//!   index order.
//! - **Parallel** pre-computes the chunk count and lets a fixed pool of
//!   workers pull indices from a queue. Each worker opens its own handle and
//!   seeks to `index * chunk_size`, so workers never share a file cursor.
//!   Results are accumulated in completion order, which is unspecified.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use chunksync_store::ChunkStore;
use chunksync_types::{ChunkMeta, DEFAULT_WORKERS};
use tracing::{debug, info};

use crate::error::{ChunkError, ChunkResult};

/// How a file should be split.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChunkMode {
    #[default]
    Sequential,
    Parallel,
}

/// Splits files into content-addressed chunks.
pub trait FileChunker: Send + Sync {
    /// Split `path` with a single in-order pass.
    ///
    /// The returned metadata is ordered by index.
    fn chunk_file(&self, path: &Path) -> ChunkResult<Vec<ChunkMeta>>;

    /// Split `path` with a worker pool.
    ///
    /// The returned metadata is in completion order; callers must not assume
    /// it is sorted.
    fn chunk_large_file(&self, path: &Path) -> ChunkResult<Vec<ChunkMeta>>;

    /// The configured chunk size in bytes.
    fn chunk_size(&self) -> usize;

    fn split(&self, path: &Path, mode: ChunkMode) -> ChunkResult<Vec<ChunkMeta>> {
        match mode {
            ChunkMode::Sequential => self.chunk_file(path),
            ChunkMode::Parallel => self.chunk_large_file(path),
        }
    }
}

/// Default splitter writing payloads to a [`ChunkStore`].
pub struct DefaultFileChunker {
    chunk_size: usize,
    workers: usize,
    store: Arc<dyn ChunkStore>,
}

impl DefaultFileChunker {
    pub fn new(chunk_size: usize, store: Arc<dyn ChunkStore>) -> ChunkResult<Self> {
        if chunk_size == 0 {
            return Err(ChunkError::InvalidChunkSize);
        }
        Ok(Self {
            chunk_size,
            workers: DEFAULT_WORKERS,
            store,
        })
    }

    /// Override the parallel-mode worker count.
    pub fn with_workers(mut self, workers: usize) -> ChunkResult<Self> {
        if workers == 0 {
            return Err(ChunkError::InvalidWorkerCount);
        }
        self.workers = workers;
        Ok(self)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    /// Hash and persist one payload.
    fn emit(&self, source: &Path, index: u64, payload: &[u8]) -> ChunkResult<ChunkMeta> {
        let location = self.store.location(source, index);
        let meta = ChunkMeta::for_payload(location, index, payload);
        self.store.put(&meta.location, payload)?;
        debug!(index, len = payload.len(), hash = %meta.content_hash.short_hex(), "chunk emitted");
        Ok(meta)
    }

    /// Worker body for parallel mode: drain the index queue until it closes.
    fn drain_indices(
        &self,
        source: &Path,
        file_size: u64,
        queue: &Mutex<mpsc::Receiver<u64>>,
        chunks: &Mutex<Vec<ChunkMeta>>,
    ) -> ChunkResult<()> {
        let mut file = File::open(source)?;
        let mut buffer = vec![0u8; self.chunk_size];

        loop {
            let next = queue.lock().expect("lock poisoned").recv();
            let Ok(index) = next else {
                return Ok(());
            };

            let offset = index * self.chunk_size as u64;
            let want = (file_size.saturating_sub(offset)).min(self.chunk_size as u64) as usize;
            file.seek(SeekFrom::Start(offset))?;
            let n = read_block(&mut file, &mut buffer[..want])?;
            if n == 0 {
                continue;
            }

            let meta = self.emit(source, index, &buffer[..n])?;
            chunks.lock().expect("lock poisoned").push(meta);
        }
    }
}

impl FileChunker for DefaultFileChunker {
    fn chunk_file(&self, path: &Path) -> ChunkResult<Vec<ChunkMeta>> {
        let mut file = File::open(path)?;
        let mut buffer = vec![0u8; self.chunk_size];
        let mut chunks = Vec::new();
        let mut index = 0u64;

        loop {
            let n = read_block(&mut file, &mut buffer)?;
            if n == 0 {
                break;
            }
            chunks.push(self.emit(path, index, &buffer[..n])?);
            index += 1;
        }

        info!(path = %path.display(), chunks = chunks.len(), "file chunked");
        Ok(chunks)
    }

    fn chunk_large_file(&self, path: &Path) -> ChunkResult<Vec<ChunkMeta>> {
        let file_size = fs::metadata(path)?.len();
        let num_chunks = file_size.div_ceil(self.chunk_size as u64);

        // Bounded to the known item count: population never blocks.
        let (tx, rx) = mpsc::sync_channel::<u64>(num_chunks as usize);
        for index in 0..num_chunks {
            tx.send(index)
                .map_err(|_| ChunkError::WorkerPool("index queue closed early".into()))?;
        }
        drop(tx);

        let queue = Mutex::new(rx);
        let chunks = Mutex::new(Vec::with_capacity(num_chunks as usize));
        let first_error: Mutex<Option<ChunkError>> = Mutex::new(None);
        let workers = self.workers.min(num_chunks.max(1) as usize);

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    if let Err(e) = self.drain_indices(path, file_size, &queue, &chunks) {
                        let mut slot = first_error.lock().expect("lock poisoned");
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                    }
                });
            }
        });

        if let Some(e) = first_error.into_inner().expect("lock poisoned") {
            return Err(e);
        }

        let chunks = chunks.into_inner().expect("lock poisoned");
        info!(
            path = %path.display(),
            chunks = chunks.len(),
            workers,
            "file chunked in parallel"
        );
        Ok(chunks)
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// Fill `buf` from `reader`, stopping early only at end of file.
///
/// A plain `read` may return fewer bytes than requested mid-file; chunk
/// boundaries must not depend on that.
fn read_block<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
