//! Dirty-chunk detection and concurrent upload.
//!
//! A synchronization call works in three steps:
//!
//! 1. Diff the fresh chunk list against the manifest; clean chunks are
//!    skipped.
//! 2. Push every dirty chunk into a queue sized to hold all of them, close
//!    it, and let a fixed pool of workers drain it. A worker re-checks
//!    dirtiness under the manifest lock, reads the payload, uploads it, and
//!    only after the upload succeeds writes the new entry into the manifest.
//! 3. Wait for every worker, then report.
//!
//! The first failure becomes the representative error. It does not cancel
//! uploads already running on other workers, but once it is recorded no
//! worker takes a new chunk from the queue. Whatever is left is reported as
//! not attempted, and the error carries the full [`SyncReport`].

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chunksync_store::ChunkStore;
use chunksync_types::{ChunkLocation, ChunkMeta, SharedManifest};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::types::{RetryPolicy, SyncConfig, SyncReport};
use crate::uploader::{UploadResult, Uploader};

/// Uploads new and changed chunks and records them in the manifest.
pub struct Synchronizer {
    uploader: Arc<dyn Uploader>,
    store: Arc<dyn ChunkStore>,
    config: SyncConfig,
}

/// Mutable pass state shared by the workers.
#[derive(Default)]
struct PassOutcome {
    report: SyncReport,
    first_error: Option<SyncError>,
}

struct WorkerContext {
    uploader: Arc<dyn Uploader>,
    store: Arc<dyn ChunkStore>,
    manifest: SharedManifest,
    retry: RetryPolicy,
    queue: tokio::sync::Mutex<mpsc::Receiver<ChunkMeta>>,
    outcome: Mutex<PassOutcome>,
}

impl WorkerContext {
    fn halted(&self) -> bool {
        self.outcome
            .lock()
            .expect("lock poisoned")
            .first_error
            .is_some()
    }

    fn record_failure(&self, location: ChunkLocation, err: SyncError) {
        let mut outcome = self.outcome.lock().expect("lock poisoned");
        outcome.report.failed.push(location);
        if outcome.first_error.is_none() {
            outcome.first_error = Some(err);
        }
    }
}

impl Synchronizer {
    pub fn new(
        uploader: Arc<dyn Uploader>,
        store: Arc<dyn ChunkStore>,
        config: SyncConfig,
    ) -> SyncResult<Self> {
        if config.workers == 0 {
            return Err(SyncError::WorkerPool("worker count must be positive".into()));
        }
        Ok(Self {
            uploader,
            store,
            config,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Store the synchronizer reads chunk payloads from.
    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    /// Upload every chunk in `chunks` that is new or changed relative to
    /// `manifest`, updating the manifest entry for each successful upload.
    ///
    /// Blocks until all dispatched work has finished.
    pub async fn synchronize(
        &self,
        chunks: &[ChunkMeta],
        manifest: &SharedManifest,
    ) -> SyncResult<SyncReport> {
        let dirty: Vec<ChunkMeta> = {
            let manifest = manifest.lock().expect("lock poisoned");
            chunks.iter().filter(|c| manifest.is_dirty(c)).cloned().collect()
        };
        let skipped = chunks.len() - dirty.len();

        if dirty.is_empty() {
            debug!(chunks = chunks.len(), "no dirty chunks");
            return Ok(SyncReport {
                skipped,
                ..Default::default()
            });
        }

        let total_dirty = dirty.len();
        let (tx, rx) = mpsc::channel(total_dirty);
        for chunk in dirty {
            tx.try_send(chunk)
                .map_err(|e| SyncError::WorkerPool(format!("upload queue rejected chunk: {e}")))?;
        }
        drop(tx);

        let ctx = Arc::new(WorkerContext {
            uploader: Arc::clone(&self.uploader),
            store: Arc::clone(&self.store),
            manifest: Arc::clone(manifest),
            retry: self.config.retry.clone(),
            queue: tokio::sync::Mutex::new(rx),
            outcome: Mutex::new(PassOutcome {
                report: SyncReport {
                    skipped,
                    ..Default::default()
                },
                first_error: None,
            }),
        });

        let workers = self.config.workers.min(total_dirty);
        let mut set = JoinSet::new();
        for worker in 0..workers {
            set.spawn(run_worker(Arc::clone(&ctx), worker));
        }

        let mut pool_error = None;
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "upload worker aborted");
                pool_error.get_or_insert_with(|| SyncError::WorkerPool(e.to_string()));
            }
        }

        let leftover: Vec<ChunkLocation> = {
            let mut queue = ctx.queue.lock().await;
            let mut leftover = Vec::new();
            while let Ok(chunk) = queue.try_recv() {
                leftover.push(chunk.location);
            }
            leftover
        };

        let PassOutcome {
            mut report,
            first_error,
        } = std::mem::take(&mut *ctx.outcome.lock().expect("lock poisoned"));
        report.not_attempted = leftover;

        match first_error.or(pool_error) {
            None => {
                info!(
                    uploaded = report.uploaded.len(),
                    skipped = report.skipped,
                    "synchronization complete"
                );
                Ok(report)
            }
            Some(first) => {
                warn!(
                    uploaded = report.uploaded.len(),
                    failed = report.failed.len(),
                    not_attempted = report.not_attempted.len(),
                    "synchronization incomplete"
                );
                Err(SyncError::Incomplete {
                    first: Box::new(first),
                    report: Box::new(report),
                })
            }
        }
    }
}

async fn run_worker(ctx: Arc<WorkerContext>, worker: usize) {
    loop {
        if ctx.halted() {
            break;
        }
        let next = ctx.queue.lock().await.recv().await;
        let Some(chunk) = next else {
            break;
        };

        // Another pass may have uploaded this chunk since the diff.
        let still_dirty = ctx.manifest.lock().expect("lock poisoned").is_dirty(&chunk);
        if !still_dirty {
            ctx.outcome.lock().expect("lock poisoned").report.skipped += 1;
            continue;
        }

        let payload = match read_payload(&ctx.store, &chunk.location).await {
            Ok(payload) => payload,
            Err(e) => {
                error!(
                    worker,
                    location = %chunk.location,
                    error = %e,
                    "could not read chunk payload"
                );
                ctx.record_failure(chunk.location.clone(), e);
                continue;
            }
        };

        match upload_with_retry(ctx.uploader.as_ref(), &ctx.retry, &chunk, payload).await {
            Ok(()) => {
                let location = chunk.location.clone();
                ctx.manifest.lock().expect("lock poisoned").insert(chunk);
                ctx.outcome
                    .lock()
                    .expect("lock poisoned")
                    .report
                    .uploaded
                    .push(location.clone());
                debug!(worker, location = %location, "chunk uploaded");
            }
            Err(e) => {
                error!(worker, location = %chunk.location, error = %e, "chunk upload failed");
                let location = chunk.location.clone();
                ctx.record_failure(
                    location.clone(),
                    SyncError::Upload {
                        location,
                        source: e,
                    },
                );
            }
        }
    }
}

async fn read_payload(store: &Arc<dyn ChunkStore>, location: &ChunkLocation) -> SyncResult<Bytes> {
    let store = Arc::clone(store);
    let location = location.clone();
    let payload = tokio::task::spawn_blocking(move || store.get(&location))
        .await
        .map_err(|e| SyncError::WorkerPool(e.to_string()))??;
    Ok(Bytes::from(payload))
}

async fn upload_with_retry(
    uploader: &dyn Uploader,
    retry: &RetryPolicy,
    chunk: &ChunkMeta,
    payload: Bytes,
) -> UploadResult<()> {
    let mut failed_attempts = 0u32;
    loop {
        match uploader.upload_chunk(chunk, payload.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                failed_attempts += 1;
                if !retry.allows_retry(failed_attempts) {
                    return Err(e);
                }
                warn!(
                    location = %chunk.location,
                    attempt = failed_attempts,
                    error = %e,
                    "upload failed, retrying"
                );
                tokio::time::sleep(retry.backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uploader::UploadError;
    use async_trait::async_trait;
    use chunksync_store::InMemoryChunkStore;
    use chunksync_types::{ContentHasher, Manifest};
    use std::collections::{HashMap, HashSet};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records every call; fails for the configured locations.
    #[derive(Default)]
    struct MockUploader {
        calls: Mutex<HashMap<ChunkLocation, usize>>,
        fail_on: HashSet<ChunkLocation>,
        delay: Duration,
    }

    impl MockUploader {
        fn failing(locations: &[ChunkLocation]) -> Self {
            Self {
                fail_on: locations.iter().cloned().collect(),
                ..Default::default()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().values().sum()
        }

        fn calls_for(&self, location: &ChunkLocation) -> usize {
            self.calls.lock().unwrap().get(location).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl Uploader for MockUploader {
        async fn upload_chunk(&self, chunk: &ChunkMeta, payload: Bytes) -> UploadResult<()> {
            assert!(ContentHasher::CHUNK.verify(&payload, &chunk.content_hash));
            *self
                .calls
                .lock()
                .unwrap()
                .entry(chunk.location.clone())
                .or_default() += 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail_on.contains(&chunk.location) {
                return Err(UploadError::Rejected("remote said no".into()));
            }
            Ok(())
        }
    }

    /// Fails the first `failures` calls, then succeeds.
    struct FlakyUploader {
        remaining_failures: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Uploader for FlakyUploader {
        async fn upload_chunk(&self, _chunk: &ChunkMeta, _payload: Bytes) -> UploadResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.remaining_failures.load(Ordering::SeqCst);
            if left > 0 {
                self.remaining_failures.store(left - 1, Ordering::SeqCst);
                return Err(UploadError::Transport("connection reset".into()));
            }
            Ok(())
        }
    }

    fn stored_chunks(store: &InMemoryChunkStore, payloads: &[&[u8]]) -> Vec<ChunkMeta> {
        payloads
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let loc = store.location(Path::new("/src/file.bin"), i as u64);
                store.put(&loc, p).unwrap();
                ChunkMeta::for_payload(loc, i as u64, p)
            })
            .collect()
    }

    fn synchronizer(
        uploader: Arc<dyn Uploader>,
        store: Arc<InMemoryChunkStore>,
        workers: usize,
    ) -> Synchronizer {
        Synchronizer::new(
            uploader,
            store,
            SyncConfig {
                workers,
                retry: RetryPolicy::none(),
            },
        )
        .unwrap()
    }

    #[test]
    fn zero_workers_rejected() {
        let result = Synchronizer::new(
            Arc::new(MockUploader::default()),
            Arc::new(InMemoryChunkStore::new()),
            SyncConfig {
                workers: 0,
                retry: RetryPolicy::none(),
            },
        );
        assert!(matches!(result, Err(SyncError::WorkerPool(_))));
    }

    #[tokio::test]
    async fn uploads_everything_into_empty_manifest() {
        let store = Arc::new(InMemoryChunkStore::new());
        let chunks = stored_chunks(&store, &[b"a", b"b", b"c"]);
        let uploader = Arc::new(MockUploader::default());
        let sync = synchronizer(uploader.clone(), store, 4);
        let manifest = Manifest::new().into_shared();

        let report = sync.synchronize(&chunks, &manifest).await.unwrap();
        assert_eq!(report.uploaded_count(), 3);
        assert_eq!(report.skipped, 0);
        assert!(report.is_complete());
        assert_eq!(uploader.total_calls(), 3);

        let manifest = manifest.lock().unwrap();
        assert_eq!(manifest.len(), 3);
        for chunk in &chunks {
            assert_eq!(manifest.get(&chunk.location), Some(chunk));
        }
    }

    #[tokio::test]
    async fn second_run_uploads_nothing() {
        let store = Arc::new(InMemoryChunkStore::new());
        let chunks = stored_chunks(&store, &[b"one", b"two", b"three", b"four"]);
        let uploader = Arc::new(MockUploader::default());
        let sync = synchronizer(uploader.clone(), store, 4);
        let manifest = Manifest::new().into_shared();

        sync.synchronize(&chunks, &manifest).await.unwrap();
        let second = sync.synchronize(&chunks, &manifest).await.unwrap();

        assert_eq!(second.uploaded_count(), 0);
        assert_eq!(second.skipped, 4);
        assert_eq!(uploader.total_calls(), 4);
    }

    #[tokio::test]
    async fn only_changed_chunk_is_uploaded() {
        let store = Arc::new(InMemoryChunkStore::new());
        let chunks = stored_chunks(&store, &[b"aa", b"bb", b"cc"]);
        let uploader = Arc::new(MockUploader::default());
        let sync = synchronizer(uploader.clone(), store.clone(), 4);
        let manifest = Manifest::new().into_shared();
        sync.synchronize(&chunks, &manifest).await.unwrap();
        let before = manifest.lock().unwrap().clone();

        let changed = stored_chunks(&store, &[b"aa", b"BB", b"cc"]);
        let report = sync.synchronize(&changed, &manifest).await.unwrap();

        assert_eq!(report.uploaded, vec![changed[1].location.clone()]);
        assert_eq!(report.skipped, 2);
        assert_eq!(uploader.calls_for(&changed[1].location), 2);

        let after = manifest.lock().unwrap();
        assert_eq!(after.get(&changed[1].location), Some(&changed[1]));
        assert_eq!(after.get(&chunks[0].location), before.get(&chunks[0].location));
        assert_eq!(after.get(&chunks[2].location), before.get(&chunks[2].location));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn each_dirty_chunk_uploaded_exactly_once() {
        let store = Arc::new(InMemoryChunkStore::new());
        let payloads: Vec<Vec<u8>> = (0..64u32).map(|i| i.to_le_bytes().repeat(8)).collect();
        let refs: Vec<&[u8]> = payloads.iter().map(|p| p.as_slice()).collect();
        let chunks = stored_chunks(&store, &refs);
        let uploader = Arc::new(MockUploader::slow(Duration::from_millis(2)));
        let sync = synchronizer(uploader.clone(), store, 4);
        let manifest = Manifest::new().into_shared();

        let report = sync.synchronize(&chunks, &manifest).await.unwrap();

        assert_eq!(report.uploaded_count(), 64);
        let unique: HashSet<_> = report.uploaded.iter().collect();
        assert_eq!(unique.len(), 64);
        for chunk in &chunks {
            assert_eq!(uploader.calls_for(&chunk.location), 1);
        }
        assert_eq!(manifest.lock().unwrap().len(), 64);
    }

    #[tokio::test]
    async fn failure_is_reported_with_partial_progress() {
        let store = Arc::new(InMemoryChunkStore::new());
        let chunks = stored_chunks(&store, &[b"a", b"b", b"c", b"d"]);
        let bad = chunks[2].location.clone();
        let uploader = Arc::new(MockUploader::failing(&[bad.clone()]));
        let sync = synchronizer(uploader, store, 1);
        let manifest = Manifest::new().into_shared();

        let err = sync.synchronize(&chunks, &manifest).await.unwrap_err();
        let report = err.report().expect("report attached");

        // One worker: chunks 0 and 1 land, 2 fails, 3 is never taken.
        assert_eq!(report.uploaded.len(), 2);
        assert_eq!(report.failed, vec![bad.clone()]);
        assert_eq!(report.not_attempted, vec![chunks[3].location.clone()]);
        assert!(matches!(
            err,
            SyncError::Incomplete { ref first, .. } if matches!(**first, SyncError::Upload { .. })
        ));

        let manifest = manifest.lock().unwrap();
        assert_eq!(manifest.len(), 2);
        assert!(manifest.get(&bad).is_none());
    }

    /// Fails `failing` only once every worker holds an upload, so the
    /// failure always lands while siblings are mid-flight.
    struct GatedUploader {
        failing: ChunkLocation,
        workers: usize,
        started: AtomicUsize,
        sibling_delay: Duration,
    }

    #[async_trait]
    impl Uploader for GatedUploader {
        async fn upload_chunk(&self, chunk: &ChunkMeta, _payload: Bytes) -> UploadResult<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            if chunk.location == self.failing {
                let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
                while self.started.load(Ordering::SeqCst) < self.workers {
                    assert!(tokio::time::Instant::now() < deadline, "siblings never started");
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                return Err(UploadError::Transport("connection reset".into()));
            }
            tokio::time::sleep(self.sibling_delay).await;
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn in_flight_siblings_land_after_failure() {
        let store = Arc::new(InMemoryChunkStore::new());
        let payloads: Vec<Vec<u8>> = (0..8u8).map(|i| vec![i; 16]).collect();
        let refs: Vec<&[u8]> = payloads.iter().map(|p| p.as_slice()).collect();
        let chunks = stored_chunks(&store, &refs);
        let uploader = Arc::new(GatedUploader {
            failing: chunks[0].location.clone(),
            workers: 4,
            started: AtomicUsize::new(0),
            sibling_delay: Duration::from_millis(200),
        });
        let sync = synchronizer(uploader, store, 4);
        let manifest = Manifest::new().into_shared();

        let err = sync.synchronize(&chunks, &manifest).await.unwrap_err();
        let report = err.report().expect("report attached");

        let mut uploaded = report.uploaded.clone();
        uploaded.sort();
        let siblings: Vec<ChunkLocation> =
            chunks[1..4].iter().map(|c| c.location.clone()).collect();
        assert_eq!(uploaded, siblings);
        assert_eq!(report.failed, vec![chunks[0].location.clone()]);
        assert_eq!(report.not_attempted.len(), 4);
        assert_eq!(
            report.uploaded.len()
                + report.failed.len()
                + report.not_attempted.len()
                + report.skipped,
            chunks.len()
        );

        let manifest = manifest.lock().unwrap();
        assert!(manifest.get(&chunks[0].location).is_none());
        for location in &siblings {
            assert!(manifest.get(location).is_some());
        }
        assert_eq!(manifest.len(), 3);
    }

    #[tokio::test]
    async fn failed_chunk_stays_dirty_for_next_pass() {
        let store = Arc::new(InMemoryChunkStore::new());
        let chunks = stored_chunks(&store, &[b"x", b"y"]);
        let manifest = Manifest::new().into_shared();

        let failing = synchronizer(
            Arc::new(MockUploader::failing(&[chunks[0].location.clone()])),
            store.clone(),
            4,
        );
        assert!(failing.synchronize(&chunks, &manifest).await.is_err());

        let healthy = Arc::new(MockUploader::default());
        let report = synchronizer(healthy.clone(), store, 4)
            .synchronize(&chunks, &manifest)
            .await
            .unwrap();
        assert!(report.uploaded.contains(&chunks[0].location));
        assert_eq!(manifest.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_payload_fails_the_chunk() {
        let store = Arc::new(InMemoryChunkStore::new());
        let chunk = ChunkMeta::for_payload("/nowhere.chunk.0".into(), 0, b"lost");
        let sync = synchronizer(Arc::new(MockUploader::default()), store, 2);
        let manifest = Manifest::new().into_shared();

        let err = sync.synchronize(&[chunk], &manifest).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Incomplete { ref first, .. } if matches!(**first, SyncError::Store(_))
        ));
        assert!(manifest.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn retries_until_success() {
        let store = Arc::new(InMemoryChunkStore::new());
        let chunks = stored_chunks(&store, &[b"retry me"]);
        let uploader = Arc::new(FlakyUploader {
            remaining_failures: AtomicUsize::new(2),
            calls: AtomicUsize::new(0),
        });
        let sync = Synchronizer::new(
            uploader.clone(),
            store,
            SyncConfig {
                workers: 1,
                retry: RetryPolicy::fixed(3, Duration::from_millis(1)),
            },
        )
        .unwrap();
        let manifest = Manifest::new().into_shared();

        let report = sync.synchronize(&chunks, &manifest).await.unwrap();
        assert_eq!(report.uploaded_count(), 1);
        assert_eq!(uploader.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_retry_budget() {
        let store = Arc::new(InMemoryChunkStore::new());
        let chunks = stored_chunks(&store, &[b"never"]);
        let uploader = Arc::new(FlakyUploader {
            remaining_failures: AtomicUsize::new(10),
            calls: AtomicUsize::new(0),
        });
        let sync = Synchronizer::new(
            uploader.clone(),
            store,
            SyncConfig {
                workers: 1,
                retry: RetryPolicy::fixed(2, Duration::from_millis(1)),
            },
        )
        .unwrap();
        let manifest = Manifest::new().into_shared();

        assert!(sync.synchronize(&chunks, &manifest).await.is_err());
        assert_eq!(uploader.calls.load(Ordering::SeqCst), 3);
        assert!(manifest.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_chunk_list_is_a_no_op() {
        let store = Arc::new(InMemoryChunkStore::new());
        let uploader = Arc::new(MockUploader::default());
        let sync = synchronizer(uploader.clone(), store, 4);
        let report = sync
            .synchronize(&[], &Manifest::new().into_shared())
            .await
            .unwrap();
        assert_eq!(report, SyncReport::default());
        assert_eq!(uploader.total_calls(), 0);
    }
}
