//! Incremental chunk synchronization.
//!
//! Compares freshly split chunks against the manifest, uploads the ones that
//! changed through a bounded worker pool, and records each success in the
//! manifest. A [`SyncLoop`] repeats this on change events and an idle timer.
//!
//! # Key Types
//!
//! - [`Uploader`] - The one remote operation: store a chunk payload
//! - [`Synchronizer`] - Dirty detection plus concurrent upload
//! - [`SyncPipeline`] - Split, synchronize, save for one source file
//! - [`SyncLoop`] - Cancellable trigger loop around a pipeline
//! - [`FileWatcher`] - Filesystem events into [`ChangeEvent`]s
//!
//! # Design Rules
//!
//! 1. A manifest entry is written only after its upload succeeded.
//! 2. Within one pass each dirty chunk is uploaded at most once.
//! 3. After the first failure no new chunk is dequeued; running uploads
//!    finish and the report says which chunks landed.

pub mod error;
pub mod pipeline;
pub mod synchronizer;
pub mod trigger;
pub mod types;
pub mod uploader;
pub mod watcher;

pub use error::{SyncError, SyncResult};
pub use pipeline::SyncPipeline;
pub use synchronizer::Synchronizer;
pub use trigger::{SyncLoop, DEFAULT_IDLE_INTERVAL};
pub use types::{ChangeEvent, LoopExit, RetryPolicy, SyncConfig, SyncReport};
pub use uploader::{DirectoryUploader, UploadError, UploadResult, Uploader};
pub use watcher::FileWatcher;
