use std::time::Duration;

use chunksync_types::{ChunkLocation, DEFAULT_WORKERS};
use serde::Serialize;

/// Per-chunk outcome of one synchronization call.
///
/// `uploaded` is in completion order. Clean chunks only count towards
/// `skipped`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Chunks whose upload succeeded and whose manifest entry was written.
    pub uploaded: Vec<ChunkLocation>,
    /// Chunks found clean, either up front or on the worker re-check.
    pub skipped: usize,
    /// Chunks whose upload failed after all retries.
    pub failed: Vec<ChunkLocation>,
    /// Dirty chunks left in the queue once a failure halted the pass.
    pub not_attempted: Vec<ChunkLocation>,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.not_attempted.is_empty()
    }

    pub fn uploaded_count(&self) -> usize {
        self.uploaded.len()
    }
}

/// Upload retry behavior.
///
/// A failed upload is retried up to `max_retries` times, sleeping a fixed
/// `backoff` before each retry. `max_retries == 0` means one attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    pub fn fixed(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Whether another attempt is allowed after `failed_attempts` failures.
    pub fn allows_retry(&self, failed_attempts: u32) -> bool {
        failed_attempts <= self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Synchronizer settings.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Number of upload workers.
    pub workers: usize,
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            retry: RetryPolicy::none(),
        }
    }
}

/// Signal that the watched source file may have changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeEvent;

/// Why the trigger loop stopped without an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopExit {
    /// Shutdown was requested; `passes` synchronization passes had run.
    Cancelled { passes: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_budget() {
        let policy = RetryPolicy::fixed(2, Duration::from_millis(10));
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
        assert!(!RetryPolicy::none().allows_retry(1));
    }

    #[test]
    fn report_completeness() {
        let mut report = SyncReport::default();
        assert!(report.is_complete());
        report.not_attempted.push("a.chunk.0".into());
        assert!(!report.is_complete());
    }

    #[test]
    fn report_serializes_locations_as_strings() {
        let report = SyncReport {
            uploaded: vec!["f.chunk.0".into()],
            skipped: 3,
            ..Default::default()
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["uploaded"][0], "f.chunk.0");
        assert_eq!(value["skipped"], 3);
    }

    #[test]
    fn default_config_uses_pool_of_four() {
        assert_eq!(SyncConfig::default().workers, 4);
    }
}
