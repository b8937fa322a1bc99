use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use chunksync_chunker::{ChunkMode, DEFAULT_CHUNK_SIZE};
use chunksync_sync::{RetryPolicy, SyncConfig};
use chunksync_types::DEFAULT_WORKERS;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "chunksync.toml";

pub const ENV_CHUNK_SIZE: &str = "CHUNKSYNC_CHUNK_SIZE";
pub const ENV_REMOTE_DIR: &str = "CHUNKSYNC_REMOTE_DIR";
pub const ENV_MAX_RETRIES: &str = "CHUNKSYNC_MAX_RETRIES";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chunk size in bytes.
    pub chunk_size: usize,
    /// Directory chunks are uploaded into.
    pub remote_dir: Option<PathBuf>,
    /// Local chunk directory; chunks sit beside the source file when unset.
    pub chunk_dir: Option<PathBuf>,
    pub workers: usize,
    pub parallel_chunking: bool,
    pub idle_interval_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            remote_dir: None,
            chunk_dir: None,
            workers: DEFAULT_WORKERS,
            parallel_chunking: false,
            idle_interval_secs: 10,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl Config {
    /// Resolve the effective config: file, then environment, then validation.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<()> {
        if let Some(v) = lookup(ENV_CHUNK_SIZE) {
            self.chunk_size = v
                .parse()
                .with_context(|| format!("{ENV_CHUNK_SIZE}={v} is not a byte count"))?;
        }
        if let Some(v) = lookup(ENV_REMOTE_DIR) {
            self.remote_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup(ENV_MAX_RETRIES) {
            self.max_retries = v
                .parse()
                .with_context(|| format!("{ENV_MAX_RETRIES}={v} is not a retry count"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chunk_size == 0 {
            bail!("chunk_size must be positive");
        }
        if self.workers == 0 {
            bail!("workers must be positive");
        }
        if self.remote_dir.is_none() {
            bail!(
                "remote_dir is not configured (set it in {DEFAULT_CONFIG_FILE} or {ENV_REMOTE_DIR})"
            );
        }
        Ok(())
    }

    pub fn remote_dir(&self) -> anyhow::Result<&Path> {
        self.remote_dir
            .as_deref()
            .context("remote_dir is not configured")
    }

    pub fn chunk_mode(&self) -> ChunkMode {
        if self.parallel_chunking {
            ChunkMode::Parallel
        } else {
            ChunkMode::Sequential
        }
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            workers: self.workers,
            retry: RetryPolicy::fixed(
                self.max_retries,
                Duration::from_millis(self.retry_backoff_ms),
            ),
        }
    }
}
