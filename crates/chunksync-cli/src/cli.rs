use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "chunksync",
    about = "Incremental chunk-level file synchronization",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file (defaults to ./chunksync.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one synchronization pass
    Sync(FileArgs),
    /// Sync, then keep syncing on changes until Ctrl-C
    Watch(FileArgs),
    /// List chunks that would be uploaded
    Status(FileArgs),
    /// Rebuild a file from its manifest and stored chunks
    Reconstruct(ReconstructArgs),
    /// Re-hash stored chunks against the manifest
    Verify(FileArgs),
}

#[derive(Args)]
pub struct FileArgs {
    pub file: PathBuf,
}

#[derive(Args)]
pub struct ReconstructArgs {
    pub file: PathBuf,
    pub output: PathBuf,
}
