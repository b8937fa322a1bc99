use std::path::Path;
use std::sync::Arc;

use anyhow::bail;
use chunksync_chunker::{reconstruct, verify_chunks, DefaultFileChunker, VerifyReport};
use chunksync_store::{
    default_manifest_path, ChunkStore, FsChunkStore, JsonManifestStore, ManifestStore,
};
use chunksync_sync::{
    DirectoryUploader, FileWatcher, LoopExit, SyncLoop, SyncPipeline, SyncReport, Synchronizer,
};
use chunksync_types::ChunkMeta;
use colored::Colorize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::*;
use crate::config::Config;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let format = cli.format;
    match cli.command {
        Command::Sync(args) => cmd_sync(&config, &args.file, format).await,
        Command::Watch(args) => cmd_watch(&config, &args.file, format).await,
        Command::Status(args) => cmd_status(&config, &args.file, format).await,
        Command::Reconstruct(args) => cmd_reconstruct(&config, &args.file, &args.output, format),
        Command::Verify(args) => cmd_verify(&config, &args.file, format),
    }
}

fn chunk_store(config: &Config) -> Arc<dyn ChunkStore> {
    match &config.chunk_dir {
        Some(dir) => Arc::new(FsChunkStore::with_dir(dir)),
        None => Arc::new(FsChunkStore::new()),
    }
}

fn build_pipeline(config: &Config, file: &Path) -> anyhow::Result<SyncPipeline> {
    let store = chunk_store(config);
    let chunker = DefaultFileChunker::new(config.chunk_size, Arc::clone(&store))?
        .with_workers(config.workers)?;
    let uploader = DirectoryUploader::new(config.remote_dir()?);
    let synchronizer = Synchronizer::new(Arc::new(uploader), store, config.sync_config())?;
    let pipeline = SyncPipeline::new(
        file,
        Arc::new(chunker),
        Arc::new(JsonManifestStore::new()),
        synchronizer,
    )?
    .with_mode(config.chunk_mode());
    Ok(pipeline)
}

async fn cmd_sync(config: &Config, file: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config, file)?;
    match pipeline.run_pass().await {
        Ok(report) => {
            print_report(&report, format)?;
            Ok(())
        }
        Err(e) => {
            if let Some(report) = e.report() {
                print_report(report, format)?;
            }
            Err(e.into())
        }
    }
}

async fn cmd_watch(config: &Config, file: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config, file)?;
    let report = pipeline.run_pass().await?;
    print_report(&report, format)?;

    let (tx, rx) = mpsc::channel(1);
    let _watcher = FileWatcher::start(file, tx)?;
    let sync_loop = SyncLoop::new(pipeline).with_idle_interval(config.idle_interval());

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("interrupt received, stopping"),
                Err(e) => warn!(error = %e, "cannot listen for Ctrl-C"),
            }
            cancel.cancel();
        }
    });

    if format == OutputFormat::Text {
        println!("Watching {} (Ctrl+C to stop)...", file.display().to_string().bold());
    }
    let LoopExit::Cancelled { passes } = sync_loop.run(rx, cancel).await?;
    match format {
        OutputFormat::Text => println!("{} Stopped after {} passes.", "✓".green().bold(), passes),
        OutputFormat::Json => println!("{}", json!({ "stopped": true, "passes": passes })),
    }
    Ok(())
}

async fn cmd_status(config: &Config, file: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config, file)?;
    let dirty = pipeline.status().await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&dirty)?),
        OutputFormat::Text => print_dirty(&dirty),
    }
    Ok(())
}

fn cmd_reconstruct(
    config: &Config,
    file: &Path,
    output: &Path,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let manifest = JsonManifestStore::new().load(&default_manifest_path(file))?;
    if manifest.is_empty() {
        bail!("no synchronized chunks recorded for {}", file.display());
    }
    let store = chunk_store(config);
    let written = reconstruct(&manifest, store.as_ref(), output)?;
    match format {
        OutputFormat::Text => println!(
            "{} Rebuilt {} from {} chunks ({} bytes)",
            "✓".green().bold(),
            output.display().to_string().bold(),
            manifest.len(),
            written
        ),
        OutputFormat::Json => println!(
            "{}",
            json!({ "output": output, "chunks": manifest.len(), "bytes": written })
        ),
    }
    Ok(())
}

fn cmd_verify(config: &Config, file: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let manifest = JsonManifestStore::new().load(&default_manifest_path(file))?;
    let store = chunk_store(config);
    let report = verify_chunks(&manifest, store.as_ref())?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&verify_json(&report))?),
        OutputFormat::Text => print_verify(&report),
    }
    if !report.is_clean() {
        bail!(
            "{} missing and {} corrupt chunks",
            report.missing.len(),
            report.mismatched.len()
        );
    }
    Ok(())
}

fn print_report(report: &SyncReport, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    let mark = if report.is_complete() {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    println!(
        "{} {} uploaded, {} unchanged",
        mark,
        report.uploaded.len().to_string().bold(),
        report.skipped
    );
    for location in &report.uploaded {
        println!("  {} {}", "uploaded:".green(), location);
    }
    for location in &report.failed {
        println!("  {} {}", "failed:".red(), location);
    }
    for location in &report.not_attempted {
        println!("  {} {}", "skipped:".yellow(), location);
    }
    Ok(())
}

fn print_dirty(dirty: &[ChunkMeta]) {
    if dirty.is_empty() {
        println!("{} All chunks synchronized.", "✓".green().bold());
        return;
    }
    println!("{} chunks to upload:", dirty.len().to_string().bold());
    for chunk in dirty {
        println!(
            "  {:>6} {} {}",
            chunk.index.to_string().yellow(),
            chunk.content_hash.short_hex().dimmed(),
            chunk.location
        );
    }
}

fn print_verify(report: &VerifyReport) {
    if report.is_clean() {
        println!("{} {} chunks verified.", "✓".green().bold(), report.chunks_checked);
        return;
    }
    for location in &report.missing {
        println!("  {} {}", "missing:".red(), location);
    }
    for location in &report.mismatched {
        println!("  {} {}", "corrupt:".red(), location);
    }
}

fn verify_json(report: &VerifyReport) -> serde_json::Value {
    json!({
        "chunks_checked": report.chunks_checked,
        "missing": report.missing,
        "mismatched": report.mismatched,
        "clean": report.is_clean(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(dir: &Path) -> Config {
        Config {
            chunk_size: 1000,
            remote_dir: Some(dir.join("remote")),
            chunk_dir: Some(dir.join("chunks")),
            ..Default::default()
        }
    }

    fn source(dir: &Path, len: usize) -> PathBuf {
        let path = dir.join("input.bin");
        let data: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();
        std::fs::write(&path, data).unwrap();
        path
    }

    #[tokio::test]
    async fn sync_then_reconstruct_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let file = source(dir.path(), 4500);

        cmd_sync(&config, &file, OutputFormat::Json).await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path().join("remote")).unwrap().count(), 5);

        let out = dir.path().join("rebuilt.bin");
        cmd_reconstruct(&config, &file, &out, OutputFormat::Text).unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), std::fs::read(&file).unwrap());

        cmd_verify(&config, &file, OutputFormat::Text).unwrap();
    }

    #[tokio::test]
    async fn verify_fails_on_tampered_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let file = source(dir.path(), 2000);
        cmd_sync(&config, &file, OutputFormat::Text).await.unwrap();

        std::fs::write(dir.path().join("chunks/input.bin.chunk.1"), b"tampered").unwrap();
        assert!(cmd_verify(&config, &file, OutputFormat::Json).is_err());
    }

    #[test]
    fn reconstruct_without_manifest_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let file = source(dir.path(), 10);
        let out = dir.path().join("o");
        assert!(cmd_reconstruct(&config, &file, &out, OutputFormat::Text).is_err());
    }

    #[tokio::test]
    async fn status_after_sync_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let file = source(dir.path(), 3000);

        let pipeline = build_pipeline(&config, &file).unwrap();
        assert_eq!(pipeline.status().await.unwrap().len(), 3);
        cmd_sync(&config, &file, OutputFormat::Text).await.unwrap();

        let pipeline = build_pipeline(&config, &file).unwrap();
        assert!(pipeline.status().await.unwrap().is_empty());
    }
}
