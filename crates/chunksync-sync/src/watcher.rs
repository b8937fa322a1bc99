use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::types::ChangeEvent;

/// Forwards filesystem changes of one file into a [`ChangeEvent`] channel.
///
/// The parent directory is watched rather than the file itself, so editors
/// that save by replacing the file keep producing events. Sends never block:
/// when the channel is full a pass is already pending and the event is
/// dropped. Watching stops when the `FileWatcher` is dropped.
pub struct FileWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    pub fn start(path: &Path, changes: mpsc::Sender<ChangeEvent>) -> SyncResult<Self> {
        let file_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| {
                SyncError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} does not name a file", path.display()),
                ))
            })?;
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if is_relevant(&event, &file_name) => {
                debug!(kind = ?event.kind, "source file changed");
                if let Err(mpsc::error::TrySendError::Closed(_)) = changes.try_send(ChangeEvent) {
                    debug!("change receiver gone, dropping event");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "file watch error"),
        })?;
        watcher.watch(&parent, RecursiveMode::NonRecursive)?;

        debug!(path = %path.display(), dir = %parent.display(), "watching file");
        Ok(Self {
            path: path.to_path_buf(),
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_relevant(event: &Event, file_name: &OsString) -> bool {
    let kind_matches = match event.kind {
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) | EventKind::Create(_) => true,
        _ => false,
    };
    kind_matches
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}
