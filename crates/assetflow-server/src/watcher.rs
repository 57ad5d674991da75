//! Filesystem change events.

use std::path::PathBuf;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::server::ServerError;

/// Recursive watcher over a set of directories.
///
/// Every created, modified or removed path is forwarded on the returned
/// channel. Dropping the watcher unsubscribes and closes the channel.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Watch `paths` recursively. Directories that do not exist are skipped.
    pub fn new(paths: &[PathBuf]) -> Result<(Self, mpsc::UnboundedReceiver<PathBuf>), ServerError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) if is_change(&event.kind) => {
                    for path in event.paths {
                        let _ = tx.send(path);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Watch error: {}", e),
            }
        })
        .map_err(|e| ServerError::Watch(e.to_string()))?;

        for path in paths {
            if !path.exists() {
                tracing::warn!("Not watching {}: directory does not exist", path.display());
                continue;
            }
            watcher
                .watch(path, RecursiveMode::Recursive)
                .map_err(|e| ServerError::Watch(format!("{}: {}", path.display(), e)))?;
            tracing::debug!("Watching {}", path.display());
        }

        Ok((Self { _watcher: watcher }, rx))
    }
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}
