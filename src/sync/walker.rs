//! Recursive subtree replication.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{is_not_found, ReplicaError};
use crate::fs::FileSystem;
use crate::sync::action::Action;
use crate::sync::path::relative_path;
use crate::sync::source::SourceStats;
use crate::sync::watch_set::WatchSet;
use crate::transport::Transport;

/// Walks a directory subtree, emitting `mkdir` and `write` actions and
/// recording everything it finds in the watch set.
///
/// Uses an explicit stack, so depth is not bounded by the call stack. A
/// directory's `mkdir` is always sent before anything inside it.
pub struct DirectoryWalker<'a> {
    fs: &'a dyn FileSystem,
    transport: &'a dyn Transport,
    root: &'a Path,
    watched: &'a mut WatchSet,
    stats: &'a mut SourceStats,
}

impl<'a> DirectoryWalker<'a> {
    pub fn new(
        fs: &'a dyn FileSystem,
        transport: &'a dyn Transport,
        root: &'a Path,
        watched: &'a mut WatchSet,
        stats: &'a mut SourceStats,
    ) -> Self {
        Self {
            fs,
            transport,
            root,
            watched,
            stats,
        }
    }

    /// Replicate everything below `start`, which must already be watched.
    pub async fn walk(self, start: &Path) -> Result<()> {
        let mut to_scan: Vec<PathBuf> = vec![start.to_path_buf()];

        while let Some(dir) = to_scan.pop() {
            let Some(names) = unless_vanished(self.fs.list_dir(&dir).await, &dir, self.stats)?
            else {
                continue;
            };

            for name in names {
                let path = dir.join(&name);
                let Some(relative) = wire_path(self.root, &path, self.stats)? else {
                    continue;
                };
                if is_skipped_link(self.fs, &path, self.stats).await? {
                    continue;
                }

                if self.fs.is_dir(&path).await? {
                    emit(self.transport, self.stats, Action::mkdir(relative.as_str())).await?;
                    self.watched.insert_dir(relative);
                    if watch(self.fs, &path, self.stats).await? {
                        to_scan.push(path);
                    }
                } else {
                    let read = self.fs.read_file(&path).await;
                    let Some(content) = unless_vanished(read, &path, self.stats)? else {
                        continue;
                    };
                    emit(self.transport, self.stats, Action::write(relative.as_str(), content))
                        .await?;
                    self.watched.insert_file(relative);
                }
            }
        }

        Ok(())
    }
}

/// Send one action and account for it.
pub(crate) async fn emit(
    transport: &dyn Transport,
    stats: &mut SourceStats,
    action: Action,
) -> Result<()> {
    debug!(
        action = action.name(),
        path = action.relative_path(),
        bytes = action.payload_len(),
        "Sending action"
    );
    let bytes = action.payload_len() as u64;
    transport.call(action).await?;
    stats.actions_sent += 1;
    stats.bytes_sent += bytes;
    Ok(())
}

/// Wire form of `path`, or `None` when its name cannot be sent.
pub(crate) fn wire_path(
    root: &Path,
    path: &Path,
    stats: &mut SourceStats,
) -> Result<Option<String>> {
    match relative_path(root, path) {
        Ok(relative) => Ok(Some(relative)),
        Err(e @ ReplicaError::NonUtf8Path { .. }) => {
            warn!("Skipping {e}");
            stats.unrepresentable_skipped += 1;
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Symbolic links are not replicated. Following one could leave the root
/// or loop forever.
pub(crate) async fn is_skipped_link(
    fs: &dyn FileSystem,
    path: &Path,
    stats: &mut SourceStats,
) -> Result<bool> {
    if !fs.is_symlink(path).await? {
        return Ok(false);
    }
    debug!("Skipping symbolic link {}", path.display());
    stats.symlinks_skipped += 1;
    Ok(true)
}

/// Register a watch. Returns false when the directory is already gone.
pub(crate) async fn watch(
    fs: &dyn FileSystem,
    path: &Path,
    stats: &mut SourceStats,
) -> Result<bool> {
    Ok(unless_vanished(fs.watch_dir(path).await, path, stats)?.is_some())
}

/// Turn a not-found failure into `None`; the matching removal event will
/// reconcile whatever was skipped. Any other error propagates.
pub(crate) fn unless_vanished<T>(
    result: Result<T>,
    path: &Path,
    stats: &mut SourceStats,
) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if is_not_found(&e) => {
            debug!("Skipping vanished path: {}", path.display());
            stats.vanished_skipped += 1;
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
