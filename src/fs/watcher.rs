//! Directory watcher for real-time replication.
//!
//! Wraps a `notify` watcher registered per directory (non-recursive) and
//! forwards translated events into a single-consumer channel.

use anyhow::{anyhow, Context, Result};
use notify::{
    event::{ModifyKind, RenameMode},
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{trace, warn};

use crate::fs::types::{EventSender, FsEvent};

/// Per-directory watch registrations backed by the platform notifier.
pub struct DirWatcher {
    watcher: Mutex<RecommendedWatcher>,
}

impl DirWatcher {
    /// Create a watcher that pushes every translated event into `sender`.
    pub fn new(sender: EventSender) -> Result<Self> {
        let watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    for fs_event in translate(event) {
                        // The receiver is gone once the session ends.
                        let _ = sender.send(fs_event);
                    }
                }
                Err(err) => warn!("Watch error: {err}"),
            },
            Config::default().with_poll_interval(Duration::from_secs(1)),
        )
        .context("Failed to create filesystem watcher")?;

        Ok(Self {
            watcher: Mutex::new(watcher),
        })
    }

    pub fn watch(&self, path: &Path) -> Result<()> {
        let mut watcher = self
            .watcher
            .lock()
            .map_err(|_| anyhow!("watcher lock poisoned"))?;
        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(io_aware)
            .with_context(|| format!("Failed to watch directory: {}", path.display()))
    }

    pub fn unwatch(&self, path: &Path) -> Result<()> {
        let mut watcher = self
            .watcher
            .lock()
            .map_err(|_| anyhow!("watcher lock poisoned"))?;
        watcher
            .unwatch(path)
            .map_err(|err| match err.kind {
                // inotify already dropped the watch of a deleted directory.
                notify::ErrorKind::Io(ref io_err) if io_err.kind() == io::ErrorKind::InvalidInput => {
                    io::Error::new(io::ErrorKind::NotFound, "watch already removed").into()
                }
                _ => io_aware(err),
            })
            .with_context(|| format!("Failed to unwatch directory: {}", path.display()))
    }
}

/// Surface missing paths and missing watches as `io::ErrorKind::NotFound`.
fn io_aware(err: notify::Error) -> anyhow::Error {
    match err.kind {
        notify::ErrorKind::Io(io_err) => io_err.into(),
        notify::ErrorKind::PathNotFound | notify::ErrorKind::WatchNotFound => {
            io::Error::new(io::ErrorKind::NotFound, "no such path or watch").into()
        }
        kind => notify::Error::new(kind).set_paths(err.paths).into(),
    }
}

/// Map a raw notify event onto replication events.
///
/// Renames become a removal of the old name and an addition of the new one.
/// Metadata, access and directory-modify events carry no content change and
/// are dropped.
pub fn translate(event: Event) -> Vec<FsEvent> {
    match event.kind {
        EventKind::Create(_) => event.paths.into_iter().map(FsEvent::added).collect(),
        EventKind::Remove(_) => event.paths.into_iter().map(FsEvent::removed).collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => translate_rename(mode, event.paths),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => event
            .paths
            .into_iter()
            .filter(|p| !p.is_dir())
            .map(FsEvent::modified)
            .collect(),
        other => {
            trace!("Ignoring event kind {other:?}");
            Vec::new()
        }
    }
}

fn translate_rename(mode: RenameMode, paths: Vec<std::path::PathBuf>) -> Vec<FsEvent> {
    match mode {
        RenameMode::From => paths.into_iter().map(FsEvent::removed).collect(),
        RenameMode::To => paths.into_iter().map(FsEvent::added).collect(),
        RenameMode::Both => {
            let mut paths = paths.into_iter();
            let mut events = Vec::with_capacity(2);
            if let Some(from) = paths.next() {
                events.push(FsEvent::removed(from));
            }
            if let Some(to) = paths.next() {
                events.push(FsEvent::added(to));
            }
            events
        }
        // Backends that cannot tell the two halves apart.
        _ => paths
            .into_iter()
            .map(|p| {
                if p.exists() {
                    FsEvent::added(p)
                } else {
                    FsEvent::removed(p)
                }
            })
            .collect(),
    }
}
