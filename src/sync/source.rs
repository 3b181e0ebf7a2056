//! Source side of a replication session.
//!
//! Owns the watch set, turns filesystem events into actions and sends them
//! one at a time, so the target sees them in the order they were produced.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{is_not_found, ReplicaError};
use crate::fs::{EventReceiver, FileSystem, FsEvent, FsEventKind};
use crate::sync::action::Action;
use crate::sync::path::{absolute_path, relative_path};
use crate::sync::walker::{emit, is_skipped_link, unless_vanished, watch, DirectoryWalker};
use crate::sync::watch_set::WatchSet;
use crate::transport::Transport;

/// Counters for one source session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Actions acknowledged by the target.
    pub actions_sent: usize,
    /// File content bytes carried by those actions.
    pub bytes_sent: u64,
    /// `sync` actions among them.
    pub syncs_sent: usize,
    /// Events whose path was gone before it could be inspected.
    pub vanished_skipped: usize,
    pub symlinks_skipped: usize,
    /// Entries whose names are not valid UTF-8.
    pub unrepresentable_skipped: usize,
}

pub struct SourceReplicator {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    transport: Arc<dyn Transport>,
    watched: WatchSet,
    stats: SourceStats,
}

impl SourceReplicator {
    /// Create a replicator for `root`. Nothing is watched or sent until
    /// [`start`](Self::start).
    pub fn new(
        fs: Arc<dyn FileSystem>,
        root: impl Into<PathBuf>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            fs,
            root: root.into(),
            transport,
            watched: WatchSet::new(),
            stats: SourceStats::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn watch_set(&self) -> &WatchSet {
        &self.watched
    }

    pub fn stats(&self) -> &SourceStats {
        &self.stats
    }

    /// Watch the root, replicate the whole tree, then advertise it with a
    /// `sync` so the target drops anything it holds beyond it.
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting replication of {}", self.root.display());

        self.fs.watch_dir(&self.root).await?;
        let root = self.root.clone();
        self.walker().walk(&root).await?;
        self.resync().await?;

        info!(
            dirs = self.watched.dirs().len(),
            files = self.watched.files().len(),
            bytes = self.stats.bytes_sent,
            "Initial replication complete"
        );
        Ok(())
    }

    /// Advertise the current tree. The target deletes whatever is not in it.
    pub async fn resync(&mut self) -> Result<()> {
        let (dirs, files) = self.watched.snapshot();
        emit(self.transport.as_ref(), &mut self.stats, Action::sync(dirs, files)).await?;
        self.stats.syncs_sent += 1;
        Ok(())
    }

    /// Translate one filesystem event into actions.
    pub async fn handle_event(&mut self, event: FsEvent) -> Result<()> {
        let relative = match relative_path(&self.root, &event.path) {
            Ok(relative) => relative,
            Err(e @ ReplicaError::NonUtf8Path { .. }) => {
                warn!("Ignoring event: {e}");
                self.stats.unrepresentable_skipped += 1;
                return Ok(());
            }
            Err(e) => {
                warn!("Ignoring event: {e}");
                return Ok(());
            }
        };

        debug!(kind = ?event.kind, path = %relative, "Handling event");
        match event.kind {
            FsEventKind::Added => self.on_added(&event.path, relative).await,
            FsEventKind::Modified => self.on_modified(&event.path, relative).await,
            FsEventKind::Removed => self.on_removed(relative).await,
        }
    }

    /// Process events until the channel closes, resyncing on every tick of
    /// `resync_every` when set.
    pub async fn run(
        &mut self,
        mut events: EventReceiver,
        resync_every: Option<Duration>,
    ) -> Result<()> {
        let mut ticker = resync_every.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await?,
                    None => break,
                },
                _ = next_tick(&mut ticker) => {
                    debug!("Periodic resync");
                    self.resync().await?;
                }
            }
        }

        info!("Event stream closed, replication of {} stopped", self.root.display());
        Ok(())
    }

    async fn on_added(&mut self, path: &Path, relative: String) -> Result<()> {
        if is_skipped_link(self.fs.as_ref(), path, &mut self.stats).await? {
            return Ok(());
        }
        if self.fs.is_dir(path).await? {
            emit(self.transport.as_ref(), &mut self.stats, Action::mkdir(relative.as_str()))
                .await?;
            self.watched.insert_dir(relative);
            if watch(self.fs.as_ref(), path, &mut self.stats).await? {
                self.walker().walk(path).await?;
            }
        } else {
            let read = self.fs.read_file(path).await;
            let Some(content) = unless_vanished(read, path, &mut self.stats)? else {
                return Ok(());
            };
            emit(
                self.transport.as_ref(),
                &mut self.stats,
                Action::write(relative.as_str(), content),
            )
            .await?;
            self.watched.insert_file(relative);
        }
        Ok(())
    }

    /// Content is sent as-is even when unchanged; the target skips
    /// identical writes.
    async fn on_modified(&mut self, path: &Path, relative: String) -> Result<()> {
        if is_skipped_link(self.fs.as_ref(), path, &mut self.stats).await? {
            return Ok(());
        }
        let read = self.fs.read_file(path).await;
        let Some(content) = unless_vanished(read, path, &mut self.stats)? else {
            return Ok(());
        };
        emit(
            self.transport.as_ref(),
            &mut self.stats,
            Action::write(relative.as_str(), content),
        )
        .await?;
        self.watched.insert_file(relative);
        Ok(())
    }

    /// Watch state is cleaned up before the `remove` goes out.
    async fn on_removed(&mut self, relative: String) -> Result<()> {
        if relative.is_empty() {
            warn!("Replication root {} was removed", self.root.display());
        }

        let removal = self.watched.remove(&relative);
        for dir in &removal.dirs {
            let path = absolute_path(&self.root, dir);
            match self.fs.unwatch_dir(&path).await {
                Ok(()) => {}
                Err(e) if is_not_found(&e) => {
                    debug!("Watch already gone: {}", path.display());
                }
                Err(e) => return Err(e),
            }
        }

        emit(self.transport.as_ref(), &mut self.stats, Action::remove(relative)).await
    }

    fn walker(&mut self) -> DirectoryWalker<'_> {
        DirectoryWalker::new(
            self.fs.as_ref(),
            self.transport.as_ref(),
            &self.root,
            &mut self.watched,
            &mut self.stats,
        )
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
