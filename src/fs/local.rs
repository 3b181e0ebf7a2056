use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::fs::Metadata;
use std::io;
use std::path::Path;
use tokio::fs;

use crate::fs::backend::FileSystem;
use crate::fs::types::EventReceiver;
use crate::fs::watcher::DirWatcher;

/// Local disk backend.
///
/// Built with [`LocalFs::watching`] it also registers directory watches whose
/// events arrive on the returned channel.
pub struct LocalFs {
    watcher: Option<DirWatcher>,
}

impl LocalFs {
    /// A backend without watch support, enough for the target side.
    pub fn new() -> Self {
        Self { watcher: None }
    }

    /// A backend that delivers events for every watched directory.
    pub fn watching() -> Result<(Self, EventReceiver)> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let watcher = DirWatcher::new(tx)?;
        Ok((
            Self {
                watcher: Some(watcher),
            },
            rx,
        ))
    }

    fn watcher(&self) -> Result<&DirWatcher> {
        match &self.watcher {
            Some(watcher) => Ok(watcher),
            None => bail!("this LocalFs was created without watch support"),
        }
    }
}

impl Default for LocalFs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystem for LocalFs {
    async fn list_dir(&self, path: &Path) -> Result<Vec<OsString>> {
        let mut read_dir = fs::read_dir(path)
            .await
            .with_context(|| format!("Failed to read directory: {}", path.display()))?;

        let mut names = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .with_context(|| format!("Failed to read directory: {}", path.display()))?
        {
            names.push(entry.file_name());
        }
        names.sort();
        Ok(names)
    }

    async fn is_dir(&self, path: &Path) -> Result<bool> {
        Ok(link_metadata(path).await?.is_some_and(|m| m.is_dir()))
    }

    async fn is_symlink(&self, path: &Path) -> Result<bool> {
        Ok(link_metadata(path)
            .await?
            .is_some_and(|m| m.file_type().is_symlink()))
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(link_metadata(path).await?.is_some())
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path)
            .await
            .with_context(|| format!("Failed to read file: {}", path.display()))
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> Result<()> {
        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write file: {}", path.display()))
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)
            .await
            .with_context(|| format!("Failed to delete file: {}", path.display()))
    }

    async fn remove_dir(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path)
            .await
            .with_context(|| format!("Failed to delete directory: {}", path.display()))
    }

    async fn make_dirs(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .with_context(|| format!("Failed to create directory: {}", path.display()))
    }

    async fn watch_dir(&self, path: &Path) -> Result<()> {
        self.watcher()?.watch(path)
    }

    async fn unwatch_dir(&self, path: &Path) -> Result<()> {
        self.watcher()?.unwatch(path)
    }
}

/// Metadata of `path` itself, not of a link target. `None` when missing.
async fn link_metadata(path: &Path) -> Result<Option<Metadata>> {
    match fs::symlink_metadata(path).await {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to stat: {}", path.display())),
    }
}
