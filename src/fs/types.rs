use std::path::PathBuf;

/// Kind of change reported by the watch primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    /// A file or subdirectory appeared.
    Added,
    /// File content changed.
    Modified,
    /// A file or subdirectory disappeared.
    Removed,
}

/// A filesystem change under a watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub kind: FsEventKind,
    /// Absolute path of the affected entry.
    pub path: PathBuf,
}

impl FsEvent {
    pub fn new(kind: FsEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn added(path: impl Into<PathBuf>) -> Self {
        Self::new(FsEventKind::Added, path)
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(FsEventKind::Modified, path)
    }

    pub fn removed(path: impl Into<PathBuf>) -> Self {
        Self::new(FsEventKind::Removed, path)
    }
}

/// Receiving half of the event queue filled by a watching [`FileSystem`](crate::fs::FileSystem).
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<FsEvent>;

/// Sending half handed to the watch primitive.
pub type EventSender = tokio::sync::mpsc::UnboundedSender<FsEvent>;
