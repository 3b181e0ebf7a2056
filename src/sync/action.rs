//! Replication actions, the contract between source and target.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One replication instruction.
///
/// Serialized as an object tagged by `action`:
/// `{"action":"mkdir","relative_path":"docs"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    /// The file must exist with exactly this content afterward.
    Write {
        relative_path: String,
        #[serde(with = "base64_content")]
        content: Vec<u8>,
    },
    /// The directory must exist afterward.
    MkDir { relative_path: String },
    /// The path, file or directory, must not exist afterward.
    Remove { relative_path: String },
    /// The target tree must contain exactly these directories and files.
    Sync {
        dirs: BTreeSet<String>,
        files: BTreeSet<String>,
        /// Always empty.
        #[serde(default)]
        relative_path: String,
    },
}

impl Action {
    pub fn write(relative_path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self::Write {
            relative_path: relative_path.into(),
            content: content.into(),
        }
    }

    pub fn mkdir(relative_path: impl Into<String>) -> Self {
        Self::MkDir {
            relative_path: relative_path.into(),
        }
    }

    pub fn remove(relative_path: impl Into<String>) -> Self {
        Self::Remove {
            relative_path: relative_path.into(),
        }
    }

    pub fn sync(dirs: BTreeSet<String>, files: BTreeSet<String>) -> Self {
        Self::Sync {
            dirs,
            files,
            relative_path: String::new(),
        }
    }

    /// The wire tag of this action.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Write { .. } => "write",
            Self::MkDir { .. } => "mkdir",
            Self::Remove { .. } => "remove",
            Self::Sync { .. } => "sync",
        }
    }

    /// Get the path associated with this action.
    pub fn relative_path(&self) -> &str {
        match self {
            Self::Write { relative_path, .. } => relative_path,
            Self::MkDir { relative_path } => relative_path,
            Self::Remove { relative_path } => relative_path,
            Self::Sync { relative_path, .. } => relative_path,
        }
    }

    /// Bytes of file content carried.
    pub fn payload_len(&self) -> usize {
        match self {
            Self::Write { content, .. } => content.len(),
            _ => 0,
        }
    }
}

/// File content as a base64 string rather than a JSON array of numbers.
mod base64_content {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(content: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(content))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Target's answer to one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Reply {
    Ok,
    Failed { message: String },
}
