//! Configuration file.
//!
//! Read from `--config`, or from `treemirror/config.toml` under the user's
//! config directory when that file exists. Every key is optional.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::transport::{Compression, CompressionLevel, FrameCodec};

pub const DEFAULT_LISTEN: &str = "127.0.0.1:7878";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Silent,
}

impl LogLevel {
    pub fn to_tracing_level(&self) -> Option<tracing::Level> {
        match self {
            LogLevel::Debug => Some(tracing::Level::DEBUG),
            LogLevel::Info => Some(tracing::Level::INFO),
            LogLevel::Warn => Some(tracing::Level::WARN),
            LogLevel::Error => Some(tracing::Level::ERROR),
            LogLevel::Silent => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<LogLevel>,
    pub source: SourceConfig,
    pub target: TargetConfig,
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub root: Option<PathBuf>,
    /// Address of the target to connect to.
    pub connect: Option<String>,
    /// Seconds between periodic `sync` actions; 0 disables them.
    pub resync_interval_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: None,
            connect: None,
            resync_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub root: Option<PathBuf>,
    pub listen: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            root: None,
            listen: DEFAULT_LISTEN.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub compression: Compression,
    pub compression_level: CompressionLevel,
    /// Frames at or below this many bytes are sent uncompressed.
    pub compress_threshold: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            compression: Compression::default(),
            compression_level: CompressionLevel::default(),
            compress_threshold: 1024,
        }
    }
}

impl TransportConfig {
    pub fn codec(&self) -> FrameCodec {
        FrameCodec::new(
            self.compression,
            self.compression_level,
            self.compress_threshold,
        )
    }
}

impl SourceConfig {
    pub fn resync_interval(&self) -> Option<Duration> {
        match self.resync_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Config {
    /// Default location, whether or not a file exists there.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("treemirror").join("config.toml"))
    }

    /// Load `path` if given, else the default file if present, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
