//! Frame codec for the TCP transport.
//!
//! A frame is a big-endian `u32` payload length, a one-byte compression tag
//! and the payload: a JSON document, compressed with gzip or zstd when it is
//! larger than the configured threshold.

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as GzipCompression;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ReplicaError;

/// Largest payload accepted in either direction, compressed or not.
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

const HEADER_LEN: usize = 5;

/// Compression algorithm applied to frame payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// No compression.
    None,
    /// Gzip compression (widely compatible).
    Gzip,
    /// Zstd compression (fast, good ratio).
    #[default]
    Zstd,
}

impl Compression {
    /// Get a human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Zstd => "zstd",
        }
    }

    fn tag(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Gzip => 1,
            Self::Zstd => 2,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::None),
            1 => Some(Self::Gzip),
            2 => Some(Self::Zstd),
            _ => None,
        }
    }
}

/// Compression level (1-9, where 1 is fastest-lowest and 9 is slowest-highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct CompressionLevel(u8);

impl Default for CompressionLevel {
    fn default() -> Self {
        Self(3)
    }
}

impl From<u8> for CompressionLevel {
    fn from(level: u8) -> Self {
        Self::new(level)
    }
}

impl From<CompressionLevel> for u8 {
    fn from(level: CompressionLevel) -> Self {
        level.0
    }
}

impl CompressionLevel {
    /// Create a new compression level (clamped to 1-9).
    pub fn new(level: u8) -> Self {
        Self(level.clamp(1, 9))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

/// Compress data in memory.
pub fn compress(data: &[u8], compression: Compression, level: CompressionLevel) -> Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Gzip => {
            let mut encoder =
                GzEncoder::new(Vec::new(), GzipCompression::new(level.value() as u32));
            encoder.write_all(data)?;
            Ok(encoder.finish()?)
        }
        Compression::Zstd => Ok(zstd::encode_all(data, level.value() as i32)?),
    }
}

/// Decompress data in memory, refusing output beyond [`MAX_FRAME_LEN`].
pub fn decompress(data: &[u8], compression: Compression) -> Result<Vec<u8>> {
    let reader: Box<dyn Read + '_> = match compression {
        Compression::None => return Ok(data.to_vec()),
        Compression::Gzip => Box::new(GzDecoder::new(data)),
        Compression::Zstd => Box::new(zstd::Decoder::new(data)?),
    };

    let mut output = Vec::new();
    reader
        .take(MAX_FRAME_LEN as u64 + 1)
        .read_to_end(&mut output)
        .with_context(|| format!("Failed to decompress {} frame", compression.name()))?;
    if output.len() > MAX_FRAME_LEN {
        return Err(ReplicaError::FrameTooLarge {
            len: output.len(),
            max: MAX_FRAME_LEN,
        }
        .into());
    }
    Ok(output)
}

/// Encodes and decodes length-prefixed JSON frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    compression: Compression,
    level: CompressionLevel,
    /// Payloads at or below this size are sent uncompressed.
    threshold: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(Compression::default(), CompressionLevel::default(), 1024)
    }
}

impl FrameCodec {
    pub fn new(compression: Compression, level: CompressionLevel, threshold: usize) -> Self {
        Self {
            compression,
            level,
            threshold,
        }
    }

    /// Serialize `value` into a complete frame.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(value).context("Failed to serialize frame")?;

        let (compression, payload) =
            if self.compression != Compression::None && json.len() > self.threshold {
                (self.compression, compress(&json, self.compression, self.level)?)
            } else {
                (Compression::None, json)
            };

        if payload.len() > MAX_FRAME_LEN {
            return Err(ReplicaError::FrameTooLarge {
                len: payload.len(),
                max: MAX_FRAME_LEN,
            }
            .into());
        }

        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.push(compression.tag());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Decode the payload of a frame whose header has been read.
    pub fn decode<T: DeserializeOwned>(&self, tag: u8, payload: &[u8]) -> Result<T> {
        let Some(compression) = Compression::from_tag(tag) else {
            bail!("unknown frame compression tag {tag}");
        };
        let json = decompress(payload, compression)?;
        serde_json::from_slice(&json).context("Failed to parse frame")
    }

    pub async fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
        T: Serialize + Sync,
    {
        let frame = self.encode(value)?;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read the next frame. Returns `None` when the peer closed the stream
    /// cleanly between frames.
    pub async fn read<R, T>(&self, reader: &mut R) -> Result<Option<T>>
    where
        R: AsyncRead + Unpin + Send,
        T: DeserializeOwned,
    {
        let mut header = [0u8; HEADER_LEN];
        match reader.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(ReplicaError::FrameTooLarge {
                len,
                max: MAX_FRAME_LEN,
            }
            .into());
        }

        let mut payload = vec![0u8; len];
        reader
            .read_exact(&mut payload)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => ReplicaError::ConnectionClosed.into(),
                _ => anyhow::Error::from(e),
            })?;

        self.decode(header[4], &payload).map(Some)
    }
}
