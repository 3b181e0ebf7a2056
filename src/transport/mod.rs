//! Carrying actions from source to target.
//!
//! A [`Transport`] call returns only once the target has applied the action,
//! which is what gives the target a strict per-source order.

use anyhow::Result;
use async_trait::async_trait;

use crate::sync::Action;

pub mod codec;
pub mod local;
pub mod tcp;

pub use codec::{Compression, CompressionLevel, FrameCodec};
pub use local::LocalTransport;
pub use tcp::{serve, serve_connection, TcpTransport};

/// Blocking request/response channel to a target.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one action and wait for the target to apply it.
    async fn call(&self, action: Action) -> Result<()>;
}
