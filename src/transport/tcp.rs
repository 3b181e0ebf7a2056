use anyhow::{Context, Result};
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::ReplicaError;
use crate::sync::{Action, Reply, TargetReplicator};
use crate::transport::codec::FrameCodec;
use crate::transport::Transport;

/// Source end of a TCP session: one frame out, one reply frame back.
pub struct TcpTransport {
    stream: Mutex<TcpStream>,
    codec: FrameCodec,
    peer: SocketAddr,
}

impl TcpTransport {
    pub async fn connect(addr: impl ToSocketAddrs, codec: FrameCodec) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .context("Failed to connect to target")?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        info!("Connected to target at {peer}");

        Ok(Self {
            stream: Mutex::new(stream),
            codec,
            peer,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn call(&self, action: Action) -> Result<()> {
        let name = action.name();
        let path = action.relative_path().to_string();

        let mut stream = self.stream.lock().await;
        self.codec.write(&mut *stream, &action).await?;

        match self.codec.read::<_, Reply>(&mut *stream).await? {
            Some(Reply::Ok) => Ok(()),
            Some(Reply::Failed { message }) => Err(ReplicaError::RemoteFailure {
                action: name.to_string(),
                path,
                message,
            }
            .into()),
            None => Err(ReplicaError::ConnectionClosed.into()),
        }
    }
}

/// Accept sources one after another and apply their actions to `target`.
///
/// A broken connection is logged and the next source is accepted; only a
/// failing listener ends the loop.
pub async fn serve(
    listener: TcpListener,
    target: &mut TargetReplicator,
    codec: FrameCodec,
) -> Result<()> {
    info!(
        "Serving {} on {}",
        target.root().display(),
        listener.local_addr()?
    );

    loop {
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true)?;
        info!("Source connected from {peer}");

        match serve_connection(stream, target, codec).await {
            Ok(()) => info!("Source {peer} disconnected"),
            Err(e) => warn!("Connection from {peer} ended: {e:#}"),
        }
    }
}

/// Apply every action read from `stream` and answer each with a [`Reply`].
pub async fn serve_connection<S>(
    mut stream: S,
    target: &mut TargetReplicator,
    codec: FrameCodec,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    while let Some(action) = codec.read::<_, Action>(&mut stream).await? {
        let name = action.name();
        let path = action.relative_path().to_string();

        let reply = match target.handle_request(action).await {
            Ok(()) => Reply::Ok,
            Err(e) => {
                error!("Failed to apply {name} {path:?}: {e:#}");
                Reply::Failed {
                    message: format!("{e:#}"),
                }
            }
        };
        codec.write(&mut stream, &reply).await?;
    }
    Ok(())
}
