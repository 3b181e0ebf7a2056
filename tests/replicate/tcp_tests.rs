// Replication over a loopback TCP connection

use std::sync::Arc;
use tokio::net::TcpListener;
use treemirror::error::ReplicaError;
use treemirror::fs::MemoryFs;
use treemirror::sync::{Action, SourceReplicator, TargetReplicator, TargetStats};
use treemirror::transport::{
    serve_connection, Compression, CompressionLevel, FrameCodec, TcpTransport, Transport,
};

/// Serve exactly one connection into a MemoryFs target rooted at `/dst`.
async fn spawn_target(
    fs: Arc<MemoryFs>,
    codec: FrameCodec,
) -> (std::net::SocketAddr, tokio::task::JoinHandle<TargetStats>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut target = TargetReplicator::new(fs, "/dst");
        serve_connection(stream, &mut target, codec).await.unwrap();
        target.stats().clone()
    });
    (addr, handle)
}

#[tokio::test]
async fn test_actions_round_trip() {
    let fs = Arc::new(MemoryFs::new());
    let codec = FrameCodec::new(Compression::Gzip, CompressionLevel::default(), 64);
    let (addr, server) = spawn_target(fs.clone(), codec).await;

    let transport = TcpTransport::connect(addr, codec).await.unwrap();
    assert_eq!(transport.peer(), addr);

    let big = b"0123456789".repeat(10_000);
    transport.call(Action::mkdir("docs")).await.unwrap();
    transport
        .call(Action::write("docs/big.bin", big.clone()))
        .await
        .unwrap();
    transport.call(Action::write("docs/small", "s")).await.unwrap();
    transport.call(Action::remove("docs/small")).await.unwrap();
    drop(transport);

    let stats = server.await.unwrap();
    assert_eq!(fs.contents("/dst/docs/big.bin"), Some(big));
    assert!(!fs.is_dir_now("/dst/docs/small"));
    assert_eq!(fs.contents("/dst/docs/small"), None);
    assert_eq!(stats.files_written, 2);
    assert_eq!(stats.paths_removed, 1);
}

#[tokio::test]
async fn test_failure_is_reported_and_session_continues() {
    let fs = Arc::new(MemoryFs::new());
    let (addr, server) = spawn_target(fs.clone(), FrameCodec::default()).await;
    let transport = TcpTransport::connect(addr, FrameCodec::default())
        .await
        .unwrap();

    let err = transport
        .call(Action::write("../outside", "x"))
        .await
        .unwrap_err();
    match err.downcast_ref::<ReplicaError>() {
        Some(ReplicaError::RemoteFailure { action, path, .. }) => {
            assert_eq!(action, "write");
            assert_eq!(path, "../outside");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    transport.call(Action::mkdir("still/working")).await.unwrap();
    drop(transport);
    server.await.unwrap();
    assert!(fs.is_dir_now("/dst/still/working"));
}

#[tokio::test]
async fn test_source_over_tcp() {
    let source_fs = Arc::new(MemoryFs::new());
    source_fs.add_file("/src/docs/a.txt", "hi").unwrap();
    source_fs.add_file("/src/b.txt", "b".repeat(4096)).unwrap();
    let target_fs = Arc::new(MemoryFs::new());
    target_fs.add_file("/dst/orphan", "o").unwrap();

    let (addr, server) = spawn_target(target_fs.clone(), FrameCodec::default()).await;
    let transport = TcpTransport::connect(addr, FrameCodec::default())
        .await
        .unwrap();
    let mut source = SourceReplicator::new(source_fs.clone(), "/src", Arc::new(transport));

    source.start().await.unwrap();
    drop(source);

    let stats = server.await.unwrap();
    assert_eq!(target_fs.tree("/dst"), source_fs.tree("/src"));
    assert_eq!(stats.orphans_deleted, 1);
    assert_eq!(stats.syncs, 1);
}
