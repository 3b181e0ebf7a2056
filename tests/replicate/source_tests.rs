// Tests for the source replicator, driven through MemoryFs

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use treemirror::fs::{FsEvent, MemoryFs};
use treemirror::sync::{Action, SourceReplicator, TargetReplicator};

use crate::common::{set, summary, RecordingTransport};

const ROOT: &str = "/src";

fn recording_source(fs: &Arc<MemoryFs>) -> (SourceReplicator, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::new());
    let source = SourceReplicator::new(fs.clone(), ROOT, transport.clone());
    (source, transport)
}

#[tokio::test]
async fn test_start_replicates_then_advertises() {
    let fs = Arc::new(MemoryFs::new());
    fs.add_file("/src/docs/a.txt", "hi").unwrap();
    let (mut source, transport) = recording_source(&fs);

    source.start().await.unwrap();

    let actions = transport.take();
    assert_eq!(
        actions,
        vec![
            Action::mkdir("docs"),
            Action::write("docs/a.txt", "hi"),
            Action::sync(set(&["", "docs"]), set(&["docs/a.txt"])),
        ]
    );
    assert_eq!(
        fs.watched(),
        [PathBuf::from("/src"), PathBuf::from("/src/docs")]
            .into_iter()
            .collect::<BTreeSet<_>>()
    );
    assert_eq!(source.stats().actions_sent, 3);
    assert_eq!(source.stats().bytes_sent, 2);
    assert_eq!(source.stats().syncs_sent, 1);
}

#[tokio::test]
async fn test_mkdir_precedes_contents() {
    let fs = Arc::new(MemoryFs::new());
    fs.add_file("/src/a/b/c/deep.txt", "1").unwrap();
    fs.add_file("/src/a/top.txt", "2").unwrap();
    fs.add_file("/src/z.txt", "3").unwrap();
    let (mut source, transport) = recording_source(&fs);

    source.start().await.unwrap();

    let order = summary(&transport.take());
    let position = |name: &str, path: &str| {
        order
            .iter()
            .position(|(n, p)| *n == name && p == path)
            .unwrap()
    };
    assert!(position("mkdir", "a") < position("mkdir", "a/b"));
    assert!(position("mkdir", "a/b") < position("mkdir", "a/b/c"));
    assert!(position("mkdir", "a/b/c") < position("write", "a/b/c/deep.txt"));
    assert!(position("mkdir", "a") < position("write", "a/top.txt"));
    assert_eq!(order.last().unwrap().0, "sync");
}

#[tokio::test]
async fn test_added_directory_is_walked() {
    let fs = Arc::new(MemoryFs::new());
    fs.add_dir(ROOT).unwrap();
    let (mut source, transport) = recording_source(&fs);
    source.start().await.unwrap();
    transport.take();

    fs.add_file("/src/new/sub/f.txt", "x").unwrap();
    source.handle_event(FsEvent::added("/src/new")).await.unwrap();

    assert_eq!(
        transport.take(),
        vec![
            Action::mkdir("new"),
            Action::mkdir("new/sub"),
            Action::write("new/sub/f.txt", "x"),
        ]
    );
    assert!(source.watch_set().contains_dir("new/sub"));
    assert!(source.watch_set().contains_file("new/sub/f.txt"));
    assert!(fs.watched().contains(&PathBuf::from("/src/new/sub")));
}

#[tokio::test]
async fn test_modified_sends_current_content() {
    let fs = Arc::new(MemoryFs::new());
    fs.add_file("/src/notes.txt", "v1").unwrap();
    let (mut source, transport) = recording_source(&fs);
    source.start().await.unwrap();
    transport.take();

    fs.add_file("/src/notes.txt", "v2").unwrap();
    source
        .handle_event(FsEvent::modified("/src/notes.txt"))
        .await
        .unwrap();
    // Unchanged content is still sent.
    source
        .handle_event(FsEvent::modified("/src/notes.txt"))
        .await
        .unwrap();

    assert_eq!(
        transport.take(),
        vec![
            Action::write("notes.txt", "v2"),
            Action::write("notes.txt", "v2"),
        ]
    );
}

#[tokio::test]
async fn test_removed_directory_forgets_subtree() {
    let fs = Arc::new(MemoryFs::new());
    fs.add_file("/src/docs/a.txt", "a").unwrap();
    fs.add_file("/src/docs/inner/b.txt", "b").unwrap();
    fs.add_file("/src/keep.txt", "k").unwrap();
    let (mut source, transport) = recording_source(&fs);
    source.start().await.unwrap();
    transport.take();

    // Deleting the directory also drops its watches, so unwatching fails
    // with not-found, which must be tolerated.
    fs.delete("/src/docs");
    source
        .handle_event(FsEvent::removed("/src/docs"))
        .await
        .unwrap();

    assert_eq!(transport.take(), vec![Action::remove("docs")]);
    let watched = source.watch_set();
    assert_eq!(watched.dirs(), &set(&[""]));
    assert_eq!(watched.files(), &set(&["keep.txt"]));
}

#[tokio::test]
async fn test_removed_directory_is_unwatched() {
    let fs = Arc::new(MemoryFs::new());
    fs.add_dir("/src/a/b").unwrap();
    let (mut source, _transport) = recording_source(&fs);
    source.start().await.unwrap();

    source.handle_event(FsEvent::removed("/src/a")).await.unwrap();

    assert_eq!(
        fs.watched(),
        [PathBuf::from("/src")].into_iter().collect::<BTreeSet<_>>()
    );
}

#[tokio::test]
async fn test_vanished_paths_are_skipped() {
    let fs = Arc::new(MemoryFs::new());
    fs.add_dir(ROOT).unwrap();
    let (mut source, transport) = recording_source(&fs);
    source.start().await.unwrap();
    transport.take();

    source
        .handle_event(FsEvent::added("/src/ghost.txt"))
        .await
        .unwrap();
    source
        .handle_event(FsEvent::modified("/src/ghost.txt"))
        .await
        .unwrap();

    assert!(transport.take().is_empty());
    assert_eq!(source.stats().vanished_skipped, 2);
    assert!(!source.watch_set().contains_file("ghost.txt"));
}

#[tokio::test]
async fn test_events_outside_root_are_ignored() {
    let fs = Arc::new(MemoryFs::new());
    fs.add_dir(ROOT).unwrap();
    fs.add_file("/srcfoo/x.txt", "x").unwrap();
    let (mut source, transport) = recording_source(&fs);
    source.start().await.unwrap();
    transport.take();

    source
        .handle_event(FsEvent::added("/srcfoo/x.txt"))
        .await
        .unwrap();

    assert!(transport.take().is_empty());
}

#[tokio::test]
async fn test_run_drains_events_until_closed() {
    let fs = Arc::new(MemoryFs::new());
    fs.add_dir(ROOT).unwrap();
    let (mut source, transport) = recording_source(&fs);
    source.start().await.unwrap();
    transport.take();

    fs.add_file("/src/one.txt", "1").unwrap();
    fs.add_dir("/src/two").unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(FsEvent::added("/src/one.txt")).unwrap();
    tx.send(FsEvent::added("/src/two")).unwrap();
    tx.send(FsEvent::removed("/src/one.txt")).unwrap();
    drop(tx);

    source.run(rx, None).await.unwrap();

    assert_eq!(
        summary(&transport.take()),
        vec![
            ("write", "one.txt".to_string()),
            ("mkdir", "two".to_string()),
            ("remove", "one.txt".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_run_resyncs_periodically() {
    let fs = Arc::new(MemoryFs::new());
    fs.add_dir(ROOT).unwrap();
    let (mut source, _transport) = recording_source(&fs);
    source.start().await.unwrap();

    let (tx, rx) = mpsc::unbounded_channel::<FsEvent>();
    let closer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        drop(tx);
    });
    source
        .run(rx, Some(Duration::from_millis(20)))
        .await
        .unwrap();
    closer.await.unwrap();

    assert!(source.stats().syncs_sent >= 2);
}

#[tokio::test]
async fn test_source_and_target_trees_converge() {
    let source_fs = Arc::new(MemoryFs::new());
    source_fs.add_file("/src/docs/a.txt", "hi").unwrap();
    source_fs.add_file("/src/docs/img/logo.png", vec![0u8, 1, 2]).unwrap();
    source_fs.add_file("/src/readme", "read me").unwrap();

    let target_fs = Arc::new(MemoryFs::new());
    target_fs.add_file("/dst/stale/old.txt", "old").unwrap();
    target_fs.add_file("/dst/docs/a.txt", "outdated").unwrap();
    let target = TargetReplicator::new(target_fs.clone(), "/dst");
    let transport = Arc::new(RecordingTransport::forwarding(target));

    let mut source = SourceReplicator::new(source_fs.clone(), ROOT, transport.clone());
    source.start().await.unwrap();
    assert_eq!(target_fs.tree("/dst"), source_fs.tree(ROOT));

    source_fs.add_file("/src/docs/b.txt", "new").unwrap();
    source
        .handle_event(FsEvent::added("/src/docs/b.txt"))
        .await
        .unwrap();
    source_fs.add_file("/src/readme", "changed").unwrap();
    source
        .handle_event(FsEvent::modified("/src/readme"))
        .await
        .unwrap();
    source_fs.delete("/src/docs/img");
    source
        .handle_event(FsEvent::removed("/src/docs/img"))
        .await
        .unwrap();

    assert_eq!(target_fs.tree("/dst"), source_fs.tree(ROOT));
    assert_eq!(target_fs.contents("/dst/readme"), Some(b"changed".to_vec()));

    let stats = transport.target_stats().await;
    assert_eq!(stats.orphans_deleted, 1);
    assert_eq!(stats.syncs, 1);
}
