mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info};

use cli::{Cli, Command};
use treemirror::config::{Config, LogLevel};
use treemirror::fs::{EventReceiver, LocalFs};
use treemirror::sync::{SourceReplicator, TargetReplicator};
use treemirror::transport::{serve, LocalTransport, TcpTransport, Transport};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    setup_tracing(cli.log_level.or(config.log_level).unwrap_or_default());
    debug!("Parsed CLI arguments: {cli:?}");

    match cli.command {
        Command::Source {
            root,
            connect,
            resync_interval,
        } => {
            if let Some(secs) = resync_interval {
                config.source.resync_interval_secs = secs;
            }
            let Some(root) = root.or(config.source.root.clone()) else {
                bail!("no source root given (--root or [source].root)");
            };
            let Some(connect) = connect.or(config.source.connect.clone()) else {
                bail!("no target address given (--connect or [source].connect)");
            };

            let transport = TcpTransport::connect(connect, config.transport.codec()).await?;
            run_source(&root, Arc::new(transport), config.source.resync_interval()).await
        }
        Command::Target { root, listen } => {
            let Some(root) = root.or(config.target.root.clone()) else {
                bail!("no target root given (--root or [target].root)");
            };
            let listen = listen.unwrap_or(config.target.listen.clone());
            run_target(root, &listen, &config).await
        }
        Command::Mirror {
            from,
            to,
            resync_interval,
        } => {
            if let Some(secs) = resync_interval {
                config.source.resync_interval_secs = secs;
            }
            run_mirror(&from, &to, config.source.resync_interval()).await
        }
    }
}

fn setup_tracing(level: LogLevel) {
    if let Some(level) = level.to_tracing_level() {
        tracing_subscriber::fmt()
            .with_max_level(level)
            .compact()
            .init();
    }
}

async fn run_source(
    root: &Path,
    transport: Arc<dyn Transport>,
    resync_every: Option<Duration>,
) -> Result<()> {
    // Watch events carry resolved paths, so the root must be resolved too.
    let root = std::fs::canonicalize(root)
        .with_context(|| format!("Failed to resolve source root: {}", root.display()))?;
    if !root.is_dir() {
        bail!("source root {} is not a directory", root.display());
    }

    let (fs, events) = LocalFs::watching()?;
    let mut source = SourceReplicator::new(Arc::new(fs), root, transport);
    source.start().await?;
    watch_until_interrupted(&mut source, events, resync_every).await?;

    let stats = source.stats();
    info!(
        actions = stats.actions_sent,
        bytes = stats.bytes_sent,
        syncs = stats.syncs_sent,
        "Session finished"
    );
    Ok(())
}

async fn watch_until_interrupted(
    source: &mut SourceReplicator,
    events: EventReceiver,
    resync_every: Option<Duration>,
) -> Result<()> {
    tokio::select! {
        result = source.run(events, resync_every) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            Ok(())
        }
    }
}

async fn run_target(root: PathBuf, listen: &str, config: &Config) -> Result<()> {
    std::fs::create_dir_all(&root)
        .with_context(|| format!("Failed to create target root: {}", root.display()))?;
    // Links below the root are never followed, so resolve the root itself.
    let root = std::fs::canonicalize(&root)?;

    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to listen on {listen}"))?;
    let mut target = TargetReplicator::new(Arc::new(LocalFs::new()), root);

    tokio::select! {
        result = serve(listener, &mut target, config.transport.codec()) => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    let stats = target.stats();
    info!(
        written = stats.files_written,
        skipped = stats.writes_skipped,
        removed = stats.paths_removed,
        orphans = stats.orphans_deleted,
        "Target stopped"
    );
    Ok(())
}

async fn run_mirror(from: &Path, to: &Path, resync_every: Option<Duration>) -> Result<()> {
    std::fs::create_dir_all(to)
        .with_context(|| format!("Failed to create target root: {}", to.display()))?;
    let from = std::fs::canonicalize(from)
        .with_context(|| format!("Failed to resolve source root: {}", from.display()))?;
    let to = std::fs::canonicalize(to)?;
    if to.starts_with(&from) || from.starts_with(&to) {
        bail!(
            "source {} and target {} must not contain each other",
            from.display(),
            to.display()
        );
    }

    let target = TargetReplicator::new(Arc::new(LocalFs::new()), to);
    run_source(&from, Arc::new(LocalTransport::new(target)), resync_every).await
}
