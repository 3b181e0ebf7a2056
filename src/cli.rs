use clap::{Parser, Subcommand};
use std::path::PathBuf;

use treemirror::config::LogLevel;

/// One-way live mirroring of a directory tree.
#[derive(Parser, Debug)]
#[command(name = "treemirror", version)]
pub struct Cli {
    /// Configuration file (defaults to treemirror/config.toml in the user config dir).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, short, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Watch a directory and stream its changes to a target.
    Source {
        #[arg(long)]
        root: Option<PathBuf>,
        /// Target address, e.g. 10.0.0.2:7878.
        #[arg(long)]
        connect: Option<String>,
        /// Seconds between drift-correcting syncs (0 disables).
        #[arg(long)]
        resync_interval: Option<u64>,
    },
    /// Receive actions and apply them to a directory.
    Target {
        #[arg(long)]
        root: Option<PathBuf>,
        #[arg(long)]
        listen: Option<String>,
    },
    /// Mirror one local directory into another within this process.
    Mirror {
        #[arg(long)]
        from: PathBuf,
        #[arg(long)]
        to: PathBuf,
        #[arg(long)]
        resync_interval: Option<u64>,
    },
}
