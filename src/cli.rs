//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Keep a local directory tree in sync with remote files.
///
/// Reads download tasks (one JSON object per line) from manifest files or
/// stdin and fetches whatever is new or changed.
#[derive(Parser, Debug)]
#[command(name = "sitesync")]
#[command(author, version, about)]
pub struct Args {
    /// Manifest files with one JSON task per line (stdin when omitted)
    pub manifests: Vec<PathBuf>,

    /// Configuration file (defaults to $XDG_CONFIG_HOME/sitesync/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory relative task paths are resolved against
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Number of download workers (1-100)
    #[arg(short = 'w', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub workers: Option<u8>,

    /// Re-download existing files even when nothing signals a change
    #[arg(short, long)]
    pub force: bool,

    /// Keep replaced files as <name>-old.<ext>
    #[arg(long)]
    pub keep_replaced: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
