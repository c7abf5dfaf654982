//! CLI entry point for the sitesync tool.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sitesync_core::config::resolve_default_config_path;
use sitesync_core::{
    CacheStore, Database, DownloadTask, Fetcher, HttpClient, LogObserver, Observer,
    PipelineConfig, WorkQueue, WorkerPool,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    if args.manifests.is_empty() && std::io::stdin().is_terminal() {
        info!("No manifests provided. Pass manifest files or pipe tasks via stdin.");
        info!(
            r#"Example: echo '{{"key":"k","path":"a.pdf","url":"https://example.com/a.pdf"}}' | sitesync --root /srv/files"#
        );
        return Ok(());
    }

    let config = Arc::new(load_config(&args)?);
    info!(
        root = %config.root.display(),
        workers = config.workers,
        force = config.force_download,
        "Sitesync starting"
    );

    let cache_path = config.cache_db_path();
    if let Some(parent) = cache_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let db = Database::new(&cache_path)
        .await
        .with_context(|| format!("opening cache database {}", cache_path.display()))?;
    let cache = Arc::new(CacheStore::new(db));

    let client = HttpClient::with_connect_timeout(config.connect_timeout_secs)
        .context("building HTTP client")?;
    let fetcher = Fetcher::new(Arc::clone(&config), client, cache);

    let queue = WorkQueue::new();
    let pool = WorkerPool::start(config.workers, queue.clone(), fetcher)?;

    let cancel = pool.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping workers");
            cancel.cancel();
        }
    });

    let observer: Arc<dyn Observer> = Arc::new(LogObserver);
    let producers: Vec<JoinHandle<()>> = if args.manifests.is_empty() {
        let queue = queue.clone();
        let observer = Arc::clone(&observer);
        vec![tokio::spawn(async move {
            let reader = BufReader::new(tokio::io::stdin());
            produce_from_lines("<stdin>", reader, &queue, &observer).await;
        })]
    } else {
        args.manifests
            .iter()
            .cloned()
            .map(|path| {
                let queue = queue.clone();
                let observer = Arc::clone(&observer);
                tokio::spawn(async move { produce_from_manifest(&path, &queue, &observer).await })
            })
            .collect()
    };

    let report = pool.run(producers).await?;

    info!(
        processed = report.processed,
        drained = report.drained,
        "Sync complete"
    );

    Ok(())
}

/// Builds the effective configuration: file (explicit or default location),
/// then command-line overrides, validated only once all values are in place.
fn load_config(args: &Args) -> Result<PipelineConfig> {
    let file = match &args.config {
        Some(path) => Some(path.clone()),
        None => resolve_default_config_path().filter(|path| path.is_file()),
    };

    let mut config = if let Some(path) = file {
        debug!(path = %path.display(), "loading configuration");
        PipelineConfig::read(&path)
            .with_context(|| format!("loading configuration from {}", path.display()))?
    } else {
        let root = match &args.root {
            Some(root) => root.clone(),
            None => std::env::current_dir().context("resolving current directory")?,
        };
        PipelineConfig::new(root)
    };

    if let Some(root) = &args.root {
        config.root = absolute(root)?;
    }
    if let Some(workers) = args.workers {
        config.workers = usize::from(workers);
    }
    if args.force {
        config.force_download = true;
    }
    if args.keep_replaced {
        config.keep_replaced_files = true;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("resolving current directory")?;
    Ok(cwd.join(path))
}

async fn produce_from_manifest(path: &Path, queue: &WorkQueue, observer: &Arc<dyn Observer>) {
    match tokio::fs::File::open(path).await {
        Ok(file) => {
            let source = path.display().to_string();
            produce_from_lines(&source, BufReader::new(file), queue, observer).await;
        }
        Err(e) => warn!(path = %path.display(), error = %e, "Could not open manifest"),
    }
}

/// Enqueues one task per non-empty line. Malformed lines are logged and
/// skipped.
async fn produce_from_lines<R>(
    source: &str,
    reader: R,
    queue: &WorkQueue,
    observer: &Arc<dyn Observer>,
) where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0_usize;
    let mut enqueued = 0_usize;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(source, error = %e, "Stopped reading manifest");
                break;
            }
        };
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let task = match serde_json::from_str::<DownloadTask>(line) {
            Ok(task) => task.with_observer(Arc::clone(observer)),
            Err(e) => {
                warn!(source, line = line_no, error = %e, "Skipped malformed task");
                continue;
            }
        };

        task.observer.start(&task.key, None);
        if let Err(e) = queue.push(task) {
            warn!(source, error = %e, "Could not enqueue task");
            break;
        }
        enqueued += 1;
    }

    debug!(source, enqueued, "Producer finished");
}
