//! Entry point for the file-to-secret sync sidecar.
//!
//! Mirrors a local folder into a single Kubernetes secret and keeps it in
//! sync as the folder changes, debouncing bursts of writes into one update.

mod infra;

use crate::infra::kube::{self, KubeSecretStore};
use anyhow::{Context, Result};
use file_secret_sync::config::Config;
use file_secret_sync::sync::SyncEngine;
use file_secret_sync::watch::{self, FsWatcher};
use std::ffi::OsStr;
use std::path::Path;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/file-secret-sync.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("file-secret-sync.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cfg = Config::from_env()?;
    let namespace = kube::current_namespace().context("failed to determine current namespace")?;
    let store =
        KubeSecretStore::from_cluster_env().context("failed to create in-cluster client")?;

    info!(
        folder = %cfg.source_dir.display(),
        namespace = %namespace,
        secret = %cfg.secret_name,
        "Starting file-to-secret sync"
    );

    let engine = SyncEngine::new(store, namespace, cfg.secret_name, cfg.source_dir.clone());
    engine
        .reconcile_once()
        .await
        .context("initial sync failed")?;

    let (mut watcher, events) = FsWatcher::with_channel(1024)?;
    let watched = watch::watch_tree(&mut watcher, &cfg.source_dir)?;
    info!(
        folder = %cfg.source_dir.display(),
        directories = watched.len(),
        "Watching for changes"
    );

    engine.run_watch_loop(watcher, events, watched).await
}
