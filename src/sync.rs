//! The synchronization engine.
//!
//! [`SyncEngine`] does two things: a single `reconcile_once` pass that
//! mirrors the folder into the remote secret (create-or-update, writing only
//! when the content actually differs), and the long-running watch loop that
//! decides when a pass happens. The loop is a two-state machine: idle with no
//! countdown armed, or armed with a debounce countdown that every incoming
//! event resets. A burst of writes therefore collapses into one pass after
//! the folder has been quiet for the full window.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Sleep, sleep};
use tracing::{debug, error, info, warn};

use crate::snapshot;
use crate::store::{RemoteSecret, SecretStore, StoreError};
use crate::watch::{PathWatcher, WatchKind, WatchMessage};

/// Quiescence window: a pass runs this long after the last observed event.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(1);

pub struct SyncEngine<S> {
    store: S,
    namespace: String,
    secret_name: String,
    source_dir: PathBuf,
    debounce: Duration,
}

impl<S: SecretStore> SyncEngine<S> {
    pub fn new(
        store: S,
        namespace: impl Into<String>,
        secret_name: impl Into<String>,
        source_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            secret_name: secret_name.into(),
            source_dir: source_dir.into(),
            debounce: DEBOUNCE_WINDOW,
        }
    }

    /// Overrides the debounce window. Tests use short windows under tokio's
    /// paused clock.
    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.debounce = window;
        self
    }

    /// Runs one synchronization pass.
    ///
    /// Snapshots the folder, then creates the secret if it does not exist or
    /// replaces its data wholesale if the content differs. An empty folder is
    /// skipped entirely (`skip-on-empty`): it neither creates a secret nor
    /// clears an existing one. Store failures other than not-found fail the
    /// pass and are not retried here; the next filesystem event is the only
    /// retry trigger.
    #[tracing::instrument(skip(self), fields(secret = %self.secret_name))]
    pub async fn reconcile_once(&self) -> Result<()> {
        debug!(folder = %self.source_dir.display(), "Reading folder contents");
        let data = snapshot::read_dir_snapshot(&self.source_dir)?;

        if data.is_empty() {
            info!(folder = %self.source_dir.display(), "No files found, leaving secret untouched");
            return Ok(());
        }

        match self.store.get(&self.namespace, &self.secret_name).await {
            Err(StoreError::NotFound) => {
                let secret = RemoteSecret::managed(&self.secret_name, data);
                self.store
                    .create(&self.namespace, &secret)
                    .await
                    .with_context(|| format!("failed to create secret {}", self.secret_name))?;
                info!(
                    secret = %self.secret_name,
                    files = secret.data.len(),
                    "Created secret"
                );
                Ok(())
            }
            Err(e) => {
                Err(e).with_context(|| format!("failed to get secret {}", self.secret_name))
            }
            Ok(mut remote) => {
                if !snapshot::changed(&remote.data, &data) {
                    info!(secret = %self.secret_name, "Secret is up to date");
                    return Ok(());
                }
                remote.data = data;
                self.store
                    .update(&self.namespace, &remote)
                    .await
                    .with_context(|| format!("failed to update secret {}", self.secret_name))?;
                info!(
                    secret = %self.secret_name,
                    files = remote.data.len(),
                    "Updated secret"
                );
                Ok(())
            }
        }
    }

    /// Consumes watch messages until the channel closes, debouncing bursts
    /// into single passes.
    ///
    /// `watched` is the current subscription set; creation events for new
    /// directories grow it (and register with `watcher`) before the debounce
    /// is re-armed, so changes nested under a fresh directory stay
    /// observable. Pass failures and notifier errors are logged and the loop
    /// keeps running; only channel closure ends it.
    pub async fn run_watch_loop<W: PathWatcher>(
        &self,
        mut watcher: W,
        mut events: mpsc::Receiver<WatchMessage>,
        mut watched: HashSet<PathBuf>,
    ) -> Result<()> {
        let mut sleeper: Option<Pin<Box<Sleep>>> = None;

        loop {
            tokio::select! {
                msg = events.recv() => { match msg {
                    Some(WatchMessage::Event { path, kind }) => {
                        debug!(path = %path.display(), ?kind, "File event");

                        if kind == WatchKind::Created
                            && path.is_dir()
                            && !watched.contains(&path)
                        {
                            match watcher.watch(&path) {
                                Ok(()) => {
                                    info!(path = %path.display(), "Watching new directory");
                                    watched.insert(path);
                                }
                                Err(e) => {
                                    warn!(path = %path.display(), error = %e, "Failed to watch new directory");
                                }
                            }
                        }

                        // Reset, not accumulate: an armed countdown is replaced.
                        sleeper = Some(Box::pin(sleep(self.debounce)));
                    }
                    Some(WatchMessage::Error(err)) => {
                        warn!(error = %err, "Watcher error");
                    }
                    None => {
                        info!("Watch channel closed, stopping");
                        return Ok(());
                    }
                } },
                _ = async { if let Some(s) = sleeper.as_mut() { s.as_mut().await } }, if sleeper.is_some() => {
                    sleeper = None;
                    debug!("Folder quiet, syncing");
                    if let Err(e) = self.reconcile_once().await {
                        error!(error = %e, secret = %self.secret_name, "Sync failed");
                    }
                }
            }
        }
    }
}
