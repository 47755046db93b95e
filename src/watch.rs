//! Filesystem-change notification.
//!
//! Wraps the `notify` watcher behind the small [`PathWatcher`] trait so the
//! sync loop can be driven by a fake in tests, and bridges notify's callback
//! thread into a tokio mpsc channel the loop can `select!` on. Directories
//! are watched individually in non-recursive mode; the loop itself grows the
//! subscription set when new subdirectories appear.

use anyhow::{Context, Result};
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use walkdir::WalkDir;

/// Simplified event kinds the sync loop cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    Created,
    Modified,
    Removed,
    Renamed,
}

/// Item delivered on the watch channel: a change event or a notifier error.
/// The channel closing means the subscription was torn down.
#[derive(Debug, Clone)]
pub enum WatchMessage {
    Event { path: PathBuf, kind: WatchKind },
    Error(String),
}

/// Maps a raw notify event kind onto [`WatchKind`].
///
/// Access events are dropped: they never change directory contents, so they
/// must not re-arm the debounce. Anything else unknown is treated as a
/// modification, which only costs a spurious (idempotent) resync check.
pub fn map_kind(kind: EventKind) -> Option<WatchKind> {
    match kind {
        EventKind::Create(_) => Some(WatchKind::Created),
        EventKind::Modify(ModifyKind::Name(_)) => Some(WatchKind::Renamed),
        EventKind::Modify(_) => Some(WatchKind::Modified),
        EventKind::Remove(_) => Some(WatchKind::Removed),
        EventKind::Access(_) => None,
        _ => Some(WatchKind::Modified),
    }
}

/// Registers directories with the underlying notifier.
pub trait PathWatcher: Send {
    fn watch(&mut self, path: &Path) -> Result<()>;
}

/// [`PathWatcher`] backed by the platform notifier.
pub struct FsWatcher {
    inner: RecommendedWatcher,
}

impl FsWatcher {
    /// Creates a watcher whose events are forwarded into a tokio channel.
    ///
    /// notify runs its callback on a dedicated thread, so forwarding uses
    /// `blocking_send`; a full channel back-pressures that thread rather
    /// than dropping events.
    pub fn with_channel(capacity: usize) -> Result<(Self, mpsc::Receiver<WatchMessage>)> {
        let (tx, rx) = mpsc::channel(capacity);

        let inner = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if let Some(kind) = map_kind(event.kind) {
                        for path in event.paths {
                            let _ = tx.blocking_send(WatchMessage::Event { path, kind });
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.blocking_send(WatchMessage::Error(e.to_string()));
                }
            },
            notify::Config::default(),
        )
        .context("failed to create file watcher")?;

        Ok((Self { inner }, rx))
    }
}

impl PathWatcher for FsWatcher {
    fn watch(&mut self, path: &Path) -> Result<()> {
        self.inner
            .watch(path, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", path.display()))
    }
}

/// Walks `root` and registers it plus every subdirectory with `watcher`,
/// returning the set of watched paths. The sync loop owns that set and adds
/// to it as directory-creation events arrive.
pub fn watch_tree<W: PathWatcher>(watcher: &mut W, root: &Path) -> Result<HashSet<PathBuf>> {
    let mut watched = HashSet::new();

    for entry in WalkDir::new(root) {
        let entry = entry.with_context(|| format!("failed to walk folder {}", root.display()))?;
        if entry.file_type().is_dir() {
            watcher.watch(entry.path())?;
            watched.insert(entry.into_path());
        }
    }

    Ok(watched)
}
