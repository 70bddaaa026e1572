//! # Hot Reload Module
//!
//! Watches the site root and tells connected browsers to reload when files change.
//!
//! Build tools usually rewrite many files in one go, and editors often save a file in
//! several steps, so events are coalesced: the first change opens a short window, every
//! change arriving inside it joins the same batch, and the batch is published as one
//! [`ReloadHub::notify`] call with root-relative, `/`-separated paths.
//!
//! ```rust,no_run
//! use livepreview::hot_reload::watch_dir;
//! use livepreview::reload::ReloadHub;
//! use std::sync::Arc;
//!
//! let hub = Arc::new(ReloadHub::new());
//! let watcher = watch_dir("_site", Arc::clone(&hub))?;
//! // Browsers are notified until `watcher` is dropped.
//! # drop(watcher);
//! # Ok::<(), notify::Error>(())
//! ```
//!
//! Watching stops when the returned [`DirWatcher`] is dropped.

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::reload::ReloadHub;

/// Length of the coalescing window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Keeps a directory watch alive.
pub struct DirWatcher {
    root: PathBuf,
    _watcher: RecommendedWatcher,
}

impl DirWatcher {
    /// Canonical path of the watched directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl std::fmt::Debug for DirWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirWatcher")
            .field("root", &self.root)
            .finish()
    }
}

/// Watch `root` recursively and publish changes to `hub`.
pub fn watch_dir<P: AsRef<Path>>(root: P, hub: Arc<ReloadHub>) -> notify::Result<DirWatcher> {
    watch_dir_with(root, hub, DEFAULT_DEBOUNCE)
}

/// [`watch_dir`] with a custom coalescing window.
pub fn watch_dir_with<P: AsRef<Path>>(
    root: P,
    hub: Arc<ReloadHub>,
    debounce: Duration,
) -> notify::Result<DirWatcher> {
    let root = fs::canonicalize(root.as_ref()).map_err(notify::Error::io)?;
    let (tx, rx) = mpsc::channel::<Vec<String>>();

    let event_root = root.clone();
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                if !matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    return;
                }
                let files: Vec<String> = event
                    .paths
                    .iter()
                    .filter_map(|p| relative_name(&event_root, p))
                    .collect();
                if !files.is_empty() && tx.send(files).is_err() {
                    debug!("hot-reload: batcher gone; dropping event");
                }
            }
            Err(e) => warn!(error = %e, "hot-reload: watch error"),
        },
        Config::default(),
    )?;
    watcher.watch(&root, RecursiveMode::Recursive)?;

    thread::Builder::new()
        .name("livepreview-watch".to_string())
        .spawn(move || batch_changes(&rx, &hub, debounce))
        .map_err(notify::Error::io)?;

    info!(root = %root.display(), "hot-reload: watching");
    Ok(DirWatcher {
        root,
        _watcher: watcher,
    })
}

fn batch_changes(rx: &mpsc::Receiver<Vec<String>>, hub: &ReloadHub, debounce: Duration) {
    while let Ok(first) = rx.recv() {
        let mut batch: BTreeSet<String> = first.into_iter().collect();
        let deadline = Instant::now() + debounce;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match rx.recv_timeout(remaining) {
                Ok(more) => batch.extend(more),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }
        let files: Vec<String> = batch.into_iter().collect();
        info!(count = files.len(), "hot-reload: files changed");
        hub.notify(files);
    }
    debug!("hot-reload: watcher dropped; batcher exiting");
}

fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let name = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    (!name.is_empty()).then_some(name)
}
