//! Live notification source backed by the `notify` crate
//!
//! The watcher callback runs on notify's own thread and feeds the
//! [`Coalescer`] directly. The first error reported by the backend is
//! forwarded on the fatal channel and closes intake: later notifications are
//! dropped, while countdowns already pending still fire.

use fprint_core::{WatchEvent, WatchKind};
use notify::event::ModifyKind;
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::coalescer::Coalescer;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("creating file watcher: {0}")]
    Init(#[source] notify::Error),

    #[error("watching {}: {source}", path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("watch source failed: {0}")]
    Source(#[source] notify::Error),
}

/// Map a notify event kind onto the coalescer's three-way split.
pub fn classify(kind: &EventKind) -> WatchKind {
    match kind {
        EventKind::Create(_) => WatchKind::Created,
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
            WatchKind::Written
        }
        _ => WatchKind::Other,
    }
}

/// One `WatchEvent` per path carried by a notify event.
pub fn translate(event: &notify::Event) -> impl Iterator<Item = WatchEvent> + '_ {
    let kind = classify(&event.kind);
    event
        .paths
        .iter()
        .map(move |path| WatchEvent::new(path.clone(), kind))
}

/// A running watch on one root directory. Dropping it stops the watch.
pub struct WatchSource {
    _watcher: RecommendedWatcher,
    root: PathBuf,
    recursive: bool,
}

impl std::fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSource")
            .field("root", &self.root)
            .field("recursive", &self.recursive)
            .finish()
    }
}

impl WatchSource {
    /// Start watching `root` and forward notifications into `coalescer`.
    ///
    /// Returns the running source and the fatal-error channel. Failing to
    /// register the watch at all is returned directly.
    pub fn start(
        root: &Path,
        recursive: bool,
        coalescer: Coalescer,
    ) -> Result<(Self, mpsc::UnboundedReceiver<WatchError>), WatchError> {
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                if closed.load(Ordering::Acquire) {
                    return;
                }
                match res {
                    Ok(event) => {
                        for ev in translate(&event) {
                            coalescer.notify(ev);
                        }
                    }
                    Err(e) => {
                        closed.store(true, Ordering::Release);
                        error!(error = %e, "watch source error, intake closed");
                        let _ = fatal_tx.send(WatchError::Source(e));
                    }
                }
            },
            Config::default(),
        )
        .map_err(WatchError::Init)?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(root, mode)
            .map_err(|source| WatchError::Watch {
                path: root.to_path_buf(),
                source,
            })?;

        info!(root = %root.display(), recursive, "watching");

        Ok((
            Self {
                _watcher: watcher,
                root: root.to_path_buf(),
                recursive,
            },
            fatal_rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
