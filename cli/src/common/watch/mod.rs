//! # Blade File Watching (`common::watch`)
//!
//! File: cli/src/common/watch/mod.rs
//!
//! ## Overview
//!
//! Watches a directory tree and reports changes to a fixed set of files.
//!
//! - **`FileWatcher`** owns the native watch registration and the event
//!   channel. `poll` blocks for at most the given timeout, drains whatever
//!   arrived, and returns the interesting paths that changed (each once per
//!   batch). It is `Clone`; every clone shares the same registration, so
//!   `close` can be called from any thread.
//! - **`WatchLoop`** runs a `FileWatcher` on its own thread and invokes a
//!   callback for each changed path. The callback runs on that thread.
//!
//! With `recursive` set, directories created after the watch starts are
//! picked up by the native backend, so artifacts written into new nested
//! folders are still reported.
//!
//! Paths are compared in canonical form. A path that can no longer be
//! canonicalised (a deleted file) is compared as reported.
//!
use crate::core::error::{BladeError, Result};
use anyhow::anyhow;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long one `poll` blocks in the watch loop before checking for `close`.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Result of one `FileWatcher::poll`.
#[derive(Debug, PartialEq, Eq)]
pub enum WatchPoll {
    /// Interesting paths changed, in the order first seen, without duplicates.
    Changed(Vec<PathBuf>),
    /// Nothing interesting happened within the timeout.
    Idle,
    /// The watcher was closed; no further events will arrive.
    Closed,
}

#[derive(Clone)]
pub struct FileWatcher {
    shared: Arc<Shared>,
}

struct Shared {
    root: PathBuf,
    interest: HashSet<PathBuf>,
    closed: AtomicBool,
    watcher: Mutex<Option<RecommendedWatcher>>,
    events: Mutex<Receiver<notify::Result<Event>>>,
}

impl FileWatcher {
    /// Starts watching `root` for changes to any path in `interest`.
    pub fn open<I>(root: &Path, recursive: bool, interest: I) -> Result<Self>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let root = normalize(root);
        let interest: HashSet<PathBuf> = interest.into_iter().map(|p| normalize(&p)).collect();

        let (tx, rx) = channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            Config::default(),
        )
        .map_err(|e| anyhow!(BladeError::Watch(format!("Failed to create watcher: {}", e))))?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(&root, mode).map_err(|e| {
            anyhow!(BladeError::Watch(format!(
                "Failed to watch {}: {}",
                root.display(),
                e
            )))
        })?;
        info!(
            "Watching {} ({} tracked files, recursive: {})",
            root.display(),
            interest.len(),
            recursive
        );

        Ok(Self {
            shared: Arc::new(Shared {
                root,
                interest,
                closed: AtomicBool::new(false),
                watcher: Mutex::new(Some(watcher)),
                events: Mutex::new(rx),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Waits up to `timeout` for events and returns the interesting paths that changed.
    pub fn poll(&self, timeout: Duration) -> WatchPoll {
        if self.is_closed() {
            return WatchPoll::Closed;
        }
        let events = self
            .shared
            .events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let first = match events.recv_timeout(timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => {
                return if self.is_closed() {
                    WatchPoll::Closed
                } else {
                    WatchPoll::Idle
                };
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Watch event channel disconnected");
                drop(events);
                self.close();
                return WatchPoll::Closed;
            }
        };
        let mut batch = vec![first];
        batch.extend(events.try_iter());
        drop(events);

        if self.is_closed() {
            return WatchPoll::Closed;
        }

        let mut changed = Vec::new();
        for result in batch {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    warn!("File watch error: {}", e);
                    continue;
                }
            };
            if !matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            ) {
                continue;
            }
            for path in event.paths {
                let path = normalize(&path);
                if self.shared.interest.contains(&path) && !changed.contains(&path) {
                    changed.push(path);
                }
            }
        }

        if changed.is_empty() {
            WatchPoll::Idle
        } else {
            WatchPoll::Changed(changed)
        }
    }

    /// Cancels the watch registration. Safe to call more than once and from any thread.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let watcher = self
            .shared
            .watcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(watcher);
        info!("Stopped watching {}", self.shared.root.display());
    }

    /// Runs `on_change` for every interesting change on a new thread until closed.
    pub fn start<F>(root: &Path, recursive: bool, interest: HashSet<PathBuf>, on_change: F) -> Result<WatchLoop>
    where
        F: FnMut(&Path) + Send + 'static,
    {
        let watcher = Self::open(root, recursive, interest)?;
        WatchLoop::spawn(watcher, on_change)
    }
}

/// A `FileWatcher` driven by its own thread.
pub struct WatchLoop {
    watcher: FileWatcher,
    handle: JoinHandle<()>,
}

impl WatchLoop {
    fn spawn<F>(watcher: FileWatcher, mut on_change: F) -> Result<Self>
    where
        F: FnMut(&Path) + Send + 'static,
    {
        let poller = watcher.clone();
        let handle = thread::Builder::new()
            .name("file-watch".to_string())
            .spawn(move || loop {
                match poller.poll(POLL_INTERVAL) {
                    WatchPoll::Changed(paths) => {
                        for path in paths {
                            debug!("Change detected: {}", path.display());
                            on_change(&path);
                        }
                    }
                    WatchPoll::Idle => {}
                    WatchPoll::Closed => break,
                }
            })
            .map_err(|e| anyhow!(BladeError::Watch(format!("Failed to start watch thread: {}", e))))?;
        Ok(Self { watcher, handle })
    }

    /// A handle for closing the loop from elsewhere.
    pub fn watcher(&self) -> FileWatcher {
        self.watcher.clone()
    }

    pub fn close(&self) {
        self.watcher.close();
    }

    /// Blocks until the loop ends, which happens only after `close`.
    pub fn join(self) -> Result<()> {
        self.handle
            .join()
            .map_err(|_| anyhow!(BladeError::Watch("Watch thread panicked".to_string())))
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
