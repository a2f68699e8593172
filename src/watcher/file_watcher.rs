//! File watcher that maps watched files to the tabs displaying them.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::debouncer::Debouncer;
use super::error::WatchError;

/// Receives file notifications together with the tabs bound to the file.
///
/// Called from the watcher task with no watcher lock held, so implementations may
/// call back into the [`FileWatcher`].
#[async_trait]
pub trait FileEventHandler: Send + Sync {
    /// The file changed and has been quiet for the debounce window.
    async fn on_change(&self, path: &Path, tab_ids: Vec<String>);

    /// The file was deleted or renamed away. Reported once per disappearance.
    async fn on_delete(&self, path: &Path, tab_ids: Vec<String>);
}

struct WatchState {
    /// Dropped by [`FileWatcher::stop`].
    watcher: Option<RecommendedWatcher>,
    /// Canonical file path -> tabs bound to it, in binding order.
    by_path: HashMap<PathBuf, Vec<String>>,
    by_tab: HashMap<String, PathBuf>,
    /// Parent directory -> number of watched files inside it.
    dirs: HashMap<PathBuf, usize>,
    /// Paths whose disappearance was already reported.
    gone: HashSet<PathBuf>,
}

impl WatchState {
    fn attach(&mut self, path: &Path, tab_id: &str) -> Result<(), WatchError> {
        if !self.by_path.contains_key(path) {
            let dir = parent_dir(path);
            let count = self.dirs.get(&dir).copied().unwrap_or(0);
            if count == 0 {
                let watcher = self.watcher.as_mut().ok_or(WatchError::Stopped)?;
                watcher
                    .watch(&dir, RecursiveMode::NonRecursive)
                    .map_err(|e| WatchError::PathWatchFailed {
                        path: dir.clone(),
                        reason: e.to_string(),
                    })?;
                crate::debug_event!("watcher", "watching", "{}", dir.display());
            }
            self.dirs.insert(dir, count + 1);
        }

        self.by_path
            .entry(path.to_path_buf())
            .or_default()
            .push(tab_id.to_string());
        self.by_tab.insert(tab_id.to_string(), path.to_path_buf());
        self.gone.remove(path);
        Ok(())
    }

    fn detach(&mut self, path: &Path, tab_id: &str) {
        let Some(tabs) = self.by_path.get_mut(path) else {
            return;
        };
        tabs.retain(|id| id != tab_id);
        if tabs.is_empty() {
            self.forget_path(path);
        }
    }

    fn forget_path(&mut self, path: &Path) -> Vec<String> {
        let Some(tabs) = self.by_path.remove(path) else {
            return Vec::new();
        };
        for id in &tabs {
            self.by_tab.remove(id);
        }
        self.gone.remove(path);

        let dir = parent_dir(path);
        if let Some(count) = self.dirs.get_mut(&dir) {
            *count -= 1;
            if *count == 0 {
                self.dirs.remove(&dir);
                if let Some(watcher) = self.watcher.as_mut() {
                    if let Err(e) = watcher.unwatch(&dir) {
                        crate::debug_event!("watcher", "unwatch failed", "{}: {e}", dir.display());
                    }
                }
            }
        }
        tabs
    }
}

/// Watches individual files on behalf of tabs.
///
/// Each file is watched through its parent directory so that editors which save
/// by writing a new file and renaming it over the old one keep being tracked.
/// Many tabs may share one file; a tab is bound to at most one file.
pub struct FileWatcher {
    state: Mutex<WatchState>,
    events: Mutex<Option<mpsc::UnboundedReceiver<notify::Result<Event>>>>,
    debounce: Duration,
    cancel: CancellationToken,
}

impl FileWatcher {
    pub fn new(debounce: Duration) -> Result<Self, WatchError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })?;

        Ok(Self {
            state: Mutex::new(WatchState {
                watcher: Some(watcher),
                by_path: HashMap::new(),
                by_tab: HashMap::new(),
                dirs: HashMap::new(),
                gone: HashSet::new(),
            }),
            events: Mutex::new(Some(rx)),
            debounce,
            cancel: CancellationToken::new(),
        })
    }

    /// Bind `tab_id` to the file at `path`, replacing any previous binding of that
    /// tab. Returns the canonical path being watched.
    pub fn add(&self, path: impl AsRef<Path>, tab_id: &str) -> Result<PathBuf, WatchError> {
        let path = path.as_ref();
        let canonical = std::fs::canonicalize(path).map_err(|e| WatchError::PathWatchFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !canonical.is_file() {
            return Err(WatchError::NotAFile { path: canonical });
        }

        let mut state = self.state.lock();
        if state.watcher.is_none() {
            return Err(WatchError::Stopped);
        }
        if state.by_tab.get(tab_id) == Some(&canonical) {
            return Ok(canonical);
        }
        if let Some(previous) = state.by_tab.remove(tab_id) {
            state.detach(&previous, tab_id);
        }
        state.attach(&canonical, tab_id)?;

        crate::debug_event!(
            "watcher",
            "bound",
            "{tab_id} -> {}",
            canonical.display()
        );
        Ok(canonical)
    }

    /// Unbind a tab. The file stops being watched once no tab is bound to it.
    pub fn remove(&self, tab_id: &str) -> Option<PathBuf> {
        let mut state = self.state.lock();
        let path = state.by_tab.remove(tab_id)?;
        state.detach(&path, tab_id);
        Some(path)
    }

    /// Stop watching `path` entirely. Returns the tabs that were bound to it.
    pub fn remove_path(&self, path: impl AsRef<Path>) -> Vec<String> {
        let key = watch_key(path.as_ref());
        self.state.lock().forget_path(&key)
    }

    /// Drop every binding.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let paths: Vec<PathBuf> = state.by_path.keys().cloned().collect();
        for path in paths {
            state.forget_path(&path);
        }
    }

    pub fn path_for_tab(&self, tab_id: &str) -> Option<PathBuf> {
        self.state.lock().by_tab.get(tab_id).cloned()
    }

    pub fn tabs_watching(&self, path: impl AsRef<Path>) -> Vec<String> {
        let key = watch_key(path.as_ref());
        self.state
            .lock()
            .by_path
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of distinct files being watched.
    pub fn watch_count(&self) -> usize {
        self.state.lock().by_path.len()
    }

    /// Process file events until [`FileWatcher::stop`] is called.
    ///
    /// Only one event loop may run per watcher.
    pub async fn run(&self, handler: Arc<dyn FileEventHandler>) -> Result<(), WatchError> {
        let mut events = self.events.lock().take().ok_or(WatchError::AlreadyRunning)?;
        let mut debouncer = Debouncer::new(self.debounce);

        crate::debug_event!("watcher", "started");

        loop {
            let deadline = debouncer.next_ready_at();

            tokio::select! {
                _ = self.cancel.cancelled() => break,

                event = events.recv() => match event {
                    Some(Ok(event)) => {
                        self.handle_event(event, &mut debouncer, handler.as_ref()).await;
                    }
                    Some(Err(e)) => {
                        tracing::error!("[watcher] file watch error: {e}");
                    }
                    None => break,
                },

                _ = sleep_until(deadline) => {
                    for path in debouncer.take_ready() {
                        self.process_change(&path, handler.as_ref()).await;
                    }
                }
            }
        }

        crate::debug_event!("watcher", "stopped");
        Ok(())
    }

    /// Stop the event loop, drop every binding and release the OS watcher.
    /// Later calls to [`FileWatcher::add`] fail with [`WatchError::Stopped`].
    pub fn stop(&self) {
        self.cancel.cancel();
        self.clear();
        self.state.lock().watcher = None;
    }

    async fn handle_event(
        &self,
        event: Event,
        debouncer: &mut Debouncer,
        handler: &dyn FileEventHandler,
    ) {
        for path in event.paths {
            if !self.is_watched(&path) {
                continue;
            }

            match event.kind {
                EventKind::Create(_)
                | EventKind::Any
                | EventKind::Modify(
                    ModifyKind::Data(_) | ModifyKind::Any | ModifyKind::Other,
                ) => {
                    debouncer.record(path);
                }
                EventKind::Modify(ModifyKind::Name(_)) => {
                    // Both ends of a rename arrive here; the surviving name is a change
                    if path.exists() {
                        debouncer.record(path);
                    } else {
                        debouncer.remove(&path);
                        self.process_delete(&path, handler).await;
                    }
                }
                EventKind::Remove(_) => {
                    debouncer.remove(&path);
                    self.process_delete(&path, handler).await;
                }
                _ => {}
            }
        }
    }

    async fn process_change(&self, path: &Path, handler: &dyn FileEventHandler) {
        if !path.exists() {
            self.process_delete(path, handler).await;
            return;
        }

        let tabs = {
            let mut state = self.state.lock();
            state.gone.remove(path);
            state.by_path.get(path).cloned().unwrap_or_default()
        };
        if tabs.is_empty() {
            return;
        }

        crate::debug_event!("watcher", "changed", "{}", path.display());
        handler.on_change(path, tabs).await;
    }

    async fn process_delete(&self, path: &Path, handler: &dyn FileEventHandler) {
        let tabs = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            match state.by_path.get(path) {
                Some(tabs) if state.gone.insert(path.to_path_buf()) => tabs.clone(),
                _ => return,
            }
        };

        crate::log_event!("watcher", "deleted", "{}", path.display());
        handler.on_delete(path, tabs).await;
    }

    fn is_watched(&self, path: &Path) -> bool {
        self.state.lock().by_path.contains_key(path)
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Canonical form used as the map key; falls back to the given path when the file
/// no longer exists.
fn watch_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

async fn sleep_until(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at.into()).await,
        None => std::future::pending().await,
    }
}
