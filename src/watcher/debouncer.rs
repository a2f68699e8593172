//! Per-path debouncing of change notifications.
//!
//! Editors often write a file several times per save (truncate, write, chmod).
//! Only the last change in a burst is reported.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Tracks the last change time of each path and releases paths that have been
/// quiet for the configured window.
#[derive(Debug)]
pub struct Debouncer {
    pending: HashMap<PathBuf, Instant>,
    window: Duration,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            window,
        }
    }

    /// Record a change. Restarts the quiet window for this path.
    pub fn record(&mut self, path: PathBuf) {
        self.pending.insert(path, Instant::now());
    }

    /// Forget a pending change, e.g. because the file was deleted.
    pub fn remove(&mut self, path: &Path) -> bool {
        self.pending.remove(path).is_some()
    }

    /// Paths whose quiet window has elapsed. They are no longer pending afterwards.
    pub fn take_ready(&mut self) -> Vec<PathBuf> {
        let now = Instant::now();
        let mut ready = Vec::new();

        self.pending.retain(|path, last_change| {
            if now.duration_since(*last_change) >= self.window {
                ready.push(path.clone());
                false
            } else {
                true
            }
        });

        ready
    }

    /// When the earliest pending path becomes ready.
    pub fn next_ready_at(&self) -> Option<Instant> {
        self.pending
            .values()
            .min()
            .map(|last_change| *last_change + self.window)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    const WINDOW: Duration = Duration::from_millis(50);

    #[test]
    fn test_quiet_path_becomes_ready() {
        let mut debouncer = Debouncer::new(WINDOW);
        let path = PathBuf::from("/notes/today.md");

        debouncer.record(path.clone());
        assert!(debouncer.take_ready().is_empty());
        assert_eq!(debouncer.pending_count(), 1);

        sleep(Duration::from_millis(60));
        assert_eq!(debouncer.take_ready(), vec![path]);
        assert!(!debouncer.has_pending());
        assert!(debouncer.next_ready_at().is_none());
    }

    #[test]
    fn test_burst_collapses_to_one() {
        let mut debouncer = Debouncer::new(WINDOW);
        let path = PathBuf::from("/notes/today.md");

        for _ in 0..3 {
            debouncer.record(path.clone());
            sleep(Duration::from_millis(20));
            assert!(debouncer.take_ready().is_empty());
        }

        sleep(Duration::from_millis(40));
        assert_eq!(debouncer.take_ready().len(), 1);
        assert!(debouncer.take_ready().is_empty());
    }

    #[test]
    fn test_next_ready_at_tracks_earliest() {
        let mut debouncer = Debouncer::new(WINDOW);
        let before = Instant::now();
        debouncer.record(PathBuf::from("/a"));
        sleep(Duration::from_millis(10));
        debouncer.record(PathBuf::from("/b"));

        let at = debouncer.next_ready_at().unwrap();
        assert!(at >= before + WINDOW);
        assert!(at < Instant::now() + WINDOW);
    }

    #[test]
    fn test_remove_cancels_pending() {
        let mut debouncer = Debouncer::new(WINDOW);
        let path = PathBuf::from("/notes/today.md");

        debouncer.record(path.clone());
        assert!(debouncer.remove(&path));
        assert!(!debouncer.remove(&path));

        sleep(Duration::from_millis(60));
        assert!(debouncer.take_ready().is_empty());
    }
}
