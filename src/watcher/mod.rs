//! File watching for file-backed tabs.
//!
//! ```text
//! notify (parent directories, non-recursive)
//!         |
//!    FileWatcher ── Debouncer (changes only)
//!         |
//!  FileEventHandler::on_change / on_delete (path, tab IDs)
//! ```
//!
//! Changes are debounced per path. Deletions and renames are reported right
//! away and cancel any pending change for the same path.

mod debouncer;
mod error;
mod file_watcher;

pub use debouncer::Debouncer;
pub use error::WatchError;
pub use file_watcher::{FileEventHandler, FileWatcher};
