//! Error types for the file watcher.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from watcher operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch {}: {reason}", path.display())]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("Not a regular file: {}", path.display())]
    NotAFile { path: PathBuf },

    #[error("Watcher event loop is already running")]
    AlreadyRunning,

    #[error("Watcher has been stopped")]
    Stopped,
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}
