//! Local viewer server: producers push tabs over HTTP, browser views observe them
//! over WebSocket, and file-backed tabs follow their files on disk.

pub mod cli;
pub mod config;
pub mod content;
pub mod hub;
pub mod logging;
pub mod server;
pub mod tabs;
pub mod viewer;
pub mod watcher;

pub use config::Settings;
pub use hub::{Hub, HubEvent};
pub use tabs::{NewTab, Tab, TabKind, TabRegistry};
pub use viewer::Viewer;
pub use watcher::FileWatcher;
