//! Configuration module for the tab viewer server.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `TABVIEW_` and use double underscores
//! to separate nested levels:
//! - `TABVIEW_SERVER__BIND=127.0.0.1:4000` sets `server.bind`
//! - `TABVIEW_WATCH__DEBOUNCE_MS=250` sets `watch.debounce_ms`
//! - `TABVIEW_HUB__MAILBOX_CAPACITY=64` sets `hub.mailbox_capacity`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory holding the settings file, searched for in the current directory's ancestors.
pub const CONFIG_DIR: &str = ".tabview";

/// Settings file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "settings.toml";

const ENV_PREFIX: &str = "TABVIEW_";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Broadcast hub and observer connection settings
    #[serde(default)]
    pub hub: HubConfig,

    /// File watching settings
    #[serde(default)]
    pub watch: WatchConfig,

    /// Tab registry settings
    #[serde(default)]
    pub tabs: TabsConfig,

    /// Restrictions on which files tabs may be read from
    #[serde(default)]
    pub file_access: FileAccessConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Open the default browser after the server starts
    #[serde(default = "default_false")]
    pub open_browser: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HubConfig {
    /// Outbound frames buffered per observer before it is dropped as stalled
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// Pending register/unregister/broadcast requests queued for the hub loop
    #[serde(default = "default_request_capacity")]
    pub request_capacity: usize,

    /// Idle interval after which a keepalive ping is sent
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// Upper bound for a single outbound write or ping
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// Reload file-backed tabs when their file changes on disk
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Quiet period before a burst of writes is reported as one change
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TabsConfig {
    /// Number of closed tabs kept for reopening
    #[serde(default = "default_undo_capacity")]
    pub undo_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct FileAccessConfig {
    /// Directories files may be read from. Empty allows every directory.
    #[serde(default)]
    pub allowed_dirs: Vec<PathBuf>,

    /// Log every file access decision
    #[serde(default = "default_false")]
    pub log_access: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for every target
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides, e.g. `watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_bind() -> String {
    "127.0.0.1:3333".to_string()
}
fn default_mailbox_capacity() -> usize {
    256
}
fn default_request_capacity() -> usize {
    256
}
fn default_keepalive_secs() -> u64 {
    30
}
fn default_write_timeout_secs() -> u64 {
    10
}
fn default_debounce_ms() -> u64 {
    100
}
fn default_undo_capacity() -> usize {
    10
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            server: ServerConfig::default(),
            hub: HubConfig::default(),
            watch: WatchConfig::default(),
            tabs: TabsConfig::default(),
            file_access: FileAccessConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            open_browser: false,
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: default_mailbox_capacity(),
            request_capacity: default_request_capacity(),
            keepalive_secs: default_keepalive_secs(),
            write_timeout_secs: default_write_timeout_secs(),
        }
    }
}

impl HubConfig {
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for TabsConfig {
    fn default() -> Self {
        Self {
            undo_capacity: default_undo_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honoring environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels; single underscores stay in field names
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find the nearest `.tabview/settings.toml`, searching from the current directory up.
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join(CONFIG_FILE));
            }
        }

        None
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file in the current directory.
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        let existed = config_path.exists();
        Settings::default().save(&config_path)?;

        if existed {
            println!("Overwrote configuration at: {}", config_path.display());
        } else {
            println!("Created default configuration at: {}", config_path.display());
        }

        Ok(config_path)
    }
}
