//! Coordinator that wires the registry, the hub and the file watcher together.
//!
//! Every state change follows the same path: mutate the [`TabRegistry`], keep the
//! watch bindings in step, then broadcast the matching [`HubEvent`]. Producers (HTTP),
//! observers (WebSocket) and the file watcher all go through this type.

mod request;

pub use request::{CreateTabRequest, DiffRequest, RequestError};

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::content::FileAccess;
use crate::hub::{ConnectionSettings, Hub, HubEvent, InboundHandler, ObserverCommand, ObserverId};
use crate::tabs::{NewTab, Tab, TabRegistry};
use crate::watcher::{FileEventHandler, FileWatcher, WatchError};

/// Snapshot served by `GET /api/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub version: String,
    pub tabs: usize,
    pub observers: usize,
    pub watched_files: usize,
    /// Seconds since the viewer started.
    pub uptime: u64,
}

pub struct Viewer {
    tabs: TabRegistry,
    hub: Hub,
    watcher: Option<Arc<FileWatcher>>,
    files: FileAccess,
    connection: ConnectionSettings,
    /// Held from a registry mutation through its watch binding and the broadcast
    /// submission, so observers see events in registry order.
    watch_sync: Mutex<()>,
    started: Instant,
}

impl Viewer {
    pub fn new(
        tabs: TabRegistry,
        hub: Hub,
        watcher: Option<Arc<FileWatcher>>,
        files: FileAccess,
    ) -> Self {
        Self {
            tabs,
            hub,
            watcher,
            files,
            connection: ConnectionSettings::default(),
            watch_sync: Mutex::new(()),
            started: Instant::now(),
        }
    }

    pub fn with_connection_settings(mut self, connection: ConnectionSettings) -> Self {
        self.connection = connection;
        self
    }

    /// Build a viewer from settings and start the hub loop and, if enabled, the
    /// file watcher loop on the current runtime.
    pub fn start(settings: &Settings) -> Result<Arc<Viewer>, WatchError> {
        let (hub, _hub_task) = Hub::spawn(&settings.hub);

        let watcher = if settings.watch.enabled {
            Some(Arc::new(FileWatcher::new(settings.watch.debounce())?))
        } else {
            None
        };

        let viewer = Arc::new(
            Viewer::new(
                TabRegistry::with_undo_capacity(settings.tabs.undo_capacity),
                hub,
                watcher,
                FileAccess::new(&settings.file_access),
            )
            .with_connection_settings(ConnectionSettings::from(&settings.hub)),
        );

        if let Some(watcher) = viewer.watcher.clone() {
            let handler: Arc<dyn FileEventHandler> = viewer.clone();
            tokio::spawn(async move {
                if let Err(e) = watcher.run(handler).await {
                    tracing::error!("[watcher] event loop failed: {e}");
                }
            });
        }

        Ok(viewer)
    }

    pub fn tabs(&self) -> &TabRegistry {
        &self.tabs
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn files(&self) -> &FileAccess {
        &self.files
    }

    pub fn watcher(&self) -> Option<&FileWatcher> {
        self.watcher.as_deref()
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        self.connection
    }

    /// Create or update a tab, bind its backing file and announce it.
    pub async fn create_tab(&self, new: NewTab) -> (Tab, bool) {
        let _sync = self.watch_sync.lock().await;
        let (tab, created) = self.tabs.create(new);
        self.bind_watch(&tab);

        crate::debug_event!(
            "viewer",
            if created { "created" } else { "updated" },
            "{} ({})",
            tab.id,
            tab.kind
        );

        let event = if created {
            HubEvent::tab_created(tab.clone())
        } else {
            HubEvent::tab_updated(tab.clone())
        };
        self.publish(event).await;
        (tab, created)
    }

    /// Resolve a producer request and create the tab.
    pub async fn create_from_request(
        &self,
        request: CreateTabRequest,
    ) -> Result<(Tab, bool), RequestError> {
        let new = request.resolve(&self.files)?;
        Ok(self.create_tab(new).await)
    }

    pub async fn delete_tab(&self, id: &str) -> bool {
        let _sync = self.watch_sync.lock().await;
        if let Some(watcher) = &self.watcher {
            watcher.remove(id);
        }
        let deleted = self.tabs.delete(id);

        if deleted {
            self.publish(HubEvent::tab_deleted(id)).await;
        }
        deleted
    }

    pub async fn activate_tab(&self, id: &str) -> bool {
        let _sync = self.watch_sync.lock().await;
        let activated = self.tabs.set_active(id);
        if activated {
            self.publish(HubEvent::tab_activated(id)).await;
        }
        activated
    }

    pub async fn clear_tabs(&self) {
        let _sync = self.watch_sync.lock().await;
        if let Some(watcher) = &self.watcher {
            watcher.clear();
        }
        self.tabs.clear();
        self.publish(HubEvent::tabs_cleared()).await;
    }

    /// Restore the most recently closed tab, re-binding its backing file.
    pub async fn reopen_tab(&self) -> Option<Tab> {
        let _sync = self.watch_sync.lock().await;
        let tab = self.tabs.reopen()?;
        self.bind_watch(&tab);

        self.publish(HubEvent::tab_created(tab.clone())).await;
        self.publish(HubEvent::tab_activated(tab.id.clone())).await;
        Some(tab)
    }

    /// Apply an inbound observer message. Anything unrecognized is ignored.
    pub async fn handle_observer_message(&self, text: &str) {
        match ObserverCommand::parse(text) {
            Some(ObserverCommand::ActivateTab { id }) => {
                self.activate_tab(&id).await;
            }
            Some(ObserverCommand::CloseTab { id }) => {
                self.delete_tab(&id).await;
            }
            None => {
                crate::debug_event!("viewer", "ignored observer message", "{text}");
            }
        }
    }

    pub async fn status(&self) -> Status {
        Status {
            version: env!("CARGO_PKG_VERSION").to_string(),
            tabs: self.tabs.len(),
            observers: self.hub.observer_count().await.unwrap_or(0),
            watched_files: self.watcher.as_ref().map_or(0, |w| w.watch_count()),
            uptime: self.started.elapsed().as_secs(),
        }
    }

    /// Stop the file watcher and the hub. Open observer connections end once their
    /// mailboxes close.
    pub fn shutdown(&self) {
        if let Some(watcher) = &self.watcher {
            watcher.stop();
        }
        self.hub.shutdown();
    }

    /// Best-effort: a tab whose file cannot be watched still exists.
    fn bind_watch(&self, tab: &Tab) {
        let (Some(watcher), Some(path)) = (&self.watcher, &tab.source_path) else {
            return;
        };
        if let Err(e) = watcher.add(path, &tab.id) {
            tracing::warn!("[viewer] not watching {} for tab {}: {e}", path.display(), tab.id);
        }
    }

    async fn publish(&self, event: HubEvent) {
        let kind = event.kind;
        if let Err(e) = self.hub.broadcast(&event).await {
            tracing::warn!("[viewer] failed to broadcast {}: {e}", kind.as_str());
        }
    }
}

#[async_trait]
impl FileEventHandler for Viewer {
    async fn on_change(&self, path: &Path, tab_ids: Vec<String>) {
        let content = match self.files.read(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("[viewer] cannot reload {}: {e}", path.display());
                return;
            }
        };

        let _sync = self.watch_sync.lock().await;
        for id in tab_ids {
            if let Some(tab) = self.tabs.update_content(&id, content.clone()) {
                crate::log_event!("viewer", "reloaded", "{id} from {}", path.display());
                self.publish(HubEvent::tab_updated(tab)).await;
            }
        }
    }

    async fn on_delete(&self, path: &Path, tab_ids: Vec<String>) {
        let _sync = self.watch_sync.lock().await;
        for id in tab_ids {
            if let Some(tab) = self.tabs.mark_stale(&id) {
                crate::log_event!("viewer", "stale", "{id}: {} is gone", path.display());
                self.publish(HubEvent::tab_stale(tab)).await;
            }
        }
    }
}

#[async_trait]
impl InboundHandler for Viewer {
    async fn handle(&self, _observer: ObserverId, text: String) {
        self.handle_observer_message(&text).await;
    }
}
