//! Wire messages exchanged with observers.

use serde::{Deserialize, Serialize};

use crate::tabs::Tab;

/// What changed. Serialized as the `type` field of an outbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TabCreated,
    TabUpdated,
    TabDeleted,
    TabActivated,
    TabsCleared,
    TabStale,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TabCreated => "tab_created",
            EventKind::TabUpdated => "tab_updated",
            EventKind::TabDeleted => "tab_deleted",
            EventKind::TabActivated => "tab_activated",
            EventKind::TabsCleared => "tabs_cleared",
            EventKind::TabStale => "tab_stale",
        }
    }
}

/// Outbound event: `{"type": ..., "id"?: ..., "tab"?: ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab: Option<Tab>,
}

impl HubEvent {
    fn with_tab(kind: EventKind, tab: Tab) -> Self {
        Self {
            kind,
            id: None,
            tab: Some(tab),
        }
    }

    fn with_id(kind: EventKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: Some(id.into()),
            tab: None,
        }
    }

    pub fn tab_created(tab: Tab) -> Self {
        Self::with_tab(EventKind::TabCreated, tab)
    }

    pub fn tab_updated(tab: Tab) -> Self {
        Self::with_tab(EventKind::TabUpdated, tab)
    }

    pub fn tab_stale(tab: Tab) -> Self {
        Self::with_tab(EventKind::TabStale, tab)
    }

    pub fn tab_deleted(id: impl Into<String>) -> Self {
        Self::with_id(EventKind::TabDeleted, id)
    }

    pub fn tab_activated(id: impl Into<String>) -> Self {
        Self::with_id(EventKind::TabActivated, id)
    }

    pub fn tabs_cleared() -> Self {
        Self {
            kind: EventKind::TabsCleared,
            id: None,
            tab: None,
        }
    }
}

/// Inbound command from a browser view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverCommand {
    ActivateTab { id: String },
    CloseTab { id: String },
}

impl ObserverCommand {
    /// Parse an inbound text frame. Unknown types, malformed JSON and empty IDs yield `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let command: ObserverCommand = serde_json::from_str(text).ok()?;
        let id = match &command {
            ObserverCommand::ActivateTab { id } | ObserverCommand::CloseTab { id } => id,
        };
        (!id.is_empty()).then_some(command)
    }
}
