//! Tab document types shared by the registry, the hub and the HTTP surface.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::TabError;

/// Kind of content a tab carries. Rendering happens in the browser; the server only
/// routes the raw text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabKind {
    #[default]
    Markdown,
    Code,
    Diff,
}

impl TabKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TabKind::Markdown => "markdown",
            TabKind::Code => "code",
            TabKind::Diff => "diff",
        }
    }
}

impl fmt::Display for TabKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TabKind {
    type Err = TabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "markdown" => Ok(TabKind::Markdown),
            "code" => Ok(TabKind::Code),
            "diff" => Ok(TabKind::Diff),
            other => Err(TabError::InvalidKind(other.to_string())),
        }
    }
}

/// Labels shown above the two sides of a diff tab.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub left_label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub right_label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub language: String,
}

/// A tab as handed out by the registry.
///
/// Every `Tab` a caller receives is a detached copy: `active` is computed at read time
/// from the registry's single active pointer and is never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: TabKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(rename = "diff", default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<DiffMeta>,
    /// File the tab reloads from when it changes on disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub active: bool,
    /// Backing file was deleted or renamed since the last successful read.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stale: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Producer input for [`TabRegistry::create`](super::TabRegistry::create).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTab {
    /// Explicit ID for idempotent create-or-update. Generated when absent or empty.
    pub id: Option<String>,
    pub title: String,
    pub kind: TabKind,
    pub content: String,
    pub language: Option<String>,
    pub diff: Option<DiffMeta>,
    pub source_path: Option<PathBuf>,
}

impl NewTab {
    pub fn new(title: impl Into<String>, kind: TabKind, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            kind,
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_diff(mut self, diff: DiffMeta) -> Self {
        self.diff = Some(diff);
        self
    }

    pub fn with_source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }
}
