//! Producer create requests and their resolution into [`NewTab`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::content::{self, ContentError, FileAccess};
use crate::tabs::{DiffMeta, NewTab, TabError, TabKind};

/// Why a create request was rejected. Nothing is mutated when this is returned.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error(transparent)]
    Tab(#[from] TabError),

    #[error("Cannot read {side}: {source}")]
    File {
        side: &'static str,
        #[source]
        source: ContentError,
    },
}

impl RequestError {
    fn file(side: &'static str) -> impl FnOnce(ContentError) -> Self {
        move |source| RequestError::File { side, source }
    }
}

/// Body of `POST /api/tabs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTabRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub content: String,
    /// Backing file. Read when `content` is empty and watched for changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<DiffRequest>,
}

/// Diff source: either a ready-made unified diff or two files to compare.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<PathBuf>,
    #[serde(default)]
    pub left_label: String,
    #[serde(default)]
    pub right_label: String,
    #[serde(default)]
    pub unified: String,
    #[serde(default)]
    pub language: String,
}

impl DiffRequest {
    fn sides(&self) -> Option<(&Path, &Path)> {
        match (non_empty_path(&self.left), non_empty_path(&self.right)) {
            (Some(left), Some(right)) => Some((left, right)),
            _ => None,
        }
    }

    fn has_data(&self) -> bool {
        !self.unified.is_empty() || self.sides().is_some()
    }
}

impl CreateTabRequest {
    /// Validate the request and gather its content.
    ///
    /// Files are read through `files`, so the allow-list applies. Kind and language
    /// are detected when not given.
    pub fn resolve(self, files: &FileAccess) -> Result<NewTab, RequestError> {
        let kind = match self.kind.as_deref().filter(|k| !k.is_empty()) {
            Some(kind) => Some(kind.parse::<TabKind>()?),
            None => None,
        };
        let file = self.file.filter(|p| !p.as_os_str().is_empty());

        if kind == Some(TabKind::Diff) && self.content.is_empty() && file.is_none() {
            let has_data = self.diff.as_ref().is_some_and(DiffRequest::has_data);
            if !has_data {
                return Err(TabError::MissingDiffData.into());
            }
        }

        let mut content = self.content;
        let source_path = match &file {
            Some(path) => {
                let resolved = files.validate(path).map_err(RequestError::file("file"))?;
                if content.is_empty() {
                    content = files.read(&resolved).map_err(RequestError::file("file"))?;
                }
                Some(resolved)
            }
            None => None,
        };

        let mut diff_meta = None;
        let diff = self.diff.filter(|_| kind == Some(TabKind::Diff));
        if let Some(diff) = diff {
            let mut language = diff.language.clone();
            if !diff.unified.is_empty() {
                content = diff.unified.clone();
            } else if let Some((left, right)) = diff.sides() {
                let left_text = files.read(left).map_err(RequestError::file("left file"))?;
                let right_text = files.read(right).map_err(RequestError::file("right file"))?;
                content = content::unified_diff(
                    &left.to_string_lossy(),
                    &right.to_string_lossy(),
                    &left_text,
                    &right_text,
                );
                if language.is_empty() {
                    language = content::detect_language(left).unwrap_or_default();
                }
            }
            diff_meta = Some(DiffMeta {
                left_label: diff.left_label,
                right_label: diff.right_label,
                language,
            });
        }

        let kind = kind.unwrap_or_else(|| content::detect_kind(file.as_deref(), &content));

        let language = match self.language.filter(|l| !l.is_empty()) {
            Some(language) => Some(language),
            None if kind == TabKind::Code => file.as_deref().and_then(content::detect_language),
            None => None,
        };

        let title = if self.title.is_empty() {
            file.as_deref()
                .and_then(Path::file_name)
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        } else {
            self.title
        };

        Ok(NewTab {
            id: self.id.filter(|id| !id.is_empty()),
            title,
            kind,
            content,
            language,
            diff: diff_meta,
            source_path,
        })
    }
}

fn non_empty_path(path: &Option<PathBuf>) -> Option<&Path> {
    path.as_deref().filter(|p| !p.as_os_str().is_empty())
}
