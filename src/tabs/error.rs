//! Error types for tab input validation.

use thiserror::Error;

/// Errors raised while validating producer input, before the registry is touched.
///
/// Absence of a tab is never an error: by-ID registry operations return `bool` or
/// `Option` instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TabError {
    #[error("Invalid type '{0}': must be 'markdown', 'code', or 'diff'")]
    InvalidKind(String),

    #[error("Diff type requires 'diff' object, 'content', or 'file'")]
    MissingDiffData,
}
