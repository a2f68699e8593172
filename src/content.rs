//! Reading tab content from disk and guessing what it is.
//!
//! File reads go through [`FileAccess`], which resolves paths, enforces the optional
//! directory allow-list and rejects anything that is not a regular file. Kind and
//! language detection only look at the file name and a few content markers; real
//! rendering happens in the browser.

use std::io;
use std::path::{Component, Path, PathBuf};

use similar::TextDiff;
use thiserror::Error;

use crate::config::FileAccessConfig;
use crate::tabs::TabKind;

/// Errors from reading a tab's backing file.
#[derive(Error, Debug)]
pub enum ContentError {
    #[error("path cannot be empty")]
    EmptyPath,

    #[error("cannot resolve path {}: {source}", path.display())]
    Resolve { path: PathBuf, source: io::Error },

    #[error("access denied: path not in allowed directories: {}", path.display())]
    AccessDenied { path: PathBuf },

    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("path is a directory, not a file: {}", path.display())]
    IsDirectory { path: PathBuf },

    #[error("path is not a regular file: {}", path.display())]
    NotRegularFile { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl ContentError {
    fn from_io(path: PathBuf, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => ContentError::NotFound { path },
            io::ErrorKind::PermissionDenied => ContentError::PermissionDenied { path },
            _ => ContentError::Io { path, source },
        }
    }
}

/// Gatekeeper for every file the server reads on behalf of a producer or the watcher.
#[derive(Debug, Clone, Default)]
pub struct FileAccess {
    allowed_dirs: Vec<PathBuf>,
    log_access: bool,
}

impl FileAccess {
    pub fn new(config: &FileAccessConfig) -> Self {
        let allowed_dirs = config
            .allowed_dirs
            .iter()
            .filter_map(|dir| absolute_clean(dir).ok())
            .collect();

        Self {
            allowed_dirs,
            log_access: config.log_access,
        }
    }

    /// No allow-list, no access logging.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Resolve `path` to a clean absolute path and check it against the allow-list.
    pub fn validate(&self, path: &Path) -> Result<PathBuf, ContentError> {
        if path.as_os_str().is_empty() {
            return Err(ContentError::EmptyPath);
        }

        let resolved = absolute_clean(path).map_err(|source| ContentError::Resolve {
            path: path.to_path_buf(),
            source,
        })?;

        if !self.allowed_dirs.is_empty()
            && !self.allowed_dirs.iter().any(|dir| resolved.starts_with(dir))
        {
            self.log(&resolved, false, "path not in allowed directories");
            return Err(ContentError::AccessDenied { path: resolved });
        }

        Ok(resolved)
    }

    /// Read a regular file as text. Invalid UTF-8 is replaced rather than rejected.
    pub fn read(&self, path: &Path) -> Result<String, ContentError> {
        let path = self.validate(path)?;

        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) => {
                self.log(&path, false, "cannot stat");
                return Err(ContentError::from_io(path, e));
            }
        };

        if metadata.is_dir() {
            self.log(&path, false, "is a directory");
            return Err(ContentError::IsDirectory { path });
        }
        if !metadata.is_file() {
            self.log(&path, false, "not a regular file");
            return Err(ContentError::NotRegularFile { path });
        }

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.log(&path, false, "read failed");
                return Err(ContentError::from_io(path, e));
            }
        };

        self.log(&path, true, "");
        Ok(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    fn log(&self, path: &Path, allowed: bool, reason: &str) {
        if !self.log_access {
            return;
        }
        let status = if allowed { "ALLOWED" } else { "DENIED" };
        if reason.is_empty() {
            crate::log_event!("file-access", status, "{}", path.display());
        } else {
            crate::log_event!("file-access", status, "{} ({reason})", path.display());
        }
    }
}

/// Make `path` absolute against the current directory and fold `.`/`..` lexically.
fn absolute_clean(path: &Path) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut cleaned = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    Ok(cleaned)
}

/// Guess the tab kind from a file name, falling back to content markers.
pub fn detect_kind(filename: Option<&Path>, content: &str) -> TabKind {
    if let Some(filename) = filename {
        match extension(filename).as_deref() {
            Some("md" | "markdown") => return TabKind::Markdown,
            Some("diff" | "patch") => return TabKind::Diff,
            _ => {}
        }
        if detect_language(filename).is_some() {
            return TabKind::Code;
        }
    }

    if content.starts_with("diff ") || content.starts_with("--- ") || content.starts_with("+++ ")
    {
        return TabKind::Diff;
    }

    TabKind::Markdown
}

/// Map a file name to a syntax-highlighting language tag.
pub fn detect_language(filename: &Path) -> Option<String> {
    let base = filename
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())?;

    let special = match base.as_str() {
        "dockerfile" => Some("dockerfile"),
        "makefile" => Some("makefile"),
        ".gitignore" | ".dockerignore" => Some("plaintext"),
        _ => None,
    };
    if let Some(lang) = special {
        return Some(lang.to_string());
    }

    let lang = match extension(filename)?.as_str() {
        "go" => "go",
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "py" => "python",
        "rb" => "ruby",
        "rs" => "rust",
        "java" => "java",
        "kt" => "kotlin",
        "swift" => "swift",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" => "cpp",
        "cs" => "csharp",
        "php" => "php",
        "sh" | "bash" | "zsh" => "bash",
        "fish" => "fish",
        "ps1" => "powershell",
        "sql" => "sql",
        "html" | "htm" => "html",
        "css" => "css",
        "scss" => "scss",
        "sass" => "sass",
        "less" => "less",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "xml" => "xml",
        "toml" => "toml",
        "ini" | "cfg" => "ini",
        "conf" => "nginx",
        "lua" => "lua",
        "pl" => "perl",
        "r" => "r",
        "m" => "matlab",
        "scala" => "scala",
        "ex" | "exs" => "elixir",
        "erl" => "erlang",
        "hs" => "haskell",
        "clj" => "clojure",
        "elm" => "elm",
        "vue" => "vue",
        "svelte" => "svelte",
        _ => return None,
    };
    Some(lang.to_string())
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

/// Line-based unified diff of two texts, headed with their paths.
pub fn unified_diff(left_path: &str, right_path: &str, left: &str, right: &str) -> String {
    TextDiff::from_lines(left, right)
        .unified_diff()
        .context_radius(3)
        .header(left_path, right_path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_read_regular_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("notes.md");
        fs::write(&file, "# Notes\n").unwrap();

        let content = FileAccess::unrestricted().read(&file).unwrap();
        assert_eq!(content, "# Notes\n");
    }

    #[test]
    fn test_read_rejects_missing_and_directories() {
        let dir = TempDir::new().unwrap();
        let access = FileAccess::unrestricted();

        assert!(matches!(
            access.read(&dir.path().join("absent.md")),
            Err(ContentError::NotFound { .. })
        ));
        assert!(matches!(
            access.read(dir.path()),
            Err(ContentError::IsDirectory { .. })
        ));
        assert!(matches!(
            access.read(Path::new("")),
            Err(ContentError::EmptyPath)
        ));
    }

    #[test]
    fn test_allow_list_blocks_outside_paths() {
        let allowed = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let inside_file = allowed.path().join("ok.txt");
        let outside_file = outside.path().join("secret.txt");
        fs::write(&inside_file, "ok").unwrap();
        fs::write(&outside_file, "secret").unwrap();

        let access = FileAccess::new(&FileAccessConfig {
            allowed_dirs: vec![allowed.path().to_path_buf()],
            log_access: true,
        });

        assert_eq!(access.read(&inside_file).unwrap(), "ok");
        assert!(matches!(
            access.read(&outside_file),
            Err(ContentError::AccessDenied { .. })
        ));

        // Escaping the allowed directory through `..` is caught after cleaning
        let sneaky = allowed
            .path()
            .join("..")
            .join(outside.path().file_name().unwrap())
            .join("secret.txt");
        assert!(matches!(
            access.read(&sneaky),
            Err(ContentError::AccessDenied { .. })
        ));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("bin.txt");
        fs::write(&file, [b'o', b'k', 0xff]).unwrap();

        let content = FileAccess::unrestricted().read(&file).unwrap();
        assert!(content.starts_with("ok"));
    }

    #[test]
    fn test_detect_kind() {
        assert_eq!(detect_kind(Some(Path::new("README.md")), ""), TabKind::Markdown);
        assert_eq!(detect_kind(Some(Path::new("fix.patch")), ""), TabKind::Diff);
        assert_eq!(detect_kind(Some(Path::new("main.rs")), ""), TabKind::Code);
        assert_eq!(detect_kind(Some(Path::new("notes.txt")), "plain"), TabKind::Markdown);
        assert_eq!(detect_kind(None, "--- a/x\n+++ b/x\n"), TabKind::Diff);
        assert_eq!(detect_kind(None, "diff --git a/x b/x"), TabKind::Diff);
        assert_eq!(detect_kind(None, "just words"), TabKind::Markdown);
    }

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language(Path::new("src/lib.rs")).as_deref(), Some("rust"));
        assert_eq!(detect_language(Path::new("App.TSX")).as_deref(), Some("typescript"));
        assert_eq!(detect_language(Path::new("Dockerfile")).as_deref(), Some("dockerfile"));
        assert_eq!(detect_language(Path::new(".gitignore")).as_deref(), Some("plaintext"));
        assert_eq!(detect_language(Path::new("notes.txt")), None);
        assert_eq!(detect_language(Path::new("noext")), None);
    }

    #[test]
    fn test_unified_diff_headers_and_hunks() {
        let diff = unified_diff("old.txt", "new.txt", "a\nb\nc\n", "a\nB\nc\n");
        assert!(diff.starts_with("--- old.txt\n+++ new.txt\n"));
        assert!(diff.contains("-b\n"));
        assert!(diff.contains("+B\n"));

        assert!(!unified_diff("l", "r", "same\n", "same\n").contains("@@"));
    }
}
