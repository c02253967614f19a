//! Error types for the filesystem adapter
//!
//! Every variant carries the workspace-relative path it concerns so callers
//! can report `<file>: <reason>` without extra bookkeeping.

use std::io;

/// Errors raised by the path policy and the workspace adapter
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// Path rejected by the policy guard (traversal, absolute, not allow-listed,
    /// or resolving outside the workspace root)
    #[error("path forbidden by security policy: {path}")]
    PathForbidden { path: String },

    /// File missing or unreadable
    #[error("failed to read {path}: {source}")]
    FileReadFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Write (temp file, sync or rename) failed
    #[error("failed to write {path}: {source}")]
    FileWriteFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Delete failed or file missing
    #[error("failed to delete {path}: {source}")]
    FileDeleteFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Rename failed
    #[error("failed to rename {from} to {to}: {source}")]
    FileRenameFailed {
        from: String,
        to: String,
        #[source]
        source: io::Error,
    },

    /// Tree walk went deeper than allowed
    #[error("maximum tree depth {max_depth} exceeded at {path}")]
    MaxDepthExceeded { path: String, max_depth: usize },

    /// Expected fingerprint did not match the file on disk
    #[error("concurrent modification of {path}: expected etag {expected}, found {actual}")]
    ConcurrentModification {
        path: String,
        expected: String,
        actual: String,
    },
}

impl FsError {
    /// Build a policy rejection
    pub fn forbidden(path: impl Into<String>) -> Self {
        Self::PathForbidden { path: path.into() }
    }

    /// Read failure for path
    pub fn read_failed(path: impl Into<String>, source: io::Error) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            source,
        }
    }

    /// Write failure for path
    pub fn write_failed(path: impl Into<String>, source: io::Error) -> Self {
        Self::FileWriteFailed {
            path: path.into(),
            source,
        }
    }

    /// Delete failure for path
    pub fn delete_failed(path: impl Into<String>, source: io::Error) -> Self {
        Self::FileDeleteFailed {
            path: path.into(),
            source,
        }
    }

    /// Rename failure between two paths
    pub fn rename_failed(from: impl Into<String>, to: impl Into<String>, source: io::Error) -> Self {
        Self::FileRenameFailed {
            from: from.into(),
            to: to.into(),
            source,
        }
    }

    /// Primary path this error concerns
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::PathForbidden { path }
            | Self::FileReadFailed { path, .. }
            | Self::FileWriteFailed { path, .. }
            | Self::FileDeleteFailed { path, .. }
            | Self::MaxDepthExceeded { path, .. }
            | Self::ConcurrentModification { path, .. } => path,
            Self::FileRenameFailed { from, .. } => from,
        }
    }

    /// Whether the underlying cause is a missing file
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::FileReadFailed { source, .. }
            | Self::FileWriteFailed { source, .. }
            | Self::FileDeleteFailed { source, .. }
            | Self::FileRenameFailed { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Whether this is a policy rejection
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::PathForbidden { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_path() {
        let err = FsError::read_failed("src/a.ts", io::Error::from(io::ErrorKind::NotFound));
        assert!(err.to_string().starts_with("failed to read src/a.ts"));
        assert!(err.is_not_found());
        assert_eq!(err.path(), "src/a.ts");
    }

    #[test]
    fn forbidden_is_not_not_found() {
        let err = FsError::forbidden("../x");
        assert!(err.is_forbidden());
        assert!(!err.is_not_found());
    }

    #[test]
    fn rename_reports_source_path() {
        let err = FsError::rename_failed("src/a", "src/b", io::Error::other("boom"));
        assert_eq!(err.path(), "src/a");
        assert!(err.to_string().contains("src/b"));
    }
}
