//! Path policy guard
//!
//! Decides whether a relative path may be touched at all. A path is allowed
//! when it normalizes cleanly and falls under one of the allow-list entries:
//! it either equals an entry or sits below an entry directory. The workspace
//! root itself is never an allowed target.

use crate::error::FsError;
use aide_types::WorkspacePath;
use tracing::warn;

/// Allow-list used when no configuration is supplied
pub const DEFAULT_ALLOWED_PATHS: &[&str] = &[
    "src/",
    "public/",
    "index.html",
    "package.json",
    "tsconfig.json",
    "vite.config.ts",
    "tailwind.config.js",
    "postcss.config.js",
    "README.md",
];

/// Allow-list policy over workspace-relative paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPolicy {
    entries: Vec<WorkspacePath>,
}

impl PathPolicy {
    /// Build a policy from raw allow-list entries
    ///
    /// Entries are normalized the same way requests are; a trailing `/` is
    /// insignificant. Entries that fail to normalize are dropped.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = Vec::new();
        for raw in entries {
            let raw = raw.as_ref();
            match WorkspacePath::parse(raw) {
                Ok(p) => {
                    if !parsed.contains(&p) {
                        parsed.push(p);
                    }
                }
                Err(e) => warn!(entry = raw, error = %e, "ignoring invalid allow-list entry"),
            }
        }
        Self { entries: parsed }
    }

    /// Normalized allow-list entries
    #[must_use]
    pub fn entries(&self) -> &[WorkspacePath] {
        &self.entries
    }

    /// Whether a raw path may be touched
    #[must_use]
    pub fn is_allowed(&self, raw: &str) -> bool {
        self.check(raw).is_ok()
    }

    /// Normalize a raw path and check it against the allow-list
    ///
    /// # Errors
    /// [`FsError::PathForbidden`] for traversal, absolute paths, the root, or
    /// paths outside every entry
    pub fn check(&self, raw: &str) -> Result<WorkspacePath, FsError> {
        let path = WorkspacePath::parse(raw).map_err(|_| FsError::forbidden(raw))?;
        if self.permits(&path) {
            Ok(path)
        } else {
            Err(FsError::forbidden(raw))
        }
    }

    /// Whether an already-normalized path falls under an entry
    #[must_use]
    pub fn permits(&self, path: &WorkspacePath) -> bool {
        !path.is_root() && self.entries.iter().any(|entry| path.is_within(entry))
    }

    /// Whether a directory may be walked: it is permitted itself, or some
    /// entry lives underneath it
    #[must_use]
    pub fn is_traversable(&self, dir: &WorkspacePath) -> bool {
        (dir.is_root() && !self.entries.is_empty())
            || self.permits(dir)
            || self.entries.iter().any(|entry| entry.is_within(dir))
    }
}

impl Default for PathPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_PATHS)
    }
}
