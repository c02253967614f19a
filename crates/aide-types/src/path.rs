//! Workspace-relative paths
//!
//! Provides [`WorkspacePath`], a normalized relative path that can never
//! escape the workspace root. Everything user- or model-supplied is parsed
//! into this type before it reaches the filesystem.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Normalized relative path inside a workspace
///
/// Segments are stored without separators; the canonical string form joins
/// them with `/`.
///
/// # Examples
/// - `./src//App.tsx` → `src/App.tsx`
/// - `src\components\Button.tsx` → `src/components/Button.tsx`
/// - `../etc/passwd` → rejected
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkspacePath(Vec<String>);

impl WorkspacePath {
    /// The workspace root (no segments)
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse and normalize a raw relative path
    ///
    /// # Errors
    /// - [`PathError::Absolute`] for `/x`, `\x` or drive-prefixed paths
    /// - [`PathError::Traversal`] if any segment is `..`
    /// - [`PathError::InvalidSegment`] for NUL bytes
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.starts_with('/') || raw.starts_with('\\') || has_drive_prefix(raw) {
            return Err(PathError::Absolute(raw.to_string()));
        }

        let mut segments = Vec::new();
        for seg in raw.split(['/', '\\']) {
            match seg {
                "" | "." => {}
                ".." => return Err(PathError::Traversal(raw.to_string())),
                s if s.contains('\0') => return Err(PathError::InvalidSegment(s.to_string())),
                s => segments.push(s.to_string()),
            }
        }
        Ok(Self(segments))
    }

    /// Path segments
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Whether this is the workspace root
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of segments
    #[inline]
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Final segment
    #[inline]
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Extension of the final segment, without the dot
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name()?;
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
            _ => None,
        }
    }

    /// Parent directory (None for the root)
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Append a single already-validated segment
    ///
    /// # Errors
    /// Returns error if the segment is empty, `.`/`..`, or contains a separator
    pub fn join(&self, segment: &str) -> Result<Self, PathError> {
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains(['/', '\\'])
        {
            return Err(PathError::InvalidSegment(segment.to_string()));
        }
        let mut next = self.clone();
        next.0.push(segment.to_string());
        Ok(next)
    }

    /// Whether `self` equals `dir` or lives underneath it
    #[must_use]
    pub fn is_within(&self, dir: &Self) -> bool {
        self.0.len() >= dir.0.len() && self.0[..dir.0.len()] == dir.0[..]
    }

    /// Canonical `/`-joined form
    #[inline]
    #[must_use]
    pub fn as_string(&self) -> String {
        self.0.join("/")
    }

    /// Resolve against an absolute workspace root
    #[must_use]
    pub fn resolve(&self, root: &Path) -> PathBuf {
        let mut out = root.to_path_buf();
        for seg in &self.0 {
            out.push(seg);
        }
        out
    }
}

fn has_drive_prefix(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

impl Display for WorkspacePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl FromStr for WorkspacePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for WorkspacePath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.as_string())
    }
}

impl<'de> serde::Deserialize<'de> for WorkspacePath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors related to workspace paths
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// Absolute or drive-prefixed path
    #[error("absolute paths are not allowed: {0}")]
    Absolute(String),

    /// Parent-directory traversal
    #[error("path traversal is not allowed: {0}")]
    Traversal(String),

    /// Invalid segment characters
    #[error("invalid path segment: {0:?}")]
    InvalidSegment(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn normalizes_dots_and_duplicate_separators() {
        let p = WorkspacePath::parse("./src//components/./Button.tsx").unwrap();
        assert_eq!(p.as_string(), "src/components/Button.tsx");
        assert_eq!(p.depth(), 3);
    }

    #[test]
    fn backslashes_are_separators() {
        let p = WorkspacePath::parse("src\\lib\\util.ts").unwrap();
        assert_eq!(p.segments(), &["src", "lib", "util.ts"]);
    }

    #[test]
    fn rejects_traversal_anywhere() {
        assert!(matches!(
            WorkspacePath::parse("../../etc/passwd"),
            Err(PathError::Traversal(_))
        ));
        assert!(matches!(
            WorkspacePath::parse("src/../../secret"),
            Err(PathError::Traversal(_))
        ));
    }

    #[test]
    fn rejects_absolute_paths() {
        assert!(matches!(
            WorkspacePath::parse("/etc/passwd"),
            Err(PathError::Absolute(_))
        ));
        assert!(matches!(
            WorkspacePath::parse("C:\\Windows"),
            Err(PathError::Absolute(_))
        ));
    }

    #[test]
    fn empty_and_dot_are_root() {
        assert!(WorkspacePath::parse("").unwrap().is_root());
        assert!(WorkspacePath::parse(".").unwrap().is_root());
    }

    #[test]
    fn extension_and_file_name() {
        let p = WorkspacePath::parse("src/App.tsx").unwrap();
        assert_eq!(p.file_name(), Some("App.tsx"));
        assert_eq!(p.extension(), Some("tsx"));

        let dotfile = WorkspacePath::parse(".env").unwrap();
        assert_eq!(dotfile.extension(), None);
    }

    #[test]
    fn parent_and_within() {
        let p = WorkspacePath::parse("src/a/b.ts").unwrap();
        let parent = p.parent().unwrap();
        assert_eq!(parent.as_string(), "src/a");
        assert!(p.is_within(&parent));
        assert!(p.is_within(&WorkspacePath::root()));
        assert!(!parent.is_within(&p));
        assert!(WorkspacePath::root().parent().is_none());
    }

    #[test]
    fn join_rejects_separators_and_dots() {
        let src = WorkspacePath::parse("src").unwrap();
        assert_eq!(src.join("main.ts").unwrap().as_string(), "src/main.ts");
        assert!(src.join("..").is_err());
        assert!(src.join("a/b").is_err());
    }

    #[test]
    fn resolve_stays_under_root() {
        let root = Path::new("/work/space");
        let p = WorkspacePath::parse("src/App.tsx").unwrap();
        assert_eq!(p.resolve(root), PathBuf::from("/work/space/src/App.tsx"));
    }

    proptest! {
        #[test]
        fn parsed_paths_never_contain_parent_segments(raw in "[a-z./\\\\]{0,24}") {
            if let Ok(p) = WorkspacePath::parse(&raw) {
                prop_assert!(p.segments().iter().all(|s| s != ".." && s != "." && !s.is_empty()));
                prop_assert!(p.resolve(Path::new("/root")).starts_with("/root"));
            }
        }
    }
}
