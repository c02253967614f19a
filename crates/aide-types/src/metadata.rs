//! File metadata and tree shapes returned by the filesystem adapter

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// Permission flags of the current owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

/// Live metadata of a workspace entry
///
/// Always computed fresh; never cached beyond a single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    /// Normalized relative path
    pub path: String,
    /// Final path segment
    pub name: String,
    /// File or directory
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Size in bytes
    pub size: u64,
    /// Last modification time (RFC 3339 on the wire)
    pub last_modified: DateTime<Utc>,
    /// Content fingerprint (empty for directories)
    pub etag: String,
    /// Mime type derived from the extension
    pub mime_type: String,
    /// Permission flags
    pub permissions: Permissions,
}

/// Node of a workspace file tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTreeNode {
    /// Entry name
    pub name: String,
    /// Normalized relative path
    pub path: String,
    /// File or directory
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Children (directories only): directories first, then by name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FileTreeNode>,
}

impl FileTreeNode {
    /// Total number of nodes in this subtree (including self)
    #[must_use]
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(FileTreeNode::count).sum::<usize>()
    }

    /// Find a descendant by relative path
    #[must_use]
    pub fn find(&self, path: &str) -> Option<&FileTreeNode> {
        if self.path == path {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(path))
    }
}
