//! Recursive workspace listing

use crate::error::FsError;
use crate::workspace::Workspace;
use aide_types::{EntryKind, FileTreeNode, WorkspacePath};
use futures::future::{BoxFuture, FutureExt};
use std::cmp::Ordering;
use tokio::fs;

/// Default maximum recursion depth
pub const DEFAULT_MAX_DEPTH: usize = 10;

impl Workspace {
    /// List the tree under `start` (empty or `.` for the workspace root)
    ///
    /// Dot-entries and ignored directories are skipped, as are entries the
    /// policy neither permits nor needs for reaching a permitted path.
    /// Children are ordered directories first, then by name.
    ///
    /// # Errors
    /// - [`FsError::PathForbidden`] if `start` cannot be traversed
    /// - [`FsError::MaxDepthExceeded`] when descending below `max_depth`
    /// - [`FsError::FileReadFailed`] on I/O errors
    pub async fn file_tree(&self, start: &str, max_depth: usize) -> Result<FileTreeNode, FsError> {
        let dir = WorkspacePath::parse(start).map_err(|_| FsError::forbidden(start))?;
        if !self.policy().is_traversable(&dir) {
            return Err(FsError::forbidden(start));
        }
        let abs = dir.resolve(self.root());
        if !self.contained(&abs).await {
            return Err(FsError::forbidden(start));
        }

        let children = self.walk(dir.clone(), 0, max_depth).await?;
        Ok(FileTreeNode {
            name: dir.file_name().unwrap_or_default().to_string(),
            path: dir.as_string(),
            kind: EntryKind::Directory,
            children,
        })
    }

    fn walk(
        &self,
        dir: WorkspacePath,
        depth: usize,
        max_depth: usize,
    ) -> BoxFuture<'_, Result<Vec<FileTreeNode>, FsError>> {
        async move {
            if depth > max_depth {
                return Err(FsError::MaxDepthExceeded {
                    path: dir.as_string(),
                    max_depth,
                });
            }

            let display = dir.as_string();
            let abs = dir.resolve(self.root());
            let mut entries = fs::read_dir(&abs)
                .await
                .map_err(|e| FsError::read_failed(&display, e))?;

            let mut children = Vec::new();
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| FsError::read_failed(&display, e))?
            {
                let Ok(name) = entry.file_name().into_string() else {
                    continue;
                };
                if name.starts_with('.') {
                    continue;
                }
                let Ok(child) = dir.join(&name) else {
                    continue;
                };
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| FsError::read_failed(child.as_string(), e))?;

                if file_type.is_dir() {
                    if self.ignored_dirs.iter().any(|d| d == &name)
                        || !self.policy().is_traversable(&child)
                    {
                        continue;
                    }
                    let grandchildren = self.walk(child.clone(), depth + 1, max_depth).await?;
                    children.push(FileTreeNode {
                        name,
                        path: child.as_string(),
                        kind: EntryKind::Directory,
                        children: grandchildren,
                    });
                } else if file_type.is_file() && self.policy().permits(&child) {
                    children.push(FileTreeNode {
                        name,
                        path: child.as_string(),
                        kind: EntryKind::File,
                        children: Vec::new(),
                    });
                }
            }

            children.sort_by(|a, b| match (a.kind, b.kind) {
                (EntryKind::Directory, EntryKind::File) => Ordering::Less,
                (EntryKind::File, EntryKind::Directory) => Ordering::Greater,
                _ => a.name.cmp(&b.name),
            });
            Ok(children)
        }
        .boxed()
    }
}
