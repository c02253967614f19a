//! Filesystem seam used by the transaction engine
//!
//! Every call takes a raw relative path and runs it through the policy
//! guard before any disk access. Implementations must never touch a path
//! for which [`FileSystem::is_allowed`] is false.

use crate::error::FsError;
use aide_types::FileMetadata;
use async_trait::async_trait;
use std::fmt::Debug;

/// Sandboxed file operations
#[async_trait]
pub trait FileSystem: Send + Sync + Debug {
    /// Whether the path passes the policy guard
    fn is_allowed(&self, path: &str) -> bool;

    /// Whether the path exists (false when forbidden)
    async fn exists(&self, path: &str) -> bool;

    /// Read a UTF-8 file
    ///
    /// # Errors
    /// [`FsError::PathForbidden`] or [`FsError::FileReadFailed`]
    async fn read_file(&self, path: &str) -> Result<String, FsError>;

    /// Atomically write a file, creating parent directories
    ///
    /// # Errors
    /// [`FsError::PathForbidden`] or [`FsError::FileWriteFailed`]
    async fn write_file(&self, path: &str, content: &str) -> Result<(), FsError>;

    /// Read raw bytes for snapshotting; no encoding or size limit applies
    ///
    /// # Errors
    /// [`FsError::PathForbidden`] or [`FsError::FileReadFailed`]
    async fn read_bytes(&self, path: &str) -> Result<Vec<u8>, FsError>;

    /// Atomically write raw bytes captured by [`FileSystem::read_bytes`]
    ///
    /// # Errors
    /// [`FsError::PathForbidden`] or [`FsError::FileWriteFailed`]
    async fn write_bytes(&self, path: &str, content: &[u8]) -> Result<(), FsError>;

    /// Delete a file
    ///
    /// # Errors
    /// [`FsError::PathForbidden`] or [`FsError::FileDeleteFailed`]
    async fn delete_file(&self, path: &str) -> Result<(), FsError>;

    /// Move a file; both endpoints must be allowed
    ///
    /// # Errors
    /// [`FsError::PathForbidden`] or [`FsError::FileRenameFailed`]
    async fn rename_file(&self, from: &str, to: &str) -> Result<(), FsError>;

    /// Live metadata of a file or directory
    ///
    /// # Errors
    /// [`FsError::PathForbidden`] or [`FsError::FileReadFailed`]
    async fn metadata(&self, path: &str) -> Result<FileMetadata, FsError>;
}
