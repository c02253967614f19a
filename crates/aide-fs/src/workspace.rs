//! Local-disk [`FileSystem`] rooted at a workspace directory

use crate::adapter::FileSystem;
use crate::atomic::write_atomic;
use crate::error::FsError;
use crate::mime::{mime_for, DIRECTORY_MIME};
use crate::policy::PathPolicy;
use aide_types::{EntryKind, FileMetadata, Fingerprint, Permissions, WorkspacePath};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, instrument};

/// Directories skipped by tree listings unless configured otherwise
pub const DEFAULT_IGNORED_DIRS: &[&str] = &["node_modules", "dist", "build", "target", "__pycache__"];

/// Largest file the adapter reads or writes unless configured otherwise
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Workspace directory guarded by a [`PathPolicy`]
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    policy: Arc<PathPolicy>,
    pub(crate) ignored_dirs: Vec<String>,
    max_file_size: u64,
}

impl Workspace {
    /// Open an existing directory as a workspace
    ///
    /// The root is canonicalized so symlinked components cannot be used to
    /// step outside it later.
    ///
    /// # Errors
    /// [`FsError::FileReadFailed`] if the root does not exist or is not a
    /// directory
    pub fn open(root: impl AsRef<Path>, policy: PathPolicy) -> Result<Self, FsError> {
        let raw = root.as_ref();
        let display = raw.display().to_string();
        let root = std::fs::canonicalize(raw).map_err(|e| FsError::read_failed(&display, e))?;
        if !root.is_dir() {
            return Err(FsError::read_failed(
                display,
                io::Error::new(io::ErrorKind::InvalidInput, "workspace root is not a directory"),
            ));
        }
        Ok(Self {
            root,
            policy: Arc::new(policy),
            ignored_dirs: DEFAULT_IGNORED_DIRS.iter().map(ToString::to_string).collect(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        })
    }

    /// Replace the ignored directory names
    #[must_use]
    pub fn with_ignored_dirs<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the file size limit
    #[must_use]
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Canonical workspace root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Active policy
    #[must_use]
    pub fn policy(&self) -> &PathPolicy {
        &self.policy
    }

    /// Check policy and containment, returning the normalized and absolute path
    pub(crate) async fn resolve(&self, raw: &str) -> Result<(WorkspacePath, PathBuf), FsError> {
        let rel = self.policy.check(raw)?;
        let abs = rel.resolve(&self.root);
        if !self.contained(&abs).await {
            debug!(path = raw, "path resolves outside workspace root");
            return Err(FsError::forbidden(raw));
        }
        Ok((rel, abs))
    }

    /// Whether the nearest existing ancestor of `abs` canonicalizes under the root
    pub(crate) async fn contained(&self, abs: &Path) -> bool {
        let mut ancestor = abs.to_path_buf();
        while fs::symlink_metadata(&ancestor).await.is_err() {
            if !ancestor.pop() {
                return false;
            }
        }
        match fs::canonicalize(&ancestor).await {
            Ok(real) => real.starts_with(&self.root),
            Err(_) => false,
        }
    }

    async fn read_limited(&self, raw: &str, abs: &Path) -> Result<Vec<u8>, FsError> {
        let meta = fs::metadata(abs)
            .await
            .map_err(|e| FsError::read_failed(raw, e))?;
        if !meta.is_file() {
            return Err(FsError::read_failed(
                raw,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }
        if meta.len() > self.max_file_size {
            return Err(FsError::read_failed(raw, too_large(meta.len(), self.max_file_size)));
        }
        fs::read(abs).await.map_err(|e| FsError::read_failed(raw, e))
    }

    /// Write `content` only if the file still has the expected fingerprint
    ///
    /// With `expected_etag == None` this is a plain write. A missing file with
    /// an expected etag is a conflict. Returns the new fingerprint.
    ///
    /// # Errors
    /// [`FsError::ConcurrentModification`] on mismatch, otherwise as
    /// [`FileSystem::write_file`]
    #[instrument(skip(self, content), fields(size = content.len()))]
    pub async fn write_file_if_match(
        &self,
        path: &str,
        content: &str,
        expected_etag: Option<&str>,
    ) -> Result<Fingerprint, FsError> {
        let (_, abs) = self.resolve(path).await?;
        if let Some(expected) = expected_etag {
            let actual = match self.read_limited(path, &abs).await {
                Ok(bytes) => Some(Fingerprint::compute(&bytes)),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            };
            match actual {
                Some(fp) if fp.matches_etag(expected) => {}
                other => {
                    return Err(FsError::ConcurrentModification {
                        path: path.to_string(),
                        expected: expected.to_string(),
                        actual: other.map_or_else(|| "<missing>".to_string(), |fp| fp.etag()),
                    })
                }
            }
        }
        self.write_file(path, content).await?;
        Ok(Fingerprint::compute(content.as_bytes()))
    }
}

fn too_large(size: u64, limit: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("file size {size} exceeds limit of {limit} bytes"),
    )
}

fn permissions_of(meta: &std::fs::Metadata) -> Permissions {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = meta.permissions().mode();
        Permissions {
            read: mode & 0o400 != 0,
            write: mode & 0o200 != 0,
            execute: mode & 0o100 != 0,
        }
    }
    #[cfg(not(unix))]
    {
        Permissions {
            read: true,
            write: !meta.permissions().readonly(),
            execute: false,
        }
    }
}

#[async_trait]
impl FileSystem for Workspace {
    fn is_allowed(&self, path: &str) -> bool {
        self.policy.is_allowed(path)
    }

    async fn exists(&self, path: &str) -> bool {
        match self.resolve(path).await {
            Ok((_, abs)) => fs::try_exists(&abs).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn read_file(&self, path: &str) -> Result<String, FsError> {
        let (_, abs) = self.resolve(path).await?;
        let bytes = self.read_limited(path, &abs).await?;
        String::from_utf8(bytes).map_err(|e| {
            FsError::read_failed(path, io::Error::new(io::ErrorKind::InvalidData, e))
        })
    }

    #[instrument(skip(self, content), fields(size = content.len()))]
    async fn write_file(&self, path: &str, content: &str) -> Result<(), FsError> {
        let (_, abs) = self.resolve(path).await?;
        let size = content.len() as u64;
        if size > self.max_file_size {
            return Err(FsError::write_failed(path, too_large(size, self.max_file_size)));
        }
        write_atomic(&abs, content.as_bytes())
            .await
            .map_err(|e| FsError::write_failed(path, e))?;
        debug!(path, "file written");
        Ok(())
    }

    async fn read_bytes(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let (_, abs) = self.resolve(path).await?;
        fs::read(&abs).await.map_err(|e| FsError::read_failed(path, e))
    }

    #[instrument(skip(self, content), fields(size = content.len()))]
    async fn write_bytes(&self, path: &str, content: &[u8]) -> Result<(), FsError> {
        let (_, abs) = self.resolve(path).await?;
        write_atomic(&abs, content)
            .await
            .map_err(|e| FsError::write_failed(path, e))?;
        debug!(path, "bytes written");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_file(&self, path: &str) -> Result<(), FsError> {
        let (_, abs) = self.resolve(path).await?;
        fs::remove_file(&abs)
            .await
            .map_err(|e| FsError::delete_failed(path, e))?;
        debug!(path, "file deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn rename_file(&self, from: &str, to: &str) -> Result<(), FsError> {
        let (_, src) = self.resolve(from).await?;
        let (_, dst) = self.resolve(to).await?;

        let meta = fs::metadata(&src)
            .await
            .map_err(|e| FsError::rename_failed(from, to, e))?;
        if !meta.is_file() {
            return Err(FsError::rename_failed(
                from,
                to,
                io::Error::new(io::ErrorKind::InvalidInput, "source is not a regular file"),
            ));
        }
        if fs::try_exists(&dst).await.unwrap_or(false) {
            return Err(FsError::rename_failed(
                from,
                to,
                io::Error::new(io::ErrorKind::AlreadyExists, "destination already exists"),
            ));
        }
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FsError::rename_failed(from, to, e))?;
        }
        fs::rename(&src, &dst)
            .await
            .map_err(|e| FsError::rename_failed(from, to, e))?;
        debug!(from, to, "file renamed");
        Ok(())
    }

    async fn metadata(&self, path: &str) -> Result<FileMetadata, FsError> {
        let (rel, abs) = self.resolve(path).await?;
        let meta = fs::metadata(&abs)
            .await
            .map_err(|e| FsError::read_failed(path, e))?;

        let last_modified: DateTime<Utc> = meta
            .modified()
            .map_err(|e| FsError::read_failed(path, e))?
            .into();
        let name = rel.file_name().unwrap_or_default().to_string();

        if meta.is_dir() {
            return Ok(FileMetadata {
                path: rel.as_string(),
                name,
                kind: EntryKind::Directory,
                size: meta.len(),
                last_modified,
                etag: String::new(),
                mime_type: DIRECTORY_MIME.to_string(),
                permissions: permissions_of(&meta),
            });
        }

        let bytes = self.read_limited(path, &abs).await?;
        Ok(FileMetadata {
            path: rel.as_string(),
            name,
            kind: EntryKind::File,
            size: bytes.len() as u64,
            last_modified,
            etag: Fingerprint::compute(&bytes).etag(),
            mime_type: mime_for(&rel).to_string(),
            permissions: permissions_of(&meta),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, Workspace) {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::open(dir.path(), PathPolicy::default()).unwrap();
        (dir, ws)
    }

    #[tokio::test]
    async fn write_then_read() {
        let (_dir, ws) = workspace();
        ws.write_file("src/utils/math.ts", "export const x = 1;")
            .await
            .unwrap();
        assert!(ws.exists("src/utils/math.ts").await);
        assert_eq!(
            ws.read_file("./src//utils/math.ts").await.unwrap(),
            "export const x = 1;"
        );
    }

    #[tokio::test]
    async fn forbidden_paths_never_touch_disk() {
        let (dir, ws) = workspace();
        let err = ws.write_file("../escape.txt", "x").await.unwrap_err();
        assert!(err.is_forbidden());
        let err = ws.write_file(".env", "SECRET=1").await.unwrap_err();
        assert!(err.is_forbidden());
        assert!(!dir.path().join(".env").exists());
        assert!(!ws.exists(".env").await);
    }

    #[tokio::test]
    async fn read_missing_file_is_not_found() {
        let (_dir, ws) = workspace();
        let err = ws.read_file("src/nope.ts").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn delete_missing_file_fails() {
        let (_dir, ws) = workspace();
        let err = ws.delete_file("src/nope.ts").await.unwrap_err();
        assert!(matches!(err, FsError::FileDeleteFailed { .. }));
    }

    #[tokio::test]
    async fn rename_moves_file_and_refuses_overwrite() {
        let (_dir, ws) = workspace();
        ws.write_file("src/a.ts", "a").await.unwrap();
        ws.write_file("src/b.ts", "b").await.unwrap();

        let err = ws.rename_file("src/a.ts", "src/b.ts").await.unwrap_err();
        assert!(matches!(err, FsError::FileRenameFailed { .. }));

        ws.rename_file("src/a.ts", "src/nested/c.ts").await.unwrap();
        assert!(!ws.exists("src/a.ts").await);
        assert_eq!(ws.read_file("src/nested/c.ts").await.unwrap(), "a");
    }

    #[tokio::test]
    async fn rename_into_forbidden_target_is_rejected() {
        let (_dir, ws) = workspace();
        ws.write_file("src/a.ts", "a").await.unwrap();
        let err = ws.rename_file("src/a.ts", "secrets/a.ts").await.unwrap_err();
        assert!(err.is_forbidden());
        assert!(ws.exists("src/a.ts").await);
    }

    #[tokio::test]
    async fn metadata_reports_fingerprint_and_mime() {
        let (_dir, ws) = workspace();
        ws.write_file("src/App.tsx", "hello").await.unwrap();

        let meta = ws.metadata("src/App.tsx").await.unwrap();
        assert_eq!(meta.path, "src/App.tsx");
        assert_eq!(meta.name, "App.tsx");
        assert_eq!(meta.kind, EntryKind::File);
        assert_eq!(meta.size, 5);
        assert_eq!(meta.etag, Fingerprint::compute(b"hello").etag());
        assert_eq!(meta.mime_type, "text/tsx");
        assert!(meta.permissions.read);

        let again = ws.metadata("src/App.tsx").await.unwrap();
        assert_eq!(meta, again);
    }

    #[tokio::test]
    async fn metadata_of_directory() {
        let (_dir, ws) = workspace();
        ws.write_file("src/lib/a.ts", "a").await.unwrap();
        let meta = ws.metadata("src/lib").await.unwrap();
        assert_eq!(meta.kind, EntryKind::Directory);
        assert!(meta.etag.is_empty());
        assert_eq!(meta.mime_type, DIRECTORY_MIME);
    }

    #[tokio::test]
    async fn size_limit_applies_to_writes() {
        let (_dir, ws) = workspace();
        let ws = ws.with_max_file_size(4);
        let err = ws.write_file("src/big.ts", "12345").await.unwrap_err();
        assert!(matches!(err, FsError::FileWriteFailed { .. }));
        assert!(!ws.exists("src/big.ts").await);
    }

    #[tokio::test]
    async fn raw_bytes_bypass_text_and_size_limits() {
        let (_dir, ws) = workspace();
        let ws = ws.with_max_file_size(4);
        let png = [0x89, 0x50, 0x4E, 0x47, 0xFF, 0xFE, 0x00, 0x01];

        ws.write_bytes("public/logo.png", &png).await.unwrap();
        assert!(ws.read_file("public/logo.png").await.is_err());
        assert_eq!(ws.read_bytes("public/logo.png").await.unwrap(), png);
        assert!(ws.read_bytes("../outside.png").await.unwrap_err().is_forbidden());
    }

    #[tokio::test]
    async fn conditional_write_detects_conflicts() {
        let (_dir, ws) = workspace();
        let first = ws
            .write_file_if_match("src/a.ts", "v1", None)
            .await
            .unwrap();

        let second = ws
            .write_file_if_match("src/a.ts", "v2", Some(&first.etag()))
            .await
            .unwrap();
        assert_eq!(second, Fingerprint::compute(b"v2"));

        let err = ws
            .write_file_if_match("src/a.ts", "v3", Some(&first.etag()))
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::ConcurrentModification { .. }));
        assert_eq!(ws.read_file("src/a.ts").await.unwrap(), "v2");

        let err = ws
            .write_file_if_match("src/missing.ts", "x", Some(&first.etag()))
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::ConcurrentModification { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_escaping_root_is_forbidden() {
        let outside = TempDir::new().unwrap();
        let (dir, ws) = workspace();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("src/link")).unwrap();

        let err = ws.write_file("src/link/pwned.txt", "x").await.unwrap_err();
        assert!(err.is_forbidden());
        assert!(!outside.path().join("pwned.txt").exists());
    }

    #[test]
    fn open_rejects_missing_root() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(Workspace::open(missing, PathPolicy::default()).is_err());
    }
}
