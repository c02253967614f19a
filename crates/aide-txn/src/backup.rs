//! Pre-change snapshots used by rollback
//!
//! A backup set lists, in capture order, the raw bytes each touched path had
//! before the transaction (or that it did not exist). Restoring walks the
//! list in reverse. Renames whose source could not be captured are kept
//! aside and undone by moving the file back.

use aide_fs::{FileSystem, FsError};
use aide_types::{Fingerprint, TxnId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntry {
    pub path: String,
    /// Pre-change bytes (empty when the file did not exist)
    pub content: Vec<u8>,
    pub fingerprint: Fingerprint,
    pub existed: bool,
}

impl BackupEntry {
    /// Capture the current state of `path`
    ///
    /// # Errors
    /// Read failures of an existing file
    pub async fn capture(fs: &dyn FileSystem, path: &str) -> Result<Self, FsError> {
        if fs.exists(path).await {
            let content = fs.read_bytes(path).await?;
            Ok(Self {
                path: path.to_string(),
                fingerprint: Fingerprint::compute(&content),
                content,
                existed: true,
            })
        } else {
            Ok(Self {
                path: path.to_string(),
                content: Vec::new(),
                fingerprint: Fingerprint::empty(),
                existed: false,
            })
        }
    }

    /// Put the path back into its captured state
    ///
    /// # Errors
    /// Adapter failures while writing or deleting
    pub async fn restore(&self, fs: &dyn FileSystem) -> Result<(), FsError> {
        if self.existed {
            fs.write_bytes(&self.path, &self.content).await
        } else if fs.exists(&self.path).await {
            fs.delete_file(&self.path).await
        } else {
            Ok(())
        }
    }
}

/// Backup set of one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionBackup {
    pub txn_id: TxnId,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<BackupEntry>,
    /// `(from, to)` renames whose source has no entry
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub renamed: Vec<(String, String)>,
}

impl TransactionBackup {
    /// Empty backup set
    #[must_use]
    pub fn new(txn_id: TxnId) -> Self {
        Self {
            txn_id,
            created_at: Utc::now(),
            entries: Vec::new(),
            renamed: Vec::new(),
        }
    }

    /// Whether `path` is already captured
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.entries.iter().any(|e| e.path == path)
    }

    /// Captured paths, including both endpoints of set-aside renames
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .map(|e| e.path.as_str())
            .chain(self.renamed.iter().flat_map(|(from, to)| [from.as_str(), to.as_str()]))
    }

    /// Whether `path` is the destination of a set-aside rename
    #[must_use]
    pub fn is_rename_target(&self, path: &str) -> bool {
        self.renamed.iter().any(|(_, to)| to == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aide_test_utils::TestWorkspace;

    #[tokio::test]
    async fn capture_and_restore_existing_file() {
        let tw = TestWorkspace::new();
        tw.seed("src/a.ts", "original");
        let fs = tw.fs();

        let entry = BackupEntry::capture(fs.as_ref(), "src/a.ts").await.unwrap();
        assert!(entry.existed);
        assert_eq!(entry.fingerprint, Fingerprint::compute(b"original"));

        fs.write_file("src/a.ts", "changed").await.unwrap();
        entry.restore(fs.as_ref()).await.unwrap();
        assert_eq!(tw.read("src/a.ts").as_deref(), Some("original"));
    }

    #[tokio::test]
    async fn binary_content_survives_capture_and_restore() {
        let tw = TestWorkspace::new();
        let png = [0x89, 0x50, 0x4E, 0x47, 0xFF, 0xFE, 0x00, 0x01];
        tw.seed_bytes("public/logo.png", &png);
        let fs = tw.fs();

        let entry = BackupEntry::capture(fs.as_ref(), "public/logo.png").await.unwrap();
        assert_eq!(entry.content, png);

        fs.delete_file("public/logo.png").await.unwrap();
        entry.restore(fs.as_ref()).await.unwrap();
        assert_eq!(tw.read_bytes("public/logo.png").unwrap(), png);
    }

    #[test]
    fn set_aside_renames_count_as_captured_paths() {
        let mut backup = TransactionBackup::new(TxnId::new());
        backup.renamed.push(("public/a.png".into(), "public/b.png".into()));
        assert_eq!(backup.paths().collect::<Vec<_>>(), ["public/a.png", "public/b.png"]);
        assert!(backup.is_rename_target("public/b.png"));
        assert!(!backup.is_rename_target("public/a.png"));
    }

    #[tokio::test]
    async fn restore_of_absent_file_deletes_it() {
        let tw = TestWorkspace::new();
        let fs = tw.fs();

        let entry = BackupEntry::capture(fs.as_ref(), "src/new.ts").await.unwrap();
        assert!(!entry.existed);
        entry.restore(fs.as_ref()).await.unwrap();

        fs.write_file("src/new.ts", "x").await.unwrap();
        entry.restore(fs.as_ref()).await.unwrap();
        assert!(!tw.exists("src/new.ts"));
    }
}
