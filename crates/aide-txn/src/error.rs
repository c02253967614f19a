//! Transaction error types

use crate::journal::TransactionStatus;
use aide_fs::FsError;
use aide_types::TxnId;

/// Failure applying a single change
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// Adapter failure
    #[error(transparent)]
    Fs(#[from] FsError),

    /// Diff-method change reached apply time without a content fallback
    #[error("diff apply method is not supported; provide full content instead")]
    DiffApplyUnsupported,

    /// Create target appeared between validation and apply
    #[error("File already exists")]
    AlreadyExists,

    /// Content payload missing at apply time
    #[error("content required to apply change")]
    MissingContent,

    /// Rename without destination
    #[error("New path required for rename operation")]
    MissingNewPath,
}

/// Transaction-level failures
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    /// Phase B rejected the change set; nothing was written
    #[error("validation failed: {}", errors.join("; "))]
    ValidationFailed { txn_id: TxnId, errors: Vec<String> },

    /// A change failed during apply
    #[error("{path}: {source}")]
    FileOperationFailed {
        txn_id: TxnId,
        path: String,
        #[source]
        source: ApplyError,
        /// Whether backed-up files were restored
        rolled_back: bool,
    },

    /// Rollback requested for a transaction that kept no backups
    #[error("no backup found for transaction {0}")]
    NoBackupFound(TxnId),

    /// Unknown or expired transaction
    #[error("transaction {0} not found")]
    JournalNotFound(TxnId),

    /// Rollback requested from a state that does not allow it
    #[error("transaction {txn_id} is {status} and cannot be rolled back")]
    InvalidState {
        txn_id: TxnId,
        status: TransactionStatus,
    },
}

impl TransactionError {
    /// Transaction the error belongs to
    #[must_use]
    pub fn txn_id(&self) -> TxnId {
        match self {
            Self::ValidationFailed { txn_id, .. }
            | Self::FileOperationFailed { txn_id, .. }
            | Self::InvalidState { txn_id, .. } => *txn_id,
            Self::NoBackupFound(id) | Self::JournalNotFound(id) => *id,
        }
    }

    /// Errors as reported in an apply result
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::ValidationFailed { errors, .. } => errors.clone(),
            other => vec![other.to_string()],
        }
    }
}
