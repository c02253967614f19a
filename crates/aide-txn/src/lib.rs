//! AIDE transaction engine
//!
//! Applies a validated change set to the workspace with all-or-nothing
//! semantics.
//!
//! # Lifecycle
//!
//! ```text
//! pending ──► completed ──► rolled_back   (explicit undo)
//!    │
//!    ├──────► failed ─────► rolled_back   (explicit undo)
//!    │
//!    └──────► rolled_back                 (apply failure with backups)
//! ```
//!
//! # Components
//!
//! - [`TransactionEngine`]: lock, back up, validate, apply, roll back
//! - [`TransactionJournal`]: ordered audit record of each attempt
//! - [`TransactionBackup`]: pre-change snapshots used by rollback
//! - [`PathLocks`]: per-path advisory locks across concurrent transactions
//! - [`CodeFormatter`]: optional format-on-save collaborator
//!
//! Rollback needs a backup set. A transaction run with backups disabled
//! that fails mid-way is left as it is and its journal ends `failed`.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod backup;
mod engine;
mod error;
mod format;
mod journal;
mod lock;

pub use backup::{BackupEntry, TransactionBackup};
pub use engine::{
    ApplyOptions, ApplyResult, BackupStore, JournalStore, TransactionEngine, DEFAULT_JOURNAL_TTL,
};
pub use error::{ApplyError, TransactionError};
pub use format::{
    is_formattable, CodeFormatter, CommandFormatter, FormatError, NoopFormatter,
    DEFAULT_FORMATTABLE_EXTENSIONS,
};
pub use journal::{OperationKind, OperationRecord, TransactionJournal, TransactionStatus};
pub use lock::{lock_key, PathLockGuard, PathLocks};
