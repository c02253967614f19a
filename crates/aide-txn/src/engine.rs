//! Transaction engine
//!
//! Applies an ordered list of file changes all-or-nothing:
//!
//! 1. lock every path the changes can touch
//! 2. back up those paths (phase A)
//! 3. re-validate against the current workspace (phase B)
//! 4. apply in the given order, restoring the backups on the first failure
//!    (phase C)
//! 5. mark the journal completed and emit the final progress event (phase D)
//!
//! A dry run stops at validation plus a simulated pass. It never locks,
//! backs up or writes.

use crate::backup::{BackupEntry, TransactionBackup};
use crate::error::{ApplyError, TransactionError};
use crate::format::{is_formattable, CodeFormatter, NoopFormatter, DEFAULT_FORMATTABLE_EXTENSIONS};
use crate::journal::{OperationKind, TransactionJournal, TransactionStatus};
use crate::lock::{lock_key, PathLocks};
use aide_events::{EventNotifier, EventPayload};
use aide_fs::FileSystem;
use aide_plan::{file_error, reasons, resolve_diff, DiffResolution, PlanValidator};
use aide_types::{
    ApplyMethod, ChangeOperation, CorrelationId, FileChange, MemoryStore, PlanId, Store, TxnId,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};

/// Default retention of journals and backups
pub const DEFAULT_JOURNAL_TTL: Duration = Duration::from_secs(86_400);

const MAX_RETAINED_TRANSACTIONS: u64 = 10_000;

/// Keyed journal storage
pub type JournalStore = dyn Store<TxnId, TransactionJournal>;

/// Keyed backup storage
pub type BackupStore = dyn Store<TxnId, TransactionBackup>;

/// Per-request apply options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplyOptions {
    pub create_backups: bool,
    pub format_on_save: bool,
    pub dry_run: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            create_backups: true,
            format_on_save: true,
            dry_run: false,
        }
    }
}

impl ApplyOptions {
    /// Defaults with `dry_run` set
    #[must_use]
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }
}

/// Outcome reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResult {
    pub transaction_id: TxnId,
    pub success: bool,
    pub applied_files: Vec<String>,
    pub errors: Vec<String>,
    pub status: TransactionStatus,
}

impl ApplyResult {
    /// Failed result for a transaction error
    ///
    /// Changes left on disk by an apply that was not rolled back are listed
    /// from the journal; a rolled-back or rejected apply has none.
    #[must_use]
    pub fn from_error(err: &TransactionError, journal: Option<&TransactionJournal>) -> Self {
        let status = match err {
            TransactionError::FileOperationFailed {
                rolled_back: true, ..
            } => TransactionStatus::RolledBack,
            _ => TransactionStatus::Failed,
        };
        let applied_files = match journal {
            Some(journal) if status != TransactionStatus::RolledBack => journal.applied_files(),
            _ => Vec::new(),
        };
        Self {
            transaction_id: err.txn_id(),
            success: false,
            applied_files,
            errors: err.messages(),
            status,
        }
    }
}

/// Applies change sets against a [`FileSystem`]
#[derive(Debug, Clone)]
pub struct TransactionEngine {
    fs: Arc<dyn FileSystem>,
    validator: PlanValidator,
    notifier: Arc<EventNotifier>,
    formatter: Arc<dyn CodeFormatter>,
    formattable: Vec<String>,
    locks: PathLocks,
    journals: Arc<JournalStore>,
    backups: Arc<BackupStore>,
}

impl TransactionEngine {
    /// Engine with in-memory stores, no formatter and default retention
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>, notifier: Arc<EventNotifier>) -> Self {
        Self {
            validator: PlanValidator::new(Arc::clone(&fs)),
            fs,
            notifier,
            formatter: Arc::new(NoopFormatter),
            formattable: DEFAULT_FORMATTABLE_EXTENSIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
            locks: PathLocks::new(),
            journals: Arc::new(MemoryStore::with_ttl(
                MAX_RETAINED_TRANSACTIONS,
                DEFAULT_JOURNAL_TTL,
            )),
            backups: Arc::new(MemoryStore::with_ttl(
                MAX_RETAINED_TRANSACTIONS,
                DEFAULT_JOURNAL_TTL,
            )),
        }
    }

    #[must_use]
    pub fn with_formatter(mut self, formatter: Arc<dyn CodeFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    /// Replace the set of extensions passed to the formatter
    #[must_use]
    pub fn with_formattable_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.formattable = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Fresh in-memory stores whose entries expire after `ttl`
    #[must_use]
    pub fn with_retention(mut self, ttl: Duration) -> Self {
        self.journals = Arc::new(MemoryStore::with_ttl(MAX_RETAINED_TRANSACTIONS, ttl));
        self.backups = Arc::new(MemoryStore::with_ttl(MAX_RETAINED_TRANSACTIONS, ttl));
        self
    }

    /// Use external journal and backup stores
    #[must_use]
    pub fn with_stores(mut self, journals: Arc<JournalStore>, backups: Arc<BackupStore>) -> Self {
        self.journals = journals;
        self.backups = backups;
        self
    }

    pub fn notifier(&self) -> &Arc<EventNotifier> {
        &self.notifier
    }

    pub fn locks(&self) -> &PathLocks {
        &self.locks
    }

    /// Journal of a transaction, if still retained
    pub async fn journal(&self, txn_id: TxnId) -> Option<TransactionJournal> {
        self.journals.get(&txn_id).await
    }

    /// Retained journals, oldest first
    pub async fn journals(&self) -> Vec<TransactionJournal> {
        let mut all = self.journals.list().await;
        all.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        all
    }

    /// Whether a backup set is retained for `txn_id`
    pub async fn has_backup(&self, txn_id: TxnId) -> bool {
        self.backups.get(&txn_id).await.is_some()
    }

    /// Apply `changes` as one transaction
    ///
    /// Dry runs always return `Ok`, with failures listed in the result.
    ///
    /// # Errors
    /// - [`TransactionError::ValidationFailed`] when phase B rejects any change
    /// - [`TransactionError::FileOperationFailed`] when a change fails during
    ///   apply; `rolled_back` tells whether the backups were restored
    pub async fn execute(
        &self,
        plan_id: &PlanId,
        changes: &[FileChange],
        options: ApplyOptions,
        correlation_id: &CorrelationId,
    ) -> Result<ApplyResult, TransactionError> {
        let txn_id = TxnId::new();
        let mut journal = TransactionJournal::new(txn_id, plan_id.clone(), correlation_id.clone());
        journal.dry_run = options.dry_run;
        self.journals.put(txn_id, journal.clone()).await;

        let span = info_span!(
            "transaction",
            txn_id = %txn_id,
            plan_id = %plan_id,
            correlation_id = %correlation_id,
            dry_run = options.dry_run,
        );
        let outcome = async {
            if options.dry_run {
                Ok(self.simulate(&mut journal, changes, correlation_id).await)
            } else {
                self.run(&mut journal, changes, options, correlation_id).await
            }
        }
        .instrument(span)
        .await;

        counter!("aide_transactions_total", "status" => journal.status.as_str()).increment(1);
        self.journals.put(txn_id, journal).await;
        outcome
    }

    async fn run(
        &self,
        journal: &mut TransactionJournal,
        changes: &[FileChange],
        options: ApplyOptions,
        correlation_id: &CorrelationId,
    ) -> Result<ApplyResult, TransactionError> {
        let txn_id = journal.id;
        let _locks = self
            .locks
            .acquire(changes.iter().flat_map(touched_paths).filter_map(lock_key))
            .await;
        info!(changes = changes.len(), "transaction started");

        let backup = if options.create_backups {
            let backup = self.capture_backups(journal, changes).await;
            self.backups.put(txn_id, backup.clone()).await;
            Some(backup)
        } else {
            None
        };

        let resolved = match self.prepare(txn_id, changes, correlation_id).await {
            Ok(resolved) => resolved,
            Err(errors) => {
                warn!(errors = errors.len(), "transaction rejected by validation");
                journal.transition(TransactionStatus::Failed);
                self.backups.delete(&txn_id).await;
                return Err(TransactionError::ValidationFailed { txn_id, errors });
            }
        };

        let total = resolved.len();
        let mut applied = Vec::with_capacity(total);
        for (index, change) in resolved.iter().enumerate() {
            self.notifier.emit(
                correlation_id,
                EventPayload::progress(txn_id, index, total, &change.path, change.operation),
            );
            tokio::task::yield_now().await;
            debug!(file = %change.path, operation = change.operation.as_str(), "applying change");

            if let Err(source) = self.apply_change(change, options.format_on_save).await {
                warn!(file = %change.path, error = %source, "change failed");
                journal.record_failure(OperationKind::Apply, &change.path, &source);
                let reach = Reach {
                    applied: &resolved[..index],
                    failed: change,
                };

                let rolled_back = match &backup {
                    Some(backup) => {
                        let recovered = self.restore(journal, backup, Some(&reach)).await;
                        for path in reach.paths() {
                            if !backup.contains(&path) && !recovered.contains(&path) {
                                journal.mark_unrecoverable(path);
                            }
                        }
                        journal.transition(TransactionStatus::RolledBack);
                        counter!("aide_rollbacks_total").increment(1);
                        self.backups.delete(&txn_id).await;
                        true
                    }
                    None => {
                        for path in touched_paths(change).filter_map(lock_key) {
                            journal.mark_unrecoverable(path);
                        }
                        journal.transition(TransactionStatus::Failed);
                        false
                    }
                };
                info!(rolled_back, "transaction aborted");
                return Err(TransactionError::FileOperationFailed {
                    txn_id,
                    path: change.path.clone(),
                    source,
                    rolled_back,
                });
            }

            journal.record_success(OperationKind::Apply, &change.path);
            applied.push(change.path.clone());
        }

        journal.transition(TransactionStatus::Completed);
        self.notifier
            .emit(correlation_id, EventPayload::completed(txn_id));
        info!(applied = applied.len(), "transaction completed");

        Ok(ApplyResult {
            transaction_id: txn_id,
            success: true,
            applied_files: applied,
            errors: Vec::new(),
            status: TransactionStatus::Completed,
        })
    }

    /// Validate and walk every change without touching the workspace
    async fn simulate(
        &self,
        journal: &mut TransactionJournal,
        changes: &[FileChange],
        correlation_id: &CorrelationId,
    ) -> ApplyResult {
        let txn_id = journal.id;
        let total = changes.len();
        let mut errors = Vec::new();
        let mut evaluated = Vec::with_capacity(total);

        for (index, change) in changes.iter().enumerate() {
            self.notifier.emit(
                correlation_id,
                EventPayload::progress(txn_id, index, total, &change.path, change.operation),
            );
            tokio::task::yield_now().await;

            let mut found = Vec::new();
            let change = match self.check_diff(txn_id, change, correlation_id) {
                Ok(resolved) => resolved,
                Err(err) => {
                    found.push(err);
                    change.clone()
                }
            };
            found.extend(self.validator.validate_change(&change).await);
            if found.is_empty()
                && change.operation.writes_content()
                && change.method() == Some(ApplyMethod::Diff)
            {
                found.push(format!("{}: {}", change.path, ApplyError::DiffApplyUnsupported));
            }

            if found.is_empty() {
                journal.record_success(OperationKind::Apply, &change.path);
            }
            for err in &found {
                journal.record_failure(OperationKind::Apply, &change.path, err);
            }
            errors.extend(found);
            evaluated.push(change.path);
        }

        let status = if errors.is_empty() {
            self.notifier
                .emit(correlation_id, EventPayload::completed(txn_id));
            TransactionStatus::Completed
        } else {
            TransactionStatus::Failed
        };
        journal.transition(status);
        info!(evaluated = evaluated.len(), errors = errors.len(), "dry run finished");

        ApplyResult {
            transaction_id: txn_id,
            success: errors.is_empty(),
            applied_files: evaluated,
            errors,
            status,
        }
    }

    /// Phase A: snapshot every allowed path the changes can touch
    ///
    /// Failures are journaled and skipped; such a path cannot be restored.
    async fn capture_backups(
        &self,
        journal: &mut TransactionJournal,
        changes: &[FileChange],
    ) -> TransactionBackup {
        let mut backup = TransactionBackup::new(journal.id);
        let paths = changes
            .iter()
            .filter(|c| c.backup)
            .flat_map(touched_paths)
            .filter_map(lock_key);

        for path in paths {
            if backup.contains(&path) || !self.fs.is_allowed(&path) {
                continue;
            }
            match BackupEntry::capture(self.fs.as_ref(), &path).await {
                Ok(entry) => {
                    journal.record_success(OperationKind::Backup, &path);
                    backup.entries.push(entry);
                }
                Err(err) => {
                    warn!(file = %path, error = %err, "backup failed");
                    journal.record_failure(OperationKind::Backup, &path, &err);
                }
            }
        }
        for (from, to) in changes.iter().filter_map(rename_endpoints) {
            if !backup.contains(&from) {
                backup.renamed.push((from, to));
            }
        }
        debug!(
            entries = backup.entries.len(),
            renamed = backup.renamed.len(),
            "backups captured"
        );
        backup
    }

    /// Phase B: resolve diffs and re-validate every change
    async fn prepare(
        &self,
        txn_id: TxnId,
        changes: &[FileChange],
        correlation_id: &CorrelationId,
    ) -> Result<Vec<FileChange>, Vec<String>> {
        let mut errors = Vec::new();
        let mut resolved = Vec::with_capacity(changes.len());

        for change in changes {
            let change = match self.check_diff(txn_id, change, correlation_id) {
                Ok(resolved) => resolved,
                Err(err) => {
                    errors.push(err);
                    change.clone()
                }
            };
            errors.extend(self.validator.validate_change(&change).await);
            resolved.push(change);
        }

        if errors.is_empty() {
            Ok(resolved)
        } else {
            Err(errors)
        }
    }

    fn check_diff(
        &self,
        txn_id: TxnId,
        change: &FileChange,
        correlation_id: &CorrelationId,
    ) -> Result<FileChange, String> {
        let (resolved, check) = match resolve_diff(change) {
            DiffResolution::NotDiff => return Ok(change.clone()),
            DiffResolution::Resolved { change, check } => (Some(change), check),
            DiffResolution::Invalid { check } => (None, check),
        };

        self.notifier.emit(
            correlation_id,
            EventPayload::DiffValidated {
                txn_id,
                file: change.path.clone(),
                valid: check.valid,
                fallback: check.fallback,
            },
        );
        resolved.ok_or_else(|| file_error(&change.path, reasons::INVALID_DIFF))
    }

    async fn apply_change(&self, change: &FileChange, format: bool) -> Result<(), ApplyError> {
        let fs = self.fs.as_ref();
        match change.operation {
            ChangeOperation::Create | ChangeOperation::Update => {
                if change.operation == ChangeOperation::Create && fs.exists(&change.path).await {
                    return Err(ApplyError::AlreadyExists);
                }
                let content = self.render(change).await?;
                fs.write_file(&change.path, &content).await?;
                if format {
                    self.format_written(&change.path, &content).await;
                }
                Ok(())
            }
            ChangeOperation::Delete => Ok(fs.delete_file(&change.path).await?),
            ChangeOperation::Rename => {
                let to = change
                    .new_path
                    .as_deref()
                    .ok_or(ApplyError::MissingNewPath)?;
                Ok(fs.rename_file(&change.path, to).await?)
            }
        }
    }

    /// Content a create or update writes
    async fn render(&self, change: &FileChange) -> Result<String, ApplyError> {
        match change.method().unwrap_or(ApplyMethod::ReplaceFile) {
            ApplyMethod::Diff => Err(ApplyError::DiffApplyUnsupported),
            ApplyMethod::ReplaceFile => change.content.clone().ok_or(ApplyError::MissingContent),
            ApplyMethod::InsertAtLine => {
                let (Some(line), Some(text)) = (change.insert_line, change.content.as_deref())
                else {
                    return Err(ApplyError::MissingContent);
                };
                let current = if change.operation == ChangeOperation::Create {
                    String::new()
                } else {
                    self.fs.read_file(&change.path).await?
                };
                Ok(insert_line(&current, line, text))
            }
        }
    }

    async fn format_written(&self, path: &str, content: &str) {
        if !is_formattable(path, &self.formattable) {
            return;
        }
        match self.formatter.format(path, content).await {
            Ok(formatted) if formatted != content => {
                if let Err(err) = self.fs.write_file(path, &formatted).await {
                    warn!(file = path, error = %err, "failed to write formatted output");
                }
            }
            Ok(_) => {}
            Err(err) => warn!(file = path, error = %err, "format on save failed"),
        }
    }

    /// Restore a backup set in reverse capture order, journaling each file
    ///
    /// With a `reach` only paths the failed apply got to are restored.
    /// Set-aside renames are moved back afterwards; returns the endpoints
    /// put back that way.
    async fn restore(
        &self,
        journal: &mut TransactionJournal,
        backup: &TransactionBackup,
        reach: Option<&Reach<'_>>,
    ) -> HashSet<String> {
        let (scope, moved) = match reach {
            Some(reach) => (Some(reach.paths().collect::<HashSet<_>>()), reach.moved()),
            None => (None, backup.renamed.clone()),
        };
        let renames: Vec<&(String, String)> =
            backup.renamed.iter().filter(|&r| moved.contains(r)).collect();

        for entry in backup.entries.iter().rev() {
            if scope.as_ref().is_some_and(|s| !s.contains(&entry.path)) {
                continue;
            }
            if !entry.existed && renames.iter().any(|(_, to)| *to == entry.path) {
                continue;
            }
            match entry.restore(self.fs.as_ref()).await {
                Ok(()) => journal.record_success(OperationKind::Rollback, &entry.path),
                Err(err) => {
                    warn!(file = %entry.path, error = %err, "rollback of file failed");
                    journal.record_failure(OperationKind::Rollback, &entry.path, &err);
                }
            }
        }

        let mut recovered = HashSet::new();
        for (from, to) in renames.into_iter().rev() {
            match self.fs.rename_file(to, from).await {
                Ok(()) => {
                    journal.record_success(OperationKind::Rollback, from);
                    recovered.insert(from.clone());
                    recovered.insert(to.clone());
                }
                Err(err) => {
                    warn!(from = %to, to = %from, error = %err, "rename back failed");
                    journal.record_failure(OperationKind::Rollback, from, &err);
                }
            }
        }
        recovered
    }

    /// Restore the backups of a finished transaction
    ///
    /// Individual restore failures are journaled; the journal still ends
    /// rolled back.
    ///
    /// # Errors
    /// - [`TransactionError::NoBackupFound`] when the transaction ran without
    ///   backups, was already rolled back, or its backup expired
    /// - [`TransactionError::JournalNotFound`] for an unknown transaction
    /// - [`TransactionError::InvalidState`] when the journal cannot move to
    ///   rolled back
    pub async fn rollback(
        &self,
        txn_id: TxnId,
        correlation_id: &CorrelationId,
    ) -> Result<TransactionJournal, TransactionError> {
        let span = info_span!("rollback", txn_id = %txn_id, correlation_id = %correlation_id);
        async {
            let paths: Vec<String> = self
                .backups
                .get(&txn_id)
                .await
                .ok_or(TransactionError::NoBackupFound(txn_id))?
                .paths()
                .map(str::to_string)
                .collect();
            let _locks = self.locks.acquire(paths).await;

            // Re-read under the locks; a concurrent rollback may have won.
            let backup = self
                .backups
                .get(&txn_id)
                .await
                .ok_or(TransactionError::NoBackupFound(txn_id))?;
            let mut journal = self
                .journals
                .get(&txn_id)
                .await
                .ok_or(TransactionError::JournalNotFound(txn_id))?;
            if !journal.status.can_transition_to(TransactionStatus::RolledBack) {
                return Err(TransactionError::InvalidState {
                    txn_id,
                    status: journal.status,
                });
            }

            self.restore(&mut journal, &backup, None).await;
            journal.transition(TransactionStatus::RolledBack);
            counter!("aide_rollbacks_total").increment(1);
            self.journals.put(txn_id, journal.clone()).await;
            self.backups.delete(&txn_id).await;

            info!(failed = journal.failed_rollbacks().len(), "transaction rolled back");
            Ok(journal)
        }
        .instrument(span)
        .await
    }
}

/// Raw paths a change can modify (both endpoints for a rename)
fn touched_paths(change: &FileChange) -> impl Iterator<Item = &str> {
    let destination = match change.operation {
        ChangeOperation::Rename => change.new_path.as_deref(),
        _ => None,
    };
    std::iter::once(change.path.as_str()).chain(destination)
}

/// Normalized `(from, to)` of a rename
fn rename_endpoints(change: &FileChange) -> Option<(String, String)> {
    if change.operation != ChangeOperation::Rename {
        return None;
    }
    Some((lock_key(&change.path)?, lock_key(change.new_path.as_deref()?)?))
}

/// Changes a failed apply got to: those applied plus the one that failed
struct Reach<'a> {
    applied: &'a [FileChange],
    failed: &'a FileChange,
}

impl Reach<'_> {
    /// Normalized touched paths, in change order
    fn paths(&self) -> impl Iterator<Item = String> + '_ {
        self.applied
            .iter()
            .chain(std::iter::once(self.failed))
            .flat_map(touched_paths)
            .filter_map(lock_key)
    }

    /// Renames that actually moved a file
    fn moved(&self) -> Vec<(String, String)> {
        self.applied.iter().filter_map(rename_endpoints).collect()
    }
}

/// Insert `text` as a new line before 1-based `line`; past the end appends
/// after the last line, keeping a trailing newline in place
fn insert_line(current: &str, line: usize, text: &str) -> String {
    if current.is_empty() {
        return text.to_string();
    }
    let mut lines: Vec<&str> = current.split('\n').collect();
    let last = match lines.last() {
        Some(&"") => lines.len() - 1,
        _ => lines.len(),
    };
    let at = line.saturating_sub(1).min(last);
    lines.insert(at, text);
    lines.join("\n")
}
