//! Transaction journal
//!
//! One journal per apply attempt. It records every backup, apply and
//! rollback step in order and carries the final status.

use aide_types::{CorrelationId, PlanId, TxnId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Journal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    RolledBack,
}

impl TransactionStatus {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        }
    }

    /// Allowed transitions: pending to any terminal state, and completed or
    /// failed to rolled back (explicit undo)
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Completed | Self::Failed | Self::RolledBack)
                | (Self::Completed | Self::Failed, Self::RolledBack)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of journaled step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Backup,
    Apply,
    Rollback,
}

/// One journaled step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    pub kind: OperationKind,
    pub file: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Audit record of one apply attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionJournal {
    pub id: TxnId,
    pub plan_id: PlanId,
    pub correlation_id: CorrelationId,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub operations: Vec<OperationRecord>,
    pub status: TransactionStatus,
    /// Paths reached by a rolled-back apply that could not be put back
    #[serde(default)]
    pub unrecoverable: Vec<String>,
}

impl TransactionJournal {
    /// Start a pending journal
    #[must_use]
    pub fn new(id: TxnId, plan_id: PlanId, correlation_id: CorrelationId) -> Self {
        Self {
            id,
            plan_id,
            correlation_id,
            started_at: Utc::now(),
            finished_at: None,
            dry_run: false,
            operations: Vec::new(),
            status: TransactionStatus::Pending,
            unrecoverable: Vec::new(),
        }
    }

    /// Append a successful step
    pub fn record_success(&mut self, kind: OperationKind, file: impl Into<String>) {
        self.push(kind, file.into(), None);
    }

    /// Append a failed step
    pub fn record_failure(&mut self, kind: OperationKind, file: impl Into<String>, error: impl fmt::Display) {
        self.push(kind, file.into(), Some(error.to_string()));
    }

    fn push(&mut self, kind: OperationKind, file: String, error: Option<String>) {
        self.operations.push(OperationRecord {
            kind,
            file,
            timestamp: Utc::now(),
            success: error.is_none(),
            error,
        });
    }

    /// Move to `next` if the transition is allowed; returns whether it moved
    pub fn transition(&mut self, next: TransactionStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            self.finished_at = Some(Utc::now());
            true
        } else {
            false
        }
    }

    /// Mark a path as impossible to restore
    pub fn mark_unrecoverable(&mut self, path: impl Into<String>) {
        let path = path.into();
        if !self.unrecoverable.contains(&path) {
            self.unrecoverable.push(path);
        }
    }

    /// Records of one kind
    pub fn records(&self, kind: OperationKind) -> impl Iterator<Item = &OperationRecord> {
        self.operations.iter().filter(move |r| r.kind == kind)
    }

    /// Files whose apply step succeeded, in apply order
    #[must_use]
    pub fn applied_files(&self) -> Vec<String> {
        self.records(OperationKind::Apply)
            .filter(|r| r.success)
            .map(|r| r.file.clone())
            .collect()
    }

    /// Files whose rollback step failed
    #[must_use]
    pub fn failed_rollbacks(&self) -> Vec<&str> {
        self.records(OperationKind::Rollback)
            .filter(|r| !r.success)
            .map(|r| r.file.as_str())
            .collect()
    }
}
