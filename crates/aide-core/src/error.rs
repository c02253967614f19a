//! Boundary error type
//!
//! Every failure surfaced by [`IdeBackend`](crate::IdeBackend) is an
//! [`AideError`]. It maps onto an HTTP-style status and a stable
//! machine-readable code, and renders into an [`ErrorResponse`] that always
//! carries the request's correlation id.

use crate::build::BuildError;
use crate::config::{ConfigError, Environment};
use aide_fs::FsError;
use aide_txn::{ApplyError, TransactionError};
use aide_types::{CorrelationId, PlanId};
use serde::{Deserialize, Serialize};
use std::error::Error as _;

/// Main backend error type
#[derive(Debug, thiserror::Error)]
pub enum AideError {
    /// Filesystem adapter failure
    #[error(transparent)]
    Fs(#[from] FsError),

    /// Transaction failure
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Build queue failure
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unknown or expired plan
    #[error("plan {0} not found")]
    PlanNotFound(PlanId),

    /// Malformed request
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl AideError {
    /// HTTP-style status code
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self.code() {
            "PATH_FORBIDDEN" => 403,
            "NOT_FOUND" | "NO_BACKUP_FOUND" => 404,
            "VALIDATION_FAILED" | "DIFF_APPLY_UNSUPPORTED" => 400,
            "CONCURRENT_MODIFICATION" | "INVALID_STATE" => 409,
            _ => 500,
        }
    }

    /// Stable machine-readable code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Fs(err) => fs_code(err),
            Self::Transaction(err) => match err {
                TransactionError::ValidationFailed { .. } => "VALIDATION_FAILED",
                TransactionError::FileOperationFailed { source, .. } => match source {
                    ApplyError::DiffApplyUnsupported => "DIFF_APPLY_UNSUPPORTED",
                    ApplyError::Fs(fs) if fs.is_forbidden() => "PATH_FORBIDDEN",
                    _ => "FILE_OPERATION_FAILED",
                },
                TransactionError::NoBackupFound(_) => "NO_BACKUP_FOUND",
                TransactionError::JournalNotFound(_) => "NOT_FOUND",
                TransactionError::InvalidState { .. } => "INVALID_STATE",
            },
            Self::Build(err) => match err {
                BuildError::NotFound(_) => "NOT_FOUND",
                BuildError::NotConfigured => "VALIDATION_FAILED",
                BuildError::AlreadyFinished(_) => "INVALID_STATE",
                BuildError::Spawn { .. } | BuildError::Wait(_) => "BUILD_PROCESS_ERROR",
            },
            Self::Config(_) => "INTERNAL_ERROR",
            Self::PlanNotFound(_) => "NOT_FOUND",
            Self::InvalidRequest(_) => "VALIDATION_FAILED",
        }
    }

    /// Wire form; the source chain is only included outside production
    #[must_use]
    pub fn to_response(&self, correlation_id: &CorrelationId, environment: Environment) -> ErrorResponse {
        let details = (!environment.is_production()).then(|| {
            let mut chain = Vec::new();
            let mut source = self.source();
            while let Some(err) = source {
                chain.push(err.to_string());
                source = err.source();
            }
            chain
        });

        ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
            correlation_id: correlation_id.clone(),
            details: details.filter(|d| !d.is_empty()),
        }
    }
}

fn fs_code(err: &FsError) -> &'static str {
    match err {
        FsError::PathForbidden { .. } => "PATH_FORBIDDEN",
        FsError::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
        FsError::MaxDepthExceeded { .. } => "VALIDATION_FAILED",
        other if other.is_not_found() => "NOT_FOUND",
        _ => "FILE_OPERATION_FAILED",
    }
}

/// Error body returned to collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub correlation_id: CorrelationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}
