//! Event contracts carried to observers
//!
//! Wire form is a flat object: `{"type", "correlationId", "timestamp", ...}`
//! with the payload fields inlined next to the envelope.

use aide_types::{BuildId, ChangeOperation, CorrelationId, PlanId, TxnId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Envelope shared by every event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub correlation_id: CorrelationId,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    /// Stamp a payload with the current time
    #[must_use]
    pub fn new(correlation_id: CorrelationId, payload: EventPayload) -> Self {
        Self {
            correlation_id,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Wire name of the event type
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.payload.name()
    }
}

/// Build lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl BuildState {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Whether the build has finished
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Typed event payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    /// Plan generation started (emitted by the generator collaborator)
    #[serde(rename = "ai.started")]
    AiStarted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
    },

    /// Streamed generator token
    #[serde(rename = "ai.token")]
    AiToken { token: String },

    /// Plan generation finished
    #[serde(rename = "ai.completed")]
    AiCompleted {
        #[serde(rename = "planId", default, skip_serializing_if = "Option::is_none")]
        plan_id: Option<PlanId>,
    },

    /// Outcome of the diff sanity check for one change
    #[serde(rename = "fs.diffValidated")]
    DiffValidated {
        #[serde(rename = "txnId")]
        txn_id: TxnId,
        file: String,
        valid: bool,
        fallback: bool,
    },

    /// Transaction progress; the final event has `progress == 100` and `completed`
    #[serde(rename = "apply.progress")]
    ApplyProgress {
        #[serde(rename = "txnId")]
        txn_id: TxnId,
        progress: u8,
        #[serde(rename = "currentFile", default, skip_serializing_if = "Option::is_none")]
        current_file: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operation: Option<ChangeOperation>,
        #[serde(default)]
        completed: bool,
    },

    /// Build state change
    #[serde(rename = "build.status")]
    BuildStatus {
        #[serde(rename = "buildId")]
        build_id: BuildId,
        state: BuildState,
        #[serde(rename = "exitCode", default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },

    /// Failure surfaced to observers
    #[serde(rename = "error")]
    Error {
        code: String,
        message: String,
        #[serde(rename = "txnId", default, skip_serializing_if = "Option::is_none")]
        txn_id: Option<TxnId>,
    },
}

impl EventPayload {
    /// Wire name of the event type
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AiStarted { .. } => "ai.started",
            Self::AiToken { .. } => "ai.token",
            Self::AiCompleted { .. } => "ai.completed",
            Self::DiffValidated { .. } => "fs.diffValidated",
            Self::ApplyProgress { .. } => "apply.progress",
            Self::BuildStatus { .. } => "build.status",
            Self::Error { .. } => "error",
        }
    }

    /// Progress of change `index` (zero-based) out of `total`
    #[must_use]
    pub fn progress(
        txn_id: TxnId,
        index: usize,
        total: usize,
        current_file: &str,
        operation: ChangeOperation,
    ) -> Self {
        let pct = if total == 0 { 100 } else { index * 100 / total };
        Self::ApplyProgress {
            txn_id,
            progress: u8::try_from(pct.min(100)).unwrap_or(100),
            current_file: Some(current_file.to_string()),
            operation: Some(operation),
            completed: false,
        }
    }

    /// Terminal 100% progress event
    #[must_use]
    pub const fn completed(txn_id: TxnId) -> Self {
        Self::ApplyProgress {
            txn_id,
            progress: 100,
            current_file: None,
            operation: None,
            completed: true,
        }
    }
}
