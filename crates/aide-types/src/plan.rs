//! Plan data model
//!
//! A [`Plan`] is produced by the external plan generator and handed to the
//! core as an immutable input, except for its `warnings`, which validation
//! appends to. Steps and file changes are independent ordered lists: steps
//! are only checked as a dependency graph, file changes are what the
//! transaction engine applies.

use crate::ids::PlanId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured multi-file edit plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// Unique plan id
    pub id: PlanId,
    /// Human-readable summary (opaque to the core)
    #[serde(default)]
    pub summary: String,
    /// Model reasoning (opaque to the core)
    #[serde(default)]
    pub reasoning: String,
    /// Ordered steps
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Ordered file changes
    #[serde(default, alias = "fileChanges")]
    pub changes: Vec<FileChange>,
    /// Free-form notes; validation errors are appended here
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Creation time
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Plan {
    /// Create an empty plan
    #[must_use]
    pub fn new(id: impl Into<PlanId>, summary: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            summary: summary.into(),
            reasoning: String::new(),
            steps: Vec::new(),
            changes: Vec::new(),
            warnings: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// With steps
    #[must_use]
    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = steps;
        self
    }

    /// With file changes
    #[must_use]
    pub fn with_changes(mut self, changes: Vec<FileChange>) -> Self {
        self.changes = changes;
        self
    }

    /// With reasoning text
    #[must_use]
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    /// Append warnings (deduplicated, order preserved)
    pub fn append_warnings<I>(&mut self, warnings: I)
    where
        I: IntoIterator<Item = String>,
    {
        for w in warnings {
            if !self.warnings.contains(&w) {
                self.warnings.push(w);
            }
        }
    }

    /// Changes whose path is in `selected`, in plan order
    #[must_use]
    pub fn select_changes(&self, selected: Option<&[String]>) -> Vec<FileChange> {
        match selected {
            None => self.changes.clone(),
            Some(files) => self
                .changes
                .iter()
                .filter(|c| files.iter().any(|f| f == &c.path))
                .cloned()
                .collect(),
        }
    }
}

/// Plan step (validated as a graph, never executed by the core)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Unique id within the plan
    pub id: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Category tag
    #[serde(alias = "type")]
    pub category: StepCategory,
    /// Ids of steps that must precede this one
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Status, owned by external orchestration
    #[serde(default)]
    pub status: StepStatus,
}

impl Step {
    /// Create a pending step with no dependencies
    #[must_use]
    pub fn new(id: impl Into<String>, category: StepCategory) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            category,
            dependencies: Vec::new(),
            status: StepStatus::Pending,
        }
    }

    /// With dependency ids
    #[must_use]
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// With description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Step category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepCategory {
    Analyze,
    Generate,
    Modify,
    Test,
    Deploy,
}

/// Step status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// File operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Create,
    Update,
    Delete,
    Rename,
}

impl ChangeOperation {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Rename => "rename",
        }
    }

    /// Whether the operation writes file content
    #[must_use]
    pub const fn writes_content(self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }
}

/// How the content of a create/update is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApplyMethod {
    Diff,
    ReplaceFile,
    InsertAtLine,
}

impl ApplyMethod {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Diff => "diff",
            Self::ReplaceFile => "replaceFile",
            Self::InsertAtLine => "insertAtLine",
        }
    }
}

/// One file-level change of a plan
///
/// `path` stays a raw string: policy violations are reported by validation
/// rather than rejected at deserialization time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    /// Target relative path
    #[serde(alias = "file")]
    pub path: String,
    /// Operation
    pub operation: ChangeOperation,
    /// Apply method; omitted means `replaceFile` for create/update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_method: Option<ApplyMethod>,
    /// Unified diff text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    /// Full content (or the inserted text for `insertAtLine`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Destination of a rename
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_path: Option<String>,
    /// 1-based line for `insertAtLine`
    #[serde(default, alias = "lineNumber", skip_serializing_if = "Option::is_none")]
    pub insert_line: Option<usize>,
    /// Whether the file should be backed up before the change
    #[serde(default = "default_backup")]
    pub backup: bool,
}

fn default_backup() -> bool {
    true
}

impl FileChange {
    fn bare(path: impl Into<String>, operation: ChangeOperation) -> Self {
        Self {
            path: path.into(),
            operation,
            apply_method: None,
            diff: None,
            content: None,
            new_path: None,
            insert_line: None,
            backup: true,
        }
    }

    /// Create a new file with full content
    #[must_use]
    pub fn create(path: impl Into<String>, content: impl Into<String>) -> Self {
        let mut c = Self::bare(path, ChangeOperation::Create);
        c.apply_method = Some(ApplyMethod::ReplaceFile);
        c.content = Some(content.into());
        c
    }

    /// Replace the full content of an existing file
    #[must_use]
    pub fn replace(path: impl Into<String>, content: impl Into<String>) -> Self {
        let mut c = Self::bare(path, ChangeOperation::Update);
        c.apply_method = Some(ApplyMethod::ReplaceFile);
        c.content = Some(content.into());
        c
    }

    /// Insert a line before the given 1-based line of an existing file
    #[must_use]
    pub fn insert_at_line(path: impl Into<String>, line: usize, content: impl Into<String>) -> Self {
        let mut c = Self::bare(path, ChangeOperation::Update);
        c.apply_method = Some(ApplyMethod::InsertAtLine);
        c.insert_line = Some(line);
        c.content = Some(content.into());
        c
    }

    /// Patch an existing file with a unified diff
    #[must_use]
    pub fn diff(path: impl Into<String>, diff: impl Into<String>) -> Self {
        let mut c = Self::bare(path, ChangeOperation::Update);
        c.apply_method = Some(ApplyMethod::Diff);
        c.diff = Some(diff.into());
        c
    }

    /// Delete an existing file
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::bare(path, ChangeOperation::Delete)
    }

    /// Rename an existing file
    #[must_use]
    pub fn rename(path: impl Into<String>, new_path: impl Into<String>) -> Self {
        let mut c = Self::bare(path, ChangeOperation::Rename);
        c.new_path = Some(new_path.into());
        c
    }

    /// Attach fallback content (used when a diff cannot be applied)
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Effective apply method (explicit, or `replaceFile` for content writes)
    #[must_use]
    pub fn method(&self) -> Option<ApplyMethod> {
        self.apply_method.or_else(|| {
            self.operation
                .writes_content()
                .then_some(ApplyMethod::ReplaceFile)
        })
    }
}
