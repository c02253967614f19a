//! Plan and file change validation
//!
//! Errors are collected, never short-circuited, so callers see the whole
//! picture in one pass. Change errors are reported as `"<file>: <reason>"`.

use crate::graph::StepGraph;
use aide_fs::FileSystem;
use aide_types::{ApplyMethod, ChangeOperation, FileChange, Plan, Step, WorkspacePath};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Reason strings reported by validation
pub mod reasons {
    pub const PATH_NOT_ALLOWED: &str = "Path not allowed by security policy";
    pub const FILE_EXISTS: &str = "File already exists";
    pub const FILE_MISSING: &str = "File does not exist";
    pub const SOURCE_MISSING: &str = "Source file does not exist";
    pub const NEW_PATH_REQUIRED: &str = "New path required for rename operation";
    pub const NEW_PATH_NOT_ALLOWED: &str = "New path not allowed by security policy";
    pub const NEW_PATH_SAME: &str = "New path must differ from source path";
    pub const DIFF_REQUIRED: &str = "Diff content required for diff apply method";
    pub const CONTENT_REQUIRED: &str = "Content required for replaceFile apply method";
    pub const LINE_AND_CONTENT_REQUIRED: &str =
        "Line number and content required for insertAtLine apply method";
    pub const LINE_TOO_SMALL: &str = "Line number must be at least 1";
    pub const INVALID_DIFF: &str = "Invalid diff format";
    pub const CIRCULAR: &str = "Plan contains circular dependencies";
}

/// Outcome of validating a plan
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// Build from collected errors
    #[must_use]
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Prefix a reason with the file it concerns
#[must_use]
pub fn file_error(path: &str, reason: &str) -> String {
    format!("{path}: {reason}")
}

/// Validates plans against the live filesystem
#[derive(Debug, Clone)]
pub struct PlanValidator {
    fs: Arc<dyn FileSystem>,
}

impl PlanValidator {
    /// Create a validator reading through `fs`
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Validate file changes, then step dependencies
    pub async fn validate(&self, plan: &Plan) -> ValidationReport {
        let mut errors = self.validate_changes(&plan.changes).await;
        errors.extend(Self::validate_steps(&plan.steps));
        debug!(plan_id = %plan.id, errors = errors.len(), "plan validated");
        ValidationReport::from_errors(errors)
    }

    /// Validate every change in order, collecting prefixed errors
    pub async fn validate_changes(&self, changes: &[FileChange]) -> Vec<String> {
        let mut errors = Vec::new();
        for change in changes {
            errors.extend(self.validate_change(change).await);
        }
        errors
    }

    /// Validate one change against the current filesystem state
    ///
    /// A disallowed path is never checked on disk; only its payload is
    /// checked in addition to the policy error.
    pub async fn validate_change(&self, change: &FileChange) -> Vec<String> {
        let mut found = Vec::new();

        if self.fs.is_allowed(&change.path) {
            self.check_operation(change, &mut found).await;
        } else {
            found.push(reasons::PATH_NOT_ALLOWED);
        }
        check_payload(change, &mut found);

        found
            .into_iter()
            .map(|r| file_error(&change.path, r))
            .collect()
    }

    async fn check_operation(&self, change: &FileChange, out: &mut Vec<&'static str>) {
        let exists = self.fs.exists(&change.path).await;
        match change.operation {
            ChangeOperation::Create if exists => out.push(reasons::FILE_EXISTS),
            ChangeOperation::Update | ChangeOperation::Delete if !exists => {
                out.push(reasons::FILE_MISSING);
            }
            ChangeOperation::Rename => {
                if !exists {
                    out.push(reasons::SOURCE_MISSING);
                }
                match change.new_path.as_deref().filter(|p| !p.trim().is_empty()) {
                    None => out.push(reasons::NEW_PATH_REQUIRED),
                    Some(new_path) if !self.fs.is_allowed(new_path) => {
                        out.push(reasons::NEW_PATH_NOT_ALLOWED);
                    }
                    Some(new_path) if same_path(&change.path, new_path) => {
                        out.push(reasons::NEW_PATH_SAME);
                    }
                    Some(_) => {}
                }
            }
            _ => {}
        }
    }

    /// Dangling references and cycles of the step graph
    #[must_use]
    pub fn validate_steps(steps: &[Step]) -> Vec<String> {
        let graph = StepGraph::from_steps(steps);
        let mut errors: Vec<String> = graph
            .dangling()
            .iter()
            .map(|d| format!("Step {} has invalid dependency: {}", d.step, d.dependency))
            .collect();
        if graph.has_cycle() {
            errors.push(reasons::CIRCULAR.to_string());
        }
        errors
    }
}

fn check_payload(change: &FileChange, out: &mut Vec<&'static str>) {
    match change.method() {
        Some(ApplyMethod::Diff) if change.diff.is_none() => out.push(reasons::DIFF_REQUIRED),
        Some(ApplyMethod::ReplaceFile) if change.content.is_none() => {
            out.push(reasons::CONTENT_REQUIRED);
        }
        Some(ApplyMethod::InsertAtLine) => match (change.insert_line, &change.content) {
            (Some(0), Some(_)) => out.push(reasons::LINE_TOO_SMALL),
            (Some(_), Some(_)) => {}
            _ => out.push(reasons::LINE_AND_CONTENT_REQUIRED),
        },
        _ => {}
    }
}

fn same_path(a: &str, b: &str) -> bool {
    match (WorkspacePath::parse(a), WorkspacePath::parse(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
