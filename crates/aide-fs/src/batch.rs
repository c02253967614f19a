//! Independent multi-operation requests

use crate::adapter::FileSystem;
use serde::{Deserialize, Serialize};

/// One entry of a batch request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum BatchOperation {
    Read { path: String },
    Write { path: String, content: String },
    Delete { path: String },
}

impl BatchOperation {
    /// Target path
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Read { path } | Self::Write { path, .. } | Self::Delete { path } => path,
        }
    }
}

/// Outcome of one batch entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub path: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run every operation in order; a failure only marks its own entry
///
/// Unlike a transaction there is no rollback: earlier entries stay applied.
pub async fn run_batch(fs: &dyn FileSystem, ops: &[BatchOperation]) -> Vec<BatchResult> {
    let mut results = Vec::with_capacity(ops.len());
    for op in ops {
        let outcome = match op {
            BatchOperation::Read { path } => fs.read_file(path).await.map(Some),
            BatchOperation::Write { path, content } => fs.write_file(path, content).await.map(|()| None),
            BatchOperation::Delete { path } => fs.delete_file(path).await.map(|()| None),
        };
        results.push(match outcome {
            Ok(content) => BatchResult {
                path: op.path().to_string(),
                success: true,
                content,
                error: None,
            },
            Err(e) => BatchResult {
                path: op.path().to_string(),
                success: false,
                content: None,
                error: Some(e.to_string()),
            },
        });
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PathPolicy, Workspace};
    use tempfile::TempDir;

    #[tokio::test]
    async fn entries_succeed_or_fail_independently() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::open(dir.path(), PathPolicy::default()).unwrap();
        let ops = vec![
            BatchOperation::Write {
                path: "src/a.ts".into(),
                content: "a".into(),
            },
            BatchOperation::Read {
                path: "src/missing.ts".into(),
            },
            BatchOperation::Write {
                path: "../evil".into(),
                content: "x".into(),
            },
            BatchOperation::Read {
                path: "src/a.ts".into(),
            },
            BatchOperation::Delete {
                path: "src/a.ts".into(),
            },
        ];

        let results = run_batch(&ws, &ops).await;
        let flags: Vec<bool> = results.iter().map(|r| r.success).collect();
        assert_eq!(flags, vec![true, false, false, true, true]);
        assert_eq!(results[3].content.as_deref(), Some("a"));
        assert!(results[2].error.as_deref().unwrap().contains("forbidden"));
        assert!(!ws.exists("src/a.ts").await);
    }

    #[test]
    fn wire_shape() {
        let op: BatchOperation =
            serde_json::from_str(r#"{"op":"write","path":"src/x.ts","content":"y"}"#).unwrap();
        assert_eq!(op.path(), "src/x.ts");
        let result = BatchResult {
            path: "src/x.ts".into(),
            success: true,
            content: None,
            error: None,
        };
        let value = serde_json::to_value(result).unwrap();
        assert!(value.get("error").is_none());
    }
}
