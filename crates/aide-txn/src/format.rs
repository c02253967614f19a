//! Formatter seam used after writes when format-on-save is enabled
//!
//! Formatting is best-effort: a formatter failure is logged by the engine
//! and never fails the transaction.

use aide_types::WorkspacePath;
use async_trait::async_trait;
use std::fmt::Debug;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Extensions formatted by default
pub const DEFAULT_FORMATTABLE_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "mjs", "cjs", "json", "css", "scss", "html", "md",
];

/// Formatter failures
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("failed to run formatter {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("formatter {program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("formatter output is not valid UTF-8")]
    InvalidOutput,
}

/// Source formatter
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CodeFormatter: Send + Sync + Debug {
    /// Return the formatted form of `content` for the file at `path`
    async fn format(&self, path: &str, content: &str) -> Result<String, FormatError>;
}

/// Formatter that returns content unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFormatter;

#[async_trait]
impl CodeFormatter for NoopFormatter {
    async fn format(&self, _path: &str, content: &str) -> Result<String, FormatError> {
        Ok(content.to_string())
    }
}

/// Pipes content through an external program (stdin to stdout)
///
/// Any argument equal to or containing `{path}` has it replaced with the
/// workspace-relative path, which lets tools pick a parser by file name.
#[derive(Debug, Clone)]
pub struct CommandFormatter {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandFormatter {
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
        }
    }

    /// Run the program from `dir`
    #[must_use]
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl CodeFormatter for CommandFormatter {
    async fn format(&self, path: &str, content: &str) -> Result<String, FormatError> {
        let spawn_err = |source| FormatError::Spawn {
            program: self.program.clone(),
            source,
        };

        let mut cmd = Command::new(&self.program);
        cmd.args(self.args.iter().map(|a| a.replace("{path}", path)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(spawn_err)?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(content.as_bytes()).await.map_err(spawn_err)?;
        }
        let output = child.wait_with_output().await.map_err(spawn_err)?;

        if !output.status.success() {
            return Err(FormatError::Failed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        String::from_utf8(output.stdout).map_err(|_| FormatError::InvalidOutput)
    }
}

/// Whether `path` has one of `extensions` (case-insensitive)
#[must_use]
pub fn is_formattable(path: &str, extensions: &[String]) -> bool {
    WorkspacePath::parse(path)
        .ok()
        .and_then(|p| p.extension().map(str::to_ascii_lowercase))
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)))
}
