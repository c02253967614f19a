//! Structural sanity check for unified diffs
//!
//! Diffs are never applied as patches. A diff-method change is either
//! rewritten into a `replaceFile` change when literal content is available,
//! or left as a diff so the apply step fails with an explicit error.

use aide_types::{ApplyMethod, FileChange};

/// Whether `text` looks like a unified diff: it has a `@@` hunk marker and at
/// least one added or removed line that is not a file header
#[must_use]
pub fn is_valid_diff(text: &str) -> bool {
    let has_hunk = text.contains("@@");
    let has_edit = text.lines().any(|line| {
        (line.starts_with('+') && !line.starts_with("+++"))
            || (line.starts_with('-') && !line.starts_with("---"))
    });
    has_hunk && has_edit
}

/// Outcome of checking a diff-method change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffCheck {
    /// The diff text passed the sanity check
    pub valid: bool,
    /// The change was rewritten to use its literal content
    pub fallback: bool,
}

/// Result of [`resolve_diff`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffResolution {
    /// Not a diff-method change; nothing to do
    NotDiff,
    /// Use this change from now on
    Resolved { change: FileChange, check: DiffCheck },
    /// Diff is malformed and there is no content to fall back to
    Invalid { check: DiffCheck },
}

/// Resolve a diff-method change into what the engine will actually apply
///
/// Whenever literal content is present it wins, since a diff cannot be
/// applied. A well-formed diff without content is kept as is and fails at
/// apply time. A missing diff payload is left for payload validation.
#[must_use]
pub fn resolve_diff(change: &FileChange) -> DiffResolution {
    if change.method() != Some(ApplyMethod::Diff) {
        return DiffResolution::NotDiff;
    }
    let Some(diff) = change.diff.as_deref() else {
        return DiffResolution::NotDiff;
    };

    let valid = is_valid_diff(diff);
    match (&change.content, valid) {
        (Some(_), _) => {
            let mut rewritten = change.clone();
            rewritten.apply_method = Some(ApplyMethod::ReplaceFile);
            DiffResolution::Resolved {
                change: rewritten,
                check: DiffCheck {
                    valid,
                    fallback: true,
                },
            }
        }
        (None, true) => DiffResolution::Resolved {
            change: change.clone(),
            check: DiffCheck {
                valid,
                fallback: false,
            },
        },
        (None, false) => DiffResolution::Invalid {
            check: DiffCheck {
                valid,
                fallback: false,
            },
        },
    }
}
