//! AIDE shared types
//!
//! Data model shared by every AIDE crate.
//!
//! # Core Concepts
//!
//! - [`Plan`], [`Step`], [`FileChange`]: the structured edit plan handed to the core
//! - [`WorkspacePath`]: normalized relative path that cannot escape the workspace
//! - [`Fingerprint`]: Blake3 content digest, used as etag and backup checksum
//! - [`FileMetadata`]: live metadata returned by the filesystem adapter
//! - [`Store`]: keyed put/get/list/delete seam for plans, journals and backups
//!
//! # Example
//!
//! ```rust,ignore
//! use aide_types::{FileChange, Plan, Step, StepCategory};
//!
//! let plan = Plan::new("plan-1", "add a constant")
//!     .with_steps(vec![Step::new("s1", StepCategory::Generate)])
//!     .with_changes(vec![FileChange::create("src/New.ts", "export const x = 1;")]);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod hash;
mod ids;
mod metadata;
mod path;
mod plan;
mod store;

pub use hash::{Fingerprint, HashError};
pub use ids::{BuildId, CorrelationId, PlanId, TxnId};
pub use metadata::{EntryKind, FileMetadata, FileTreeNode, Permissions};
pub use path::{PathError, WorkspacePath};
pub use plan::{
    ApplyMethod, ChangeOperation, FileChange, Plan, Step, StepCategory, StepStatus,
};
pub use store::{MemoryStore, Store};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
