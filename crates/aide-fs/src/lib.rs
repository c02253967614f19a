//! AIDE filesystem adapter
//!
//! Sandboxed access to a workspace directory. Every path goes through the
//! [`PathPolicy`] guard before any disk access, and writes land through a
//! temp-file-then-rename so readers never observe partial content.
//!
//! # Components
//!
//! - [`PathPolicy`]: allow-list guard over normalized relative paths
//! - [`FileSystem`]: the async seam the transaction engine talks to
//! - [`Workspace`]: local-disk implementation with metadata, tree listing
//!   and conditional writes
//! - [`run_batch`]: independent multi-operation requests

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod adapter;
mod atomic;
mod batch;
mod error;
mod mime;
mod policy;
mod tree;
mod workspace;

pub use adapter::FileSystem;
pub use atomic::TEMP_SUFFIX;
pub use batch::{run_batch, BatchOperation, BatchResult};
pub use error::FsError;
pub use mime::{mime_for, DIRECTORY_MIME};
pub use policy::{PathPolicy, DEFAULT_ALLOWED_PATHS};
pub use tree::DEFAULT_MAX_DEPTH;
pub use workspace::{Workspace, DEFAULT_IGNORED_DIRS, DEFAULT_MAX_FILE_SIZE};

/// Result alias for filesystem operations
pub type Result<T> = std::result::Result<T, FsError>;
