//! AIDE Core - backend facade
//!
//! Wires the workspace adapter, plan validator, transaction engine, event
//! notifier and build queue into one [`IdeBackend`]:
//! - Stores and validates AI-produced plans
//! - Applies plans atomically, with rollback
//! - Serves file reads, conditional saves, metadata and trees
//! - Publishes correlated progress events
//! - Runs debounced build commands
//!
//! # Example
//!
//! ```rust,ignore
//! use aide_core::prelude::*;
//!
//! # async fn example() -> Result<(), AideError> {
//! let config = AideConfig::load("aide.toml")?;
//! let backend = IdeBackend::from_config(&config)?;
//!
//! let cid = CorrelationId::new();
//! let submission = backend.submit_plan(plan, &cid).await;
//! let result = backend
//!     .apply_plan(ApplyRequest::new(submission.plan.id), &cid)
//!     .await?;
//! println!("applied {:?}", result.applied_files);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod build;
pub mod config;
pub mod error;
pub mod service;
pub mod telemetry;

pub use build::{BuildError, BuildManager, BuildStatus, CANCELLED_NOTE};
pub use config::{
    AideConfig, BuildConfig, ConfigError, Environment, EventsConfig, FormatterConfig,
    LimitsConfig, PolicyConfig, RetentionConfig, ENV_VAR,
};
pub use error::{AideError, ErrorResponse};
pub use service::{ApplyRequest, IdeBackend, PlanSubmission};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for embedding the backend
    pub use crate::{AideConfig, AideError, ApplyRequest, Environment, IdeBackend, PlanSubmission};
    pub use aide_events::{Event, EventPayload};
    pub use aide_txn::{ApplyOptions, ApplyResult, TransactionStatus};
    pub use aide_types::{ApplyMethod, ChangeOperation, CorrelationId, FileChange, Plan, PlanId, Step, TxnId};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::prelude::*;
    use aide_test_utils::TestWorkspace;

    #[tokio::test]
    async fn submit_then_apply() {
        let tw = TestWorkspace::new();
        let backend = IdeBackend::from_config(&AideConfig::new().with_workspace_root(tw.root())).unwrap();
        let cid = CorrelationId::new();

        let plan = Plan::new("p1", "create").with_changes(vec![FileChange::create("src/a.ts", "a")]);
        let submission = backend.submit_plan(plan, &cid).await;
        assert!(submission.validation.valid);

        let result = backend.apply_plan(ApplyRequest::new("p1"), &cid).await.unwrap();
        assert!(result.success);
        assert_eq!(result.status, TransactionStatus::Completed);
        assert_eq!(tw.read("src/a.ts").as_deref(), Some("a"));
    }
}
