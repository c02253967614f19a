//! AIDE plan validation
//!
//! Checks a candidate plan before anything touches the workspace:
//!
//! - every file change satisfies its operation precondition against the
//!   live filesystem and carries the payload its apply method needs
//! - every step dependency names an existing step
//! - the step dependency relation is acyclic
//!
//! Steps are only validated as a graph; they are never executed here.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod diff;
mod graph;
mod validator;

pub use diff::{is_valid_diff, resolve_diff, DiffCheck, DiffResolution};
pub use graph::{DanglingDependency, GraphError, StepGraph};
pub use validator::{file_error, reasons, PlanValidator, ValidationReport};

use aide_types::{MemoryStore, Plan, PlanId, Store};
use std::time::Duration;

/// Keyed plan storage
pub type PlanStore = dyn Store<PlanId, Plan>;

/// In-memory plan store whose entries expire after `ttl`
#[must_use]
pub fn memory_plan_store(max_plans: u64, ttl: Duration) -> MemoryStore<PlanId, Plan> {
    MemoryStore::with_ttl(max_plans, ttl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn plan_store_round_trip() {
        let store: Arc<PlanStore> = Arc::new(memory_plan_store(8, Duration::from_secs(60)));
        let plan = Plan::new("p-1", "demo");
        store.put(plan.id.clone(), plan.clone()).await;
        assert_eq!(store.get(&plan.id).await, Some(plan.clone()));
        assert_eq!(store.delete(&plan.id).await.map(|p| p.id), Some(plan.id));
    }
}
