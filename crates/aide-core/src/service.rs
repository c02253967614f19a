//! Backend service facade
//!
//! [`IdeBackend`] is what a transport layer (HTTP routes, WebSocket
//! handlers, the CLI) talks to. It owns no globals: every collaborator is
//! passed in, or wired from an [`AideConfig`] by [`IdeBackend::from_config`].

use crate::build::{BuildManager, BuildStatus};
use crate::config::{AideConfig, Environment};
use crate::error::{AideError, ErrorResponse};
use aide_events::{EventNotifier, EventPayload, Subscription};
use aide_fs::{run_batch, BatchOperation, BatchResult, FileSystem, PathPolicy, Workspace};
use aide_plan::{memory_plan_store, PlanStore, PlanValidator, ValidationReport};
use aide_txn::{
    lock_key, ApplyOptions, ApplyResult, CommandFormatter, TransactionEngine, TransactionError,
    TransactionJournal,
};
use aide_types::{
    BuildId, CorrelationId, FileMetadata, FileTreeNode, Plan, PlanId, TxnId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

const MAX_PLANS: u64 = 1_000;

/// Request to apply a stored plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    pub plan_id: PlanId,
    /// Restrict to these change paths (plan order is kept)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_files: Option<Vec<String>>,
    #[serde(default)]
    pub options: ApplyOptions,
}

impl ApplyRequest {
    #[must_use]
    pub fn new(plan_id: impl Into<PlanId>) -> Self {
        Self {
            plan_id: plan_id.into(),
            selected_files: None,
            options: ApplyOptions::default(),
        }
    }

    #[must_use]
    pub fn with_selected_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_files = Some(files.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: ApplyOptions) -> Self {
        self.options = options;
        self
    }
}

/// Stored plan plus its validation outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSubmission {
    pub plan: Plan,
    pub validation: ValidationReport,
}

/// The backend
#[derive(Debug, Clone)]
pub struct IdeBackend {
    workspace: Arc<Workspace>,
    validator: PlanValidator,
    plans: Arc<PlanStore>,
    engine: Arc<TransactionEngine>,
    notifier: Arc<EventNotifier>,
    builds: Arc<BuildManager>,
    max_tree_depth: usize,
    environment: Environment,
}

impl IdeBackend {
    /// Assemble from explicit collaborators
    #[must_use]
    pub fn new(
        workspace: Arc<Workspace>,
        plans: Arc<PlanStore>,
        engine: Arc<TransactionEngine>,
        notifier: Arc<EventNotifier>,
        builds: Arc<BuildManager>,
    ) -> Self {
        Self {
            validator: PlanValidator::new(workspace.clone()),
            workspace,
            plans,
            engine,
            notifier,
            builds,
            max_tree_depth: aide_fs::DEFAULT_MAX_DEPTH,
            environment: Environment::default(),
        }
    }

    /// Wire every collaborator from configuration
    ///
    /// # Errors
    /// [`AideError::Fs`] when the workspace root cannot be opened
    pub fn from_config(config: &AideConfig) -> Result<Self, AideError> {
        let workspace = Arc::new(
            Workspace::open(&config.workspace_root, PathPolicy::new(&config.policy.allowed_paths))?
                .with_ignored_dirs(config.policy.ignored_dirs.iter().cloned())
                .with_max_file_size(config.limits.max_file_size),
        );
        let notifier = Arc::new(EventNotifier::new(config.events.subscriber_buffer));

        let mut engine = TransactionEngine::new(workspace.clone(), Arc::clone(&notifier))
            .with_retention(config.retention.journal_ttl());
        if let Some(fmt) = &config.formatter {
            let formatter = CommandFormatter::new(fmt.program.clone(), fmt.args.clone())
                .in_dir(workspace.root());
            engine = engine
                .with_formatter(Arc::new(formatter))
                .with_formattable_extensions(fmt.extensions.iter().cloned());
        }

        let plans: Arc<PlanStore> =
            Arc::new(memory_plan_store(MAX_PLANS, config.retention.plan_ttl()));
        let builds = Arc::new(BuildManager::new(
            config.build.clone(),
            workspace.root(),
            Arc::clone(&notifier),
        ));

        info!(
            root = %workspace.root().display(),
            environment = %config.environment,
            "backend ready"
        );
        Ok(Self::new(workspace, plans, Arc::new(engine), notifier, builds)
            .with_max_tree_depth(config.limits.max_tree_depth)
            .with_environment(config.environment))
    }

    #[must_use]
    pub fn with_max_tree_depth(mut self, depth: usize) -> Self {
        self.max_tree_depth = depth;
        self
    }

    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    pub fn engine(&self) -> &Arc<TransactionEngine> {
        &self.engine
    }

    /// Render an error for the boundary in this backend's environment
    #[must_use]
    pub fn error_response(&self, err: &AideError, correlation_id: &CorrelationId) -> ErrorResponse {
        err.to_response(correlation_id, self.environment)
    }

    // Plans

    /// Validate and store a candidate plan
    ///
    /// Validation errors are appended to the plan's warnings; an invalid
    /// plan is still stored so it can be inspected and revised. A blank id
    /// is replaced with a fresh one.
    pub async fn submit_plan(&self, mut plan: Plan, correlation_id: &CorrelationId) -> PlanSubmission {
        if plan.id.as_str().trim().is_empty() {
            plan.id = PlanId::generate();
        }
        let validation = self.validator.validate(&plan).await;
        plan.append_warnings(validation.errors.iter().cloned());
        self.plans.put(plan.id.clone(), plan.clone()).await;

        info!(
            plan_id = %plan.id,
            correlation_id = %correlation_id,
            valid = validation.valid,
            changes = plan.changes.len(),
            "plan stored"
        );
        self.notifier.emit(
            correlation_id,
            EventPayload::AiCompleted {
                plan_id: Some(plan.id.clone()),
            },
        );
        PlanSubmission { plan, validation }
    }

    /// # Errors
    /// [`AideError::PlanNotFound`]
    pub async fn get_plan(&self, id: &PlanId) -> Result<Plan, AideError> {
        self.plans
            .get(id)
            .await
            .ok_or_else(|| AideError::PlanNotFound(id.clone()))
    }

    /// Stored plans, oldest first
    pub async fn list_plans(&self) -> Vec<Plan> {
        let mut plans = self.plans.list().await;
        plans.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        plans
    }

    /// # Errors
    /// [`AideError::PlanNotFound`]
    pub async fn delete_plan(&self, id: &PlanId) -> Result<Plan, AideError> {
        self.plans
            .delete(id)
            .await
            .ok_or_else(|| AideError::PlanNotFound(id.clone()))
    }

    /// Re-validate a stored plan against the current workspace
    ///
    /// # Errors
    /// [`AideError::PlanNotFound`]
    pub async fn validate_plan(&self, id: &PlanId) -> Result<ValidationReport, AideError> {
        let plan = self.get_plan(id).await?;
        Ok(self.validator.validate(&plan).await)
    }

    // Transactions

    /// Apply a stored plan (or the selected subset of its changes)
    ///
    /// Transaction failures are reported as a failed [`ApplyResult`] and an
    /// `error` event, not as `Err`.
    ///
    /// # Errors
    /// [`AideError::PlanNotFound`]
    pub async fn apply_plan(
        &self,
        request: ApplyRequest,
        correlation_id: &CorrelationId,
    ) -> Result<ApplyResult, AideError> {
        let plan = self.get_plan(&request.plan_id).await?;
        let changes = plan.select_changes(request.selected_files.as_deref());

        match self
            .engine
            .execute(&plan.id, &changes, request.options, correlation_id)
            .await
        {
            Ok(result) => Ok(result),
            Err(err) => {
                let journal = self.engine.journal(err.txn_id()).await;
                let result = ApplyResult::from_error(&err, journal.as_ref());
                let err = AideError::from(err);
                warn!(plan_id = %plan.id, code = err.code(), error = %err, "apply failed");
                self.notifier.emit(
                    correlation_id,
                    EventPayload::Error {
                        code: err.code().to_string(),
                        message: err.to_string(),
                        txn_id: Some(result.transaction_id),
                    },
                );
                Ok(result)
            }
        }
    }

    /// Undo a transaction from its backups
    ///
    /// # Errors
    /// [`TransactionError::NoBackupFound`] and the other rollback errors
    pub async fn rollback(
        &self,
        txn_id: TxnId,
        correlation_id: &CorrelationId,
    ) -> Result<TransactionJournal, AideError> {
        Ok(self.engine.rollback(txn_id, correlation_id).await?)
    }

    /// # Errors
    /// [`TransactionError::JournalNotFound`]
    pub async fn journal(&self, txn_id: TxnId) -> Result<TransactionJournal, AideError> {
        self.engine
            .journal(txn_id)
            .await
            .ok_or_else(|| TransactionError::JournalNotFound(txn_id).into())
    }

    pub async fn journals(&self) -> Vec<TransactionJournal> {
        self.engine.journals().await
    }

    // Files

    /// # Errors
    /// Policy or read failures
    pub async fn read_file(&self, path: &str) -> Result<String, AideError> {
        Ok(self.workspace.read_file(path).await?)
    }

    /// Single-file save with optional optimistic concurrency check
    ///
    /// Waits for any transaction holding the path.
    ///
    /// # Errors
    /// [`aide_fs::FsError::ConcurrentModification`] when `expected_etag`
    /// does not match, otherwise policy or write failures
    pub async fn save_file(
        &self,
        path: &str,
        content: &str,
        expected_etag: Option<&str>,
    ) -> Result<FileMetadata, AideError> {
        let _lock = self.engine.locks().acquire(lock_key(path)).await;
        self.workspace
            .write_file_if_match(path, content, expected_etag)
            .await?;
        Ok(self.workspace.metadata(path).await?)
    }

    /// # Errors
    /// Policy or read failures
    pub async fn file_metadata(&self, path: &str) -> Result<FileMetadata, AideError> {
        Ok(self.workspace.metadata(path).await?)
    }

    /// Tree under `path`; depth is capped at the configured maximum
    ///
    /// # Errors
    /// Policy failures or [`aide_fs::FsError::MaxDepthExceeded`]
    pub async fn file_tree(&self, path: &str, max_depth: Option<usize>) -> Result<FileTreeNode, AideError> {
        let depth = max_depth.map_or(self.max_tree_depth, |d| d.min(self.max_tree_depth));
        Ok(self.workspace.file_tree(path, depth).await?)
    }

    /// Independent read/write/delete operations
    ///
    /// Every path the batch writes or deletes is locked for its duration.
    pub async fn batch(&self, ops: &[BatchOperation]) -> Vec<BatchResult> {
        let paths = ops
            .iter()
            .filter(|op| !matches!(op, BatchOperation::Read { .. }))
            .filter_map(|op| lock_key(op.path()));
        let _locks = self.engine.locks().acquire(paths).await;
        run_batch(self.workspace.as_ref(), ops).await
    }

    // Events

    /// Subscribe to every event published from now on
    #[must_use]
    pub fn events(&self) -> Subscription {
        self.notifier.subscribe()
    }

    // Builds

    /// # Errors
    /// [`crate::BuildError::NotConfigured`] without a build command
    pub async fn trigger_build(&self, correlation_id: &CorrelationId) -> Result<BuildId, AideError> {
        Ok(self.builds.trigger(correlation_id).await?)
    }

    /// # Errors
    /// [`crate::BuildError::NotFound`]
    pub fn build_status(&self, id: BuildId) -> Result<BuildStatus, AideError> {
        self.builds
            .status(id)
            .ok_or_else(|| crate::BuildError::NotFound(id).into())
    }

    /// # Errors
    /// [`crate::BuildError::NotFound`] or [`crate::BuildError::AlreadyFinished`]
    pub fn cancel_build(&self, id: BuildId) -> Result<BuildStatus, AideError> {
        Ok(self.builds.cancel(id)?)
    }
}
