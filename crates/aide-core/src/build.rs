//! Build queue
//!
//! Runs the configured build command, one process at a time. Triggers that
//! arrive within the debounce window opened by the first queued trigger (or
//! while a build is running) are coalesced into the next run, and every id
//! of a run shares its status. Each state change is published as
//! `build.status`. Finished statuses are dropped once older than the
//! configured retention.

use crate::config::BuildConfig;
use aide_events::{BuildState, EventNotifier, EventPayload};
use aide_types::{BuildId, CorrelationId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::counter;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Note recorded on builds cancelled through [`BuildManager::cancel`]
pub const CANCELLED_NOTE: &str = "cancelled by user";

/// Build failures
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no build command configured")]
    NotConfigured,

    #[error("build {0} not found")]
    NotFound(BuildId),

    #[error("build {0} has already finished")]
    AlreadyFinished(BuildId),

    #[error("failed to start build command {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("build process failed: {0}")]
    Wait(#[source] std::io::Error),
}

/// Status of one build request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStatus {
    pub id: BuildId,
    pub state: BuildState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Tail of the combined stdout and stderr
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub correlation_id: CorrelationId,
    pub queued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl BuildStatus {
    fn queued(id: BuildId, correlation_id: CorrelationId) -> Self {
        Self {
            id,
            state: BuildState::Queued,
            exit_code: None,
            output: String::new(),
            note: None,
            correlation_id,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }
}

#[derive(Debug)]
struct ActiveRun {
    ids: Vec<BuildId>,
    cancel: Option<oneshot::Sender<()>>,
}

enum RunOutcome {
    Finished {
        exit_code: Option<i32>,
        success: bool,
        output: String,
    },
    Error(BuildError),
    Cancelled,
}

#[derive(Debug)]
struct Shared {
    config: BuildConfig,
    working_dir: PathBuf,
    notifier: Arc<EventNotifier>,
    statuses: DashMap<BuildId, BuildStatus>,
    running: Mutex<Option<ActiveRun>>,
}

impl Shared {
    /// Drop finished statuses older than the retention period
    fn prune(&self) {
        let Ok(retention) = chrono::Duration::from_std(self.config.retention()) else {
            return;
        };
        let cutoff = Utc::now() - retention;
        let before = self.statuses.len();
        self.statuses
            .retain(|_, s| !s.state.is_terminal() || s.finished_at.map_or(true, |at| at > cutoff));
        let pruned = before.saturating_sub(self.statuses.len());
        if pruned > 0 {
            debug!(pruned, "finished builds pruned");
        }
    }

    fn state_of(&self, id: BuildId) -> Option<BuildState> {
        self.statuses.get(&id).map(|s| s.state)
    }

    /// Update every id currently in `from`, then announce the changes
    fn set(&self, ids: &[BuildId], from: BuildState, update: impl Fn(&mut BuildStatus)) {
        let mut changed = Vec::new();
        for id in ids {
            if let Some(mut status) = self.statuses.get_mut(id) {
                if status.state == from {
                    update(&mut status);
                    changed.push(status.clone());
                }
            }
        }
        for status in &changed {
            self.announce(status);
        }
    }

    fn announce(&self, status: &BuildStatus) {
        if status.state.is_terminal() {
            counter!("aide_builds_total", "state" => status.state.as_str()).increment(1);
        }
        self.notifier.emit(
            &status.correlation_id,
            EventPayload::BuildStatus {
                build_id: status.id,
                state: status.state,
                exit_code: status.exit_code,
                note: status.note.clone(),
            },
        );
    }

    async fn run(&self, batch: Vec<BuildId>) {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let ids = {
            let mut running = self.running.lock();
            let ids: Vec<BuildId> = batch
                .into_iter()
                .filter(|id| self.state_of(*id) == Some(BuildState::Queued))
                .collect();
            if ids.is_empty() {
                return;
            }
            let now = Utc::now();
            self.set(&ids, BuildState::Queued, |s| {
                s.state = BuildState::Running;
                s.started_at = Some(now);
            });
            *running = Some(ActiveRun {
                ids: ids.clone(),
                cancel: Some(cancel_tx),
            });
            ids
        };
        info!(builds = ids.len(), "build started");

        let outcome = self.execute(cancel_rx).await;

        let mut running = self.running.lock();
        running.take();
        let now = Utc::now();
        match outcome {
            RunOutcome::Finished {
                exit_code,
                success,
                output,
            } => {
                info!(?exit_code, success, "build finished");
                self.set(&ids, BuildState::Running, |s| {
                    s.state = if success {
                        BuildState::Succeeded
                    } else {
                        BuildState::Failed
                    };
                    s.exit_code = exit_code;
                    s.output.clone_from(&output);
                    s.finished_at = Some(now);
                });
            }
            RunOutcome::Error(err) => {
                warn!(error = %err, "build process error");
                let note = err.to_string();
                self.set(&ids, BuildState::Running, |s| {
                    s.state = BuildState::Failed;
                    s.note = Some(note.clone());
                    s.finished_at = Some(now);
                });
            }
            RunOutcome::Cancelled => debug!("build process killed"),
        }
    }

    async fn execute(&self, cancel: oneshot::Receiver<()>) -> RunOutcome {
        let Some(program) = self.config.program.as_deref() else {
            return RunOutcome::Error(BuildError::NotConfigured);
        };

        let mut cmd = Command::new(program);
        cmd.args(&self.config.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                return RunOutcome::Error(BuildError::Spawn {
                    program: program.to_string(),
                    source,
                })
            }
        };

        // Dropping the wait future kills the child.
        tokio::select! {
            result = child.wait_with_output() => match result {
                Ok(output) => {
                    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                    text.push_str(&String::from_utf8_lossy(&output.stderr));
                    RunOutcome::Finished {
                        exit_code: output.status.code(),
                        success: output.status.success(),
                        output: tail(text, self.config.output_limit),
                    }
                }
                Err(source) => RunOutcome::Error(BuildError::Wait(source)),
            },
            _ = cancel => RunOutcome::Cancelled,
        }
    }
}

async fn worker(shared: Arc<Shared>, mut queue: mpsc::UnboundedReceiver<BuildId>) {
    let debounce = shared.config.debounce();
    while let Some(first) = queue.recv().await {
        let deadline = tokio::time::Instant::now() + debounce;
        let mut batch = vec![first];
        while let Ok(Some(next)) = tokio::time::timeout_at(deadline, queue.recv()).await {
            batch.push(next);
        }
        debug!(coalesced = batch.len(), "build batch ready");
        shared.run(batch).await;
    }
    debug!("build worker stopped");
}

/// Keep the last `limit` bytes, on a character boundary
fn tail(mut text: String, limit: usize) -> String {
    if text.len() <= limit {
        return text;
    }
    let mut start = text.len() - limit;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text.split_off(start)
}

/// Debounced, serialized build runner
#[derive(Debug)]
pub struct BuildManager {
    shared: Arc<Shared>,
    queue: Mutex<Option<mpsc::UnboundedSender<BuildId>>>,
}

impl BuildManager {
    /// Runner executing `config.program` from `working_dir`
    #[must_use]
    pub fn new(config: BuildConfig, working_dir: impl Into<PathBuf>, notifier: Arc<EventNotifier>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                working_dir: working_dir.into(),
                notifier,
                statuses: DashMap::new(),
                running: Mutex::new(None),
            }),
            queue: Mutex::new(None),
        }
    }

    /// Whether a build command is configured
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.shared.config.program.is_some()
    }

    /// Queue a build and return its id
    ///
    /// The first trigger starts the background worker on the current Tokio
    /// runtime.
    ///
    /// # Errors
    /// [`BuildError::NotConfigured`] without a build command
    pub async fn trigger(&self, correlation_id: &CorrelationId) -> Result<BuildId, BuildError> {
        if !self.is_enabled() {
            return Err(BuildError::NotConfigured);
        }
        self.shared.prune();
        let id = BuildId::new();
        let status = BuildStatus::queued(id, correlation_id.clone());
        self.shared.statuses.insert(id, status.clone());
        self.shared.announce(&status);

        let mut queue = self.queue.lock();
        let sent = queue.as_ref().is_some_and(|tx| tx.send(id).is_ok());
        if !sent {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(worker(Arc::clone(&self.shared), rx));
            if tx.send(id).is_err() {
                warn!(%id, "build worker unavailable");
            }
            *queue = Some(tx);
        }
        debug!(%id, "build queued");
        Ok(id)
    }

    /// Current status of a build
    #[must_use]
    pub fn status(&self, id: BuildId) -> Option<BuildStatus> {
        self.shared.statuses.get(&id).map(|s| s.clone())
    }

    /// All known builds, oldest first
    #[must_use]
    pub fn list(&self) -> Vec<BuildStatus> {
        let mut all: Vec<BuildStatus> = self.shared.statuses.iter().map(|s| s.clone()).collect();
        all.sort_by(|a, b| a.queued_at.cmp(&b.queued_at).then(a.id.cmp(&b.id)));
        all
    }

    /// Cancel a queued or running build
    ///
    /// Cancelling a running build kills its process and fails every id
    /// coalesced into that run.
    ///
    /// # Errors
    /// [`BuildError::NotFound`] or [`BuildError::AlreadyFinished`]
    pub fn cancel(&self, id: BuildId) -> Result<BuildStatus, BuildError> {
        {
            let mut running = self.shared.running.lock();
            let state = self.shared.state_of(id).ok_or(BuildError::NotFound(id))?;
            let now = Utc::now();
            let cancelled = |s: &mut BuildStatus| {
                s.state = BuildState::Failed;
                s.note = Some(CANCELLED_NOTE.to_string());
                s.finished_at = Some(now);
            };

            match state {
                BuildState::Queued => self.shared.set(&[id], BuildState::Queued, cancelled),
                BuildState::Running => {
                    let ids = match running.as_mut() {
                        Some(run) if run.ids.contains(&id) => {
                            if let Some(tx) = run.cancel.take() {
                                let _ = tx.send(());
                            }
                            run.ids.clone()
                        }
                        _ => vec![id],
                    };
                    self.shared.set(&ids, BuildState::Running, cancelled);
                }
                BuildState::Succeeded | BuildState::Failed => {
                    return Err(BuildError::AlreadyFinished(id));
                }
            }
        }
        info!(%id, "build cancelled");
        self.status(id).ok_or(BuildError::NotFound(id))
    }
}
