//! Testing utilities for the AIDE workspace
//!
//! Shared fixtures: sandboxed temp workspaces, plan/step builders and a
//! fault-injecting filesystem for exercising mid-apply failures.

#![allow(missing_docs)]

use aide_fs::{FileSystem, FsError, PathPolicy, Workspace, TEMP_SUFFIX};
use aide_types::{FileChange, FileMetadata, Plan, Step, StepCategory};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Temp directory opened as a workspace with the default policy
#[derive(Debug)]
pub struct TestWorkspace {
    dir: TempDir,
    workspace: Arc<Workspace>,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self::with_policy(PathPolicy::default())
    }

    pub fn with_policy(policy: PathPolicy) -> Self {
        let dir = TempDir::new().unwrap();
        let workspace = Arc::new(Workspace::open(dir.path(), policy).unwrap());
        Self { dir, workspace }
    }

    /// Write a file directly, bypassing the policy
    pub fn seed(&self, rel: &str, content: &str) -> &Self {
        let abs = self.abs(rel);
        if let Some(parent) = abs.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(abs, content).unwrap();
        self
    }

    /// Write raw bytes directly, bypassing the policy
    pub fn seed_bytes(&self, rel: &str, content: &[u8]) -> &Self {
        let abs = self.abs(rel);
        if let Some(parent) = abs.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(abs, content).unwrap();
        self
    }

    /// Raw bytes of a file; `None` if missing
    pub fn read_bytes(&self, rel: &str) -> Option<Vec<u8>> {
        std::fs::read(self.abs(rel)).ok()
    }

    /// Read a file directly; `None` if missing
    pub fn read(&self, rel: &str) -> Option<String> {
        std::fs::read_to_string(self.abs(rel)).ok()
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.abs(rel).exists()
    }

    pub fn root(&self) -> &Path {
        self.workspace.root()
    }

    pub fn abs(&self, rel: &str) -> PathBuf {
        self.workspace.root().join(rel)
    }

    pub fn workspace(&self) -> Arc<Workspace> {
        Arc::clone(&self.workspace)
    }

    pub fn fs(&self) -> Arc<dyn FileSystem> {
        self.workspace.clone()
    }

    /// Every regular file under the root, keyed by relative path
    ///
    /// Used to compare full workspace state before and after an operation.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        collect(self.root(), self.root(), &mut out);
        out
    }

    /// Leftover temp files from atomic writes
    pub fn temp_files(&self) -> Vec<String> {
        self.snapshot()
            .into_keys()
            .filter(|k| k.ends_with(TEMP_SUFFIX))
            .collect()
    }

    pub fn dir(&self) -> &TempDir {
        &self.dir
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

fn collect(root: &Path, dir: &Path, out: &mut BTreeMap<String, String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        if path.is_dir() {
            collect(root, &path, out);
        } else if let Ok(content) = std::fs::read_to_string(&path) {
            let rel = path
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            out.insert(rel, content);
        }
    }
}

/// Operation kinds that [`FaultyFs`] can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOp {
    Read,
    Write,
    Delete,
    Rename,
}

/// Wraps a filesystem and fails chosen operations on chosen paths
#[derive(Debug)]
pub struct FaultyFs {
    inner: Arc<dyn FileSystem>,
    faults: Mutex<Vec<(FaultOp, String)>>,
    mutations: AtomicUsize,
}

impl FaultyFs {
    pub fn new(inner: Arc<dyn FileSystem>) -> Self {
        Self {
            inner,
            faults: Mutex::new(Vec::new()),
            mutations: AtomicUsize::new(0),
        }
    }

    /// Fail every `op` whose (source) path equals `path`
    pub fn fail_on(self, op: FaultOp, path: &str) -> Self {
        self.faults.lock().push((op, path.to_string()));
        self
    }

    /// Remove all injected faults
    pub fn heal(&self) {
        self.faults.lock().clear();
    }

    /// Successful writes, deletes and renames so far
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    fn tripped(&self, op: FaultOp, path: &str) -> bool {
        self.faults.lock().iter().any(|(o, p)| *o == op && p == path)
    }

    fn injected() -> io::Error {
        io::Error::other("injected fault")
    }

    fn mutated<T>(&self, result: Result<T, FsError>) -> Result<T, FsError> {
        if result.is_ok() {
            self.mutations.fetch_add(1, Ordering::SeqCst);
        }
        result
    }
}

#[async_trait]
impl FileSystem for FaultyFs {
    fn is_allowed(&self, path: &str) -> bool {
        self.inner.is_allowed(path)
    }

    async fn exists(&self, path: &str) -> bool {
        self.inner.exists(path).await
    }

    async fn read_file(&self, path: &str) -> Result<String, FsError> {
        if self.tripped(FaultOp::Read, path) {
            return Err(FsError::read_failed(path, Self::injected()));
        }
        self.inner.read_file(path).await
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), FsError> {
        if self.tripped(FaultOp::Write, path) {
            return Err(FsError::write_failed(path, Self::injected()));
        }
        let result = self.inner.write_file(path, content).await;
        self.mutated(result)
    }

    async fn read_bytes(&self, path: &str) -> Result<Vec<u8>, FsError> {
        if self.tripped(FaultOp::Read, path) {
            return Err(FsError::read_failed(path, Self::injected()));
        }
        self.inner.read_bytes(path).await
    }

    async fn write_bytes(&self, path: &str, content: &[u8]) -> Result<(), FsError> {
        if self.tripped(FaultOp::Write, path) {
            return Err(FsError::write_failed(path, Self::injected()));
        }
        let result = self.inner.write_bytes(path, content).await;
        self.mutated(result)
    }

    async fn delete_file(&self, path: &str) -> Result<(), FsError> {
        if self.tripped(FaultOp::Delete, path) {
            return Err(FsError::delete_failed(path, Self::injected()));
        }
        let result = self.inner.delete_file(path).await;
        self.mutated(result)
    }

    async fn rename_file(&self, from: &str, to: &str) -> Result<(), FsError> {
        if self.tripped(FaultOp::Rename, from) {
            return Err(FsError::rename_failed(from, to, Self::injected()));
        }
        let result = self.inner.rename_file(from, to).await;
        self.mutated(result)
    }

    async fn metadata(&self, path: &str) -> Result<FileMetadata, FsError> {
        self.inner.metadata(path).await
    }
}

/// Plan with the given changes and no steps
pub fn plan_with_changes(id: &str, changes: Vec<FileChange>) -> Plan {
    Plan::new(id, format!("test plan {id}")).with_changes(changes)
}

/// Step depending on `deps`
pub fn step(id: &str, deps: &[&str]) -> Step {
    Step::new(id, StepCategory::Modify).depends_on(deps.iter().copied())
}

/// `s0 <- s1 <- ... <- s{n-1}` chain; with `close` the first also depends on the last
pub fn chain_steps(n: usize, close: bool) -> Vec<Step> {
    (0..n)
        .map(|i| {
            let deps = match (i, close) {
                (0, true) if n > 0 => vec![format!("s{}", n - 1)],
                (0, _) => Vec::new(),
                _ => vec![format!("s{}", i - 1)],
            };
            Step::new(format!("s{i}"), StepCategory::Generate).depends_on(deps)
        })
        .collect()
}
