//! Temp-file-then-rename writes
//!
//! Content is written to a uniquely named sibling, synced, then renamed over
//! the target so a concurrent reader observes either the old bytes or the new
//! bytes, never a prefix.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Suffix of in-flight temp files
pub const TEMP_SUFFIX: &str = ".aide-tmp";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Removes a temp file on drop unless disarmed
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Sibling temp path `.<name>.<pid>.<counter>.aide-tmp`
pub(crate) fn temp_sibling(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map_or_else(|| "file".to_string(), |n| n.to_string_lossy().into_owned());
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    target.with_file_name(format!(".{name}.{}.{n}{TEMP_SUFFIX}", std::process::id()))
}

/// Atomically replace `target` with `contents`
///
/// Parent directories are created as needed. Permissions of an existing
/// target are carried over to the replacement.
pub(crate) async fn write_atomic(target: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await?;
    }

    let tmp = temp_sibling(target);
    let mut guard = TempFileGuard::new(tmp.clone());

    {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
    }

    if let Ok(existing) = fs::metadata(target).await {
        if existing.is_file() {
            fs::set_permissions(&tmp, existing.permissions()).await?;
        }
    }

    fs::rename(&tmp, target).await?;
    guard.disarm();
    Ok(())
}
