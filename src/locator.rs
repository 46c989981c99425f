//! Repository location and cloning.
//!
//! Maps a remote repository URL to a deterministic path under the
//! configured clone root and makes sure a local clone exists. Path
//! derivation is pure; `ensure_cloned` is idempotent and never
//! re-clones an existing directory.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info};

use crate::models::Binding;

/// Derive the local clone path for a repository URL.
///
/// The final path segment of the URL, minus a trailing `.git`, joined
/// under `clone_root`. Same URL always yields the same path.
pub fn local_path(clone_root: &Path, repo_url: &str) -> PathBuf {
    let name = repo_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(repo_url);
    let name = name.strip_suffix(".git").unwrap_or(name);
    clone_root.join(name)
}

/// Repository basename used to label commit records.
pub fn repo_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Clone `repo_url` into `dest` unless the directory already exists.
///
/// Returns `true` if a clone was performed, `false` if the path was
/// already present. Calling this twice with the same URL results in
/// exactly one clone and no error on the second call.
pub fn ensure_cloned(repo_url: &str, dest: &Path) -> Result<bool> {
    if dest.exists() {
        return Ok(false);
    }

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create clone root: {}", parent.display()))?;
    }

    let output = Command::new("git")
        .arg("clone")
        .arg(repo_url)
        .arg(dest)
        .output()
        .with_context(|| "Failed to execute 'git clone'. Is git installed?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git clone failed: {}", stderr.trim());
    }

    Ok(true)
}

/// Ensure clones exist for every binding.
///
/// One failed clone is logged and reported in the result; it does not
/// abort the rest of the batch.
pub fn clone_all(clone_root: &Path, bindings: &[Binding]) -> Vec<(String, bool)> {
    let mut results = Vec::with_capacity(bindings.len());
    for binding in bindings {
        let dest = local_path(clone_root, &binding.repo_url);
        match ensure_cloned(&binding.repo_url, &dest) {
            Ok(true) => {
                info!(repo = %binding.repo_url, path = %dest.display(), "cloned repository");
                results.push((binding.repo_url.clone(), true));
            }
            Ok(false) => {
                results.push((binding.repo_url.clone(), true));
            }
            Err(e) => {
                error!(repo = %binding.repo_url, "clone failed: {e:#}");
                results.push((binding.repo_url.clone(), false));
            }
        }
    }
    results
}

/// One in-flight git operation per local clone path.
///
/// Local clones are shared mutable on-disk state; two pipeline runs
/// touching the same clone concurrently would corrupt each other's
/// checkout. The registry is owned by the composition root and passed
/// into each pipeline invocation.
#[derive(Default)]
pub struct RepoLocks {
    inner: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl RepoLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `path`, waiting if another operation on the
    /// same clone is in flight.
    pub async fn acquire(&self, path: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
