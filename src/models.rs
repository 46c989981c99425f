//! Core data types used throughout the report pipeline.

use serde::Serialize;

/// A user's subscription to a git repository.
///
/// (username, repo_url) is the natural key; rebinding the same pair
/// updates the branch. When `branch` is unset the repository's default
/// branch is used as checked out.
#[derive(Debug, Clone, Serialize)]
pub struct Binding {
    pub username: String,
    pub repo_url: String,
    pub branch: Option<String>,
}

/// A stored daily report, unique per (username, date).
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub id: i64,
    pub username: String,
    /// `YYYY-MM-DD`.
    pub date: String,
    pub content: String,
    /// The rendered commit log the content was generated from.
    pub commit_log: Option<String>,
}

/// One commit's metadata, extracted for inclusion in a report.
///
/// Transient: produced by the collector, folded into the report's
/// commit-log text by the composer, never persisted individually.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    /// First 7 hex characters of the full hash.
    pub hash: String,
    pub author: String,
    /// Localized `%Y-%m-%d %H:%M` in the configured offset.
    pub date: String,
    pub message: String,
    /// Repository basename.
    pub repo: String,
    /// Bound branch, or "master" when unset.
    pub branch: String,
}

/// Per-repository outcome of a collection pass.
///
/// Repository failures never abort the batch; they are recorded here so
/// callers can observe which repositories were skipped and why.
#[derive(Debug, Clone, Serialize)]
pub struct RepoScan {
    pub repo: String,
    pub outcome: ScanOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum ScanOutcome {
    /// Repository scanned; number of matching commits collected.
    Collected(usize),
    /// Not a usable local git repository.
    Invalid,
    UpdateFailed(String),
    CheckoutFailed(String),
    LogFailed(String),
}

impl std::fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanOutcome::Collected(n) => write!(f, "collected {} commits", n),
            ScanOutcome::Invalid => write!(f, "not a valid git repository"),
            ScanOutcome::UpdateFailed(e) => write!(f, "update failed: {}", e),
            ScanOutcome::CheckoutFailed(e) => write!(f, "checkout failed: {}", e),
            ScanOutcome::LogFailed(e) => write!(f, "log failed: {}", e),
        }
    }
}
