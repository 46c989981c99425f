//! Commit collection.
//!
//! Walks each repository bound to a user, brings the local clone up to
//! date, and extracts the commits that user authored inside a time
//! window. Repository failures are recorded per repository and never
//! abort the batch; an empty result is a normal outcome, not an error.
//!
//! Workflow per binding:
//! 1. Resolve the local clone path and take its operation lock.
//! 2. Validate the clone (directory + `.git` metadata), else skip.
//! 3. Pull the latest changes (when enabled), else skip on failure.
//! 4. Check out the bound branch (when set), else skip on failure.
//! 5. `git log` the window, keep exact author matches.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone};
use std::path::Path;
use std::process::Command;
use tracing::warn;

use crate::config::ReposConfig;
use crate::locator::{self, RepoLocks};
use crate::models::{Binding, CommitRecord, RepoScan, ScanOutcome};

/// Half-open commit-time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl Window {
    /// The whole calendar day `date` (`YYYY-MM-DD`) in `tz`.
    pub fn for_date(tz: FixedOffset, date: &str) -> Result<Self> {
        let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .with_context(|| format!("invalid date '{}', expected YYYY-MM-DD", date))?;
        let start = day
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_local_timezone(tz)
            .single()
            .context("could not localize window start")?;
        Ok(Self {
            start,
            end: start + Duration::days(1),
        })
    }

    /// The trailing `days` ending at `now`.
    pub fn trailing(days: i64, now: DateTime<FixedOffset>) -> Self {
        Self {
            start: now - Duration::days(days),
            end: now,
        }
    }

    /// Target date when given, trailing window otherwise.
    pub fn resolve(
        tz: FixedOffset,
        target_date: Option<&str>,
        days: i64,
        now: DateTime<FixedOffset>,
    ) -> Result<Self> {
        match target_date {
            Some(date) => Self::for_date(tz, date),
            None => Ok(Self::trailing(days, now)),
        }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start.timestamp() && timestamp < self.end.timestamp()
    }
}

/// Everything one collection pass produced.
#[derive(Debug, Default)]
pub struct Collected {
    /// Matching commits, sorted by commit time ascending across all
    /// repositories so composed reports are deterministic.
    pub commits: Vec<CommitRecord>,
    /// Per-repository outcome, in binding order.
    pub scans: Vec<RepoScan>,
}

/// Collect `username`'s commits inside `window` across all bindings.
pub async fn collect_commits(
    repos: &ReposConfig,
    locks: &RepoLocks,
    bindings: &[Binding],
    username: &str,
    window: &Window,
) -> Collected {
    let tz = window.start.timezone();
    let wanted = username.trim();
    let mut ordered: Vec<(i64, CommitRecord)> = Vec::new();
    let mut scans = Vec::with_capacity(bindings.len());

    for binding in bindings {
        let path = locator::local_path(&repos.clone_root, &binding.repo_url);
        let name = locator::repo_name(&path);
        let _guard = locks.acquire(&path).await;

        if !is_valid_git_repo(&path) {
            warn!(repo = %name, path = %path.display(), "skipping: not a valid git repository");
            scans.push(RepoScan {
                repo: name,
                outcome: ScanOutcome::Invalid,
            });
            continue;
        }

        if repos.pull {
            if let Err(e) = pull(&path) {
                warn!(repo = %name, "skipping: pull failed: {e:#}");
                scans.push(RepoScan {
                    repo: name,
                    outcome: ScanOutcome::UpdateFailed(format!("{e:#}")),
                });
                continue;
            }
        }

        if let Some(branch) = &binding.branch {
            if let Err(e) = checkout(&path, branch) {
                warn!(repo = %name, branch = %branch, "skipping: checkout failed: {e:#}");
                scans.push(RepoScan {
                    repo: name,
                    outcome: ScanOutcome::CheckoutFailed(format!("{e:#}")),
                });
                continue;
            }
        }

        let raw = match log_commits(&path, window) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(repo = %name, "skipping: git log failed: {e:#}");
                scans.push(RepoScan {
                    repo: name,
                    outcome: ScanOutcome::LogFailed(format!("{e:#}")),
                });
                continue;
            }
        };

        let branch_label = binding
            .branch
            .clone()
            .unwrap_or_else(|| "master".to_string());
        let mut matched = 0usize;

        for commit in raw {
            if commit.author.trim() != wanted {
                continue;
            }
            // git's --since/--until are advisory; re-check the half-open
            // window against the commit timestamp
            if !window.contains(commit.timestamp) {
                continue;
            }
            let Some(local) = tz.timestamp_opt(commit.timestamp, 0).single() else {
                continue;
            };
            matched += 1;
            ordered.push((
                commit.timestamp,
                CommitRecord {
                    hash: commit.hash.get(..7).unwrap_or(&commit.hash).to_string(),
                    author: commit.author,
                    date: local.format("%Y-%m-%d %H:%M").to_string(),
                    message: commit.message.trim().to_string(),
                    repo: name.clone(),
                    branch: branch_label.clone(),
                },
            ));
        }

        scans.push(RepoScan {
            repo: name,
            outcome: ScanOutcome::Collected(matched),
        });
    }

    // Stable sort: ties keep binding order
    ordered.sort_by_key(|(ts, _)| *ts);

    Collected {
        commits: ordered.into_iter().map(|(_, c)| c).collect(),
        scans,
    }
}

/// A usable local clone: a directory containing `.git` metadata.
pub fn is_valid_git_repo(path: &Path) -> bool {
    path.is_dir() && path.join(".git").exists()
}

fn run_git(repo_dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .with_context(|| format!("Failed to execute 'git {}'. Is git installed?", args[0]))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git {} failed: {}", args[0], stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn pull(repo_dir: &Path) -> Result<()> {
    run_git(repo_dir, &["pull", "--ff-only"]).map(|_| ())
}

fn checkout(repo_dir: &Path, branch: &str) -> Result<()> {
    run_git(repo_dir, &["checkout", branch]).map(|_| ())
}

struct RawCommit {
    hash: String,
    author: String,
    timestamp: i64,
    message: String,
}

/// Enumerate commits inside the window, native reverse-chronological order.
fn log_commits(repo_dir: &Path, window: &Window) -> Result<Vec<RawCommit>> {
    let since = window.start.to_rfc3339();
    let until = window.end.to_rfc3339();
    let stdout = run_git(
        repo_dir,
        &[
            "log",
            "--since",
            &since,
            "--until",
            &until,
            "--format=%H%x1f%an%x1f%ct%x1f%B%x1e",
        ],
    )?;
    Ok(parse_log_output(&stdout))
}

/// Parse `git log` output using unit separators between fields and a
/// record separator between commits (commit messages may span lines).
fn parse_log_output(raw: &str) -> Vec<RawCommit> {
    let mut commits = Vec::new();
    for record in raw.split('\u{1e}') {
        let record = record.trim_start_matches(['\n', '\r']);
        if record.trim().is_empty() {
            continue;
        }
        let mut fields = record.splitn(4, '\u{1f}');
        let (Some(hash), Some(author), Some(ts), Some(message)) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            warn!("malformed git log record, skipping");
            continue;
        };
        let Ok(timestamp) = ts.trim().parse::<i64>() else {
            warn!("unparseable commit timestamp '{}', skipping", ts.trim());
            continue;
        };
        commits.push(RawCommit {
            hash: hash.trim().to_string(),
            author: author.to_string(),
            timestamp,
            message: message.to_string(),
        });
    }
    commits
}
