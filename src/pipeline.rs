//! The report pipeline: collect → compose → persist.
//!
//! One invocation generates (or regenerates) a single user's report for
//! a single date. Repository and provider failures degrade per the
//! component contracts; only a persistence failure propagates.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::collector::{self, Window};
use crate::composer;
use crate::config::Config;
use crate::locator::RepoLocks;
use crate::mirror;
use crate::models::RepoScan;
use crate::provider::TextGenerator;
use crate::store;

#[derive(Debug, Serialize)]
pub struct GenerateOutcome {
    pub username: String,
    /// Report key date, `YYYY-MM-DD`.
    pub date: String,
    /// Commits that made it into the report.
    pub commits: usize,
    /// Per-repository collection outcomes.
    pub scans: Vec<RepoScan>,
}

/// Generate and persist the report for `username`.
///
/// With a `target_date` the window is that whole day; otherwise it is
/// the trailing configured window ending now, and the report is keyed
/// on today's date. `window_days` overrides the configured trailing
/// window length when set.
pub async fn generate_report(
    config: &Config,
    pool: &SqlitePool,
    locks: &RepoLocks,
    generator: &dyn TextGenerator,
    username: &str,
    target_date: Option<&str>,
    window_days: Option<i64>,
) -> Result<GenerateOutcome> {
    let tz = config.reports.timezone()?;
    let now = Utc::now().with_timezone(&tz);
    let days = window_days.unwrap_or(config.reports.window_days);
    let window = Window::resolve(tz, target_date, days, now)?;

    let report_date = match target_date {
        Some(date) => date.to_string(),
        None => now.format("%Y-%m-%d").to_string(),
    };

    let bindings = store::list_bindings(pool, username).await?;
    if bindings.is_empty() {
        warn!(user = %username, "no repositories bound; report will be empty");
    }

    let collected =
        collector::collect_commits(&config.repos, locks, &bindings, username, &window).await;

    for scan in &collected.scans {
        info!(user = %username, repo = %scan.repo, "{}", scan.outcome);
    }

    let commit_log = composer::render_commit_log(&collected.commits);
    let content =
        composer::compose_report(&config.reports.prompt_path, generator, &collected.commits).await;

    store::upsert_report(pool, username, &report_date, &content, &commit_log)
        .await
        .with_context(|| format!("persisting report for {} on {}", username, report_date))?;

    // Mirror is best-effort; the stored row is authoritative
    if let Err(e) = mirror::mirror_report(&config.reports.output_dir, &report_date, &content) {
        warn!(user = %username, "report mirror failed: {e:#}");
    }

    info!(
        user = %username,
        date = %report_date,
        commits = collected.commits.len(),
        "report persisted"
    );

    Ok(GenerateOutcome {
        username: username.to_string(),
        date: report_date,
        commits: collected.commits.len(),
        scans: collected.scans,
    })
}
