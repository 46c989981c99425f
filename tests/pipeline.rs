//! Pipeline tests against real (temporary) git repositories, with the
//! text-generation provider stubbed out.

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

use git_recap::collector::{self, Window};
use git_recap::composer::{GENERATION_FALLBACK, NO_COMMITS_SENTINEL};
use git_recap::config::Config;
use git_recap::locator::RepoLocks;
use git_recap::models::ScanOutcome;
use git_recap::provider::TextGenerator;
use git_recap::{db, migrate, pipeline, store};

struct StubGenerator {
    reply: String,
    calls: AtomicUsize,
}

impl StubGenerator {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TextGenerator for StubGenerator {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    fn model_name(&self) -> &str {
        "failing-stub"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        anyhow::bail!("connection refused")
    }
}

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn init_repo(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    git(dir, &["init", "--quiet"]);
}

fn commit(dir: &Path, author: &str, date: &str, message: &str) {
    let email = format!("{}@example.com", author);
    let output = Command::new("git")
        .args(["commit", "--quiet", "--allow-empty", "-m", message])
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", author)
        .env("GIT_AUTHOR_EMAIL", &email)
        .env("GIT_COMMITTER_NAME", author)
        .env("GIT_COMMITTER_EMAIL", &email)
        .env("GIT_AUTHOR_DATE", date)
        .env("GIT_COMMITTER_DATE", date)
        .output()
        .expect("failed to run git commit");
    assert!(
        output.status.success(),
        "commit failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Test sandbox: a clone root with one repository named `widget`, a
/// migrated database, and pulling disabled (no remotes involved).
struct Sandbox {
    _tmp: TempDir,
    config: Config,
    repo_dir: PathBuf,
}

const WIDGET_URL: &str = "https://example.com/team/widget.git";

impl Sandbox {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();

        let mut config = Config::default();
        config.db.path = root.join("data/recap.sqlite");
        config.repos.clone_root = root.join("clones");
        config.repos.pull = false;
        config.reports.output_dir = root.join("reports");
        config.reports.prompt_path = root.join("prompt.txt");

        let repo_dir = root.join("clones/widget");
        init_repo(&repo_dir);

        Self {
            _tmp: tmp,
            config,
            repo_dir,
        }
    }
}

#[tokio::test]
async fn collector_filters_by_author_and_window() {
    let sandbox = Sandbox::new();
    let repo = &sandbox.repo_dir;

    commit(repo, "alice", "2024-05-01T10:00:00+08:00", "Fix pagination");
    commit(repo, "bob", "2024-05-01T10:30:00+08:00", "Refactor parser");
    commit(repo, "alice", "2024-05-01T11:00:00+08:00", "Add retry logic");
    // Window end is exclusive: midnight of the next day is out
    commit(repo, "alice", "2024-05-02T00:00:00+08:00", "Next day work");

    let tz = sandbox.config.reports.timezone().unwrap();
    let window = Window::for_date(tz, "2024-05-01").unwrap();
    let bindings = vec![git_recap::models::Binding {
        username: "alice".to_string(),
        repo_url: WIDGET_URL.to_string(),
        branch: None,
    }];
    let locks = RepoLocks::new();

    let collected =
        collector::collect_commits(&sandbox.config.repos, &locks, &bindings, "alice", &window)
            .await;

    assert_eq!(collected.commits.len(), 2);
    for record in &collected.commits {
        assert_eq!(record.author, "alice");
        assert_eq!(record.repo, "widget");
        assert_eq!(record.branch, "master");
        assert_eq!(record.hash.len(), 7);
    }
    // Sorted by commit time ascending
    assert_eq!(collected.commits[0].message, "Fix pagination");
    assert_eq!(collected.commits[1].message, "Add retry logic");
    assert_eq!(collected.commits[0].date, "2024-05-01 10:00");

    assert_eq!(collected.scans.len(), 1);
    assert!(matches!(
        collected.scans[0].outcome,
        ScanOutcome::Collected(2)
    ));
}

#[tokio::test]
async fn collector_skips_invalid_repo() {
    let sandbox = Sandbox::new();

    let tz = sandbox.config.reports.timezone().unwrap();
    let window = Window::for_date(tz, "2024-05-01").unwrap();
    let bindings = vec![git_recap::models::Binding {
        username: "alice".to_string(),
        repo_url: "https://example.com/team/missing.git".to_string(),
        branch: None,
    }];
    let locks = RepoLocks::new();

    let collected =
        collector::collect_commits(&sandbox.config.repos, &locks, &bindings, "alice", &window)
            .await;

    assert!(collected.commits.is_empty());
    assert_eq!(collected.scans.len(), 1);
    assert!(matches!(collected.scans[0].outcome, ScanOutcome::Invalid));
}

#[tokio::test]
async fn pipeline_persists_generated_report() {
    let sandbox = Sandbox::new();
    commit(
        &sandbox.repo_dir,
        "alice",
        "2024-05-01T10:00:00+08:00",
        "Fix pagination",
    );

    migrate::run_migrations(&sandbox.config).await.unwrap();
    let pool = db::connect(&sandbox.config).await.unwrap();
    store::upsert_binding(&pool, "alice", WIDGET_URL, None)
        .await
        .unwrap();

    let locks = RepoLocks::new();
    let stub = StubGenerator::new("Worked on pagination fixes.");

    let outcome = pipeline::generate_report(
        &sandbox.config,
        &pool,
        &locks,
        &stub,
        "alice",
        Some("2024-05-01"),
        None,
    )
    .await
    .unwrap();

    assert_eq!(outcome.date, "2024-05-01");
    assert_eq!(outcome.commits, 1);
    assert_eq!(stub.calls.load(Ordering::SeqCst), 1);

    let report = store::get_report(&pool, "alice", "2024-05-01")
        .await
        .unwrap()
        .expect("report row missing");
    assert_eq!(report.content, "Worked on pagination fixes.");
    let commit_log = report.commit_log.unwrap();
    assert!(commit_log.contains("Fix pagination"));
    assert!(commit_log.contains("[widget]"));

    // Mirror file written alongside the database row
    let mirror = std::fs::read_to_string(
        sandbox.config.reports.output_dir.join("2024-05.txt"),
    )
    .unwrap();
    assert!(mirror.contains("## 2024-05-01"));
    assert!(mirror.contains("Worked on pagination fixes."));

    pool.close().await;
}

#[tokio::test]
async fn pipeline_regeneration_overwrites_in_place() {
    let sandbox = Sandbox::new();
    commit(
        &sandbox.repo_dir,
        "alice",
        "2024-05-01T10:00:00+08:00",
        "Fix pagination",
    );

    migrate::run_migrations(&sandbox.config).await.unwrap();
    let pool = db::connect(&sandbox.config).await.unwrap();
    store::upsert_binding(&pool, "alice", WIDGET_URL, None)
        .await
        .unwrap();
    let locks = RepoLocks::new();

    let first = StubGenerator::new("first draft");
    pipeline::generate_report(
        &sandbox.config,
        &pool,
        &locks,
        &first,
        "alice",
        Some("2024-05-01"),
        None,
    )
    .await
    .unwrap();

    let second = StubGenerator::new("second draft");
    pipeline::generate_report(
        &sandbox.config,
        &pool,
        &locks,
        &second,
        "alice",
        Some("2024-05-01"),
        None,
    )
    .await
    .unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reports")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    let report = store::get_report(&pool, "alice", "2024-05-01")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.content, "second draft");

    pool.close().await;
}

#[tokio::test]
async fn pipeline_empty_window_stores_sentinel_without_provider_call() {
    let sandbox = Sandbox::new();
    // Repository exists but has no commits in the window
    commit(
        &sandbox.repo_dir,
        "alice",
        "2024-04-01T10:00:00+08:00",
        "Old work",
    );

    migrate::run_migrations(&sandbox.config).await.unwrap();
    let pool = db::connect(&sandbox.config).await.unwrap();
    store::upsert_binding(&pool, "alice", WIDGET_URL, None)
        .await
        .unwrap();
    let locks = RepoLocks::new();
    let stub = StubGenerator::new("should not be called");

    let outcome = pipeline::generate_report(
        &sandbox.config,
        &pool,
        &locks,
        &stub,
        "alice",
        Some("2024-05-01"),
        None,
    )
    .await
    .unwrap();

    assert_eq!(outcome.commits, 0);
    assert_eq!(stub.calls.load(Ordering::SeqCst), 0);

    let report = store::get_report(&pool, "alice", "2024-05-01")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.content, NO_COMMITS_SENTINEL);

    pool.close().await;
}

#[tokio::test]
async fn pipeline_provider_failure_degrades_but_persists() {
    let sandbox = Sandbox::new();
    commit(
        &sandbox.repo_dir,
        "alice",
        "2024-05-01T10:00:00+08:00",
        "Fix pagination",
    );

    migrate::run_migrations(&sandbox.config).await.unwrap();
    let pool = db::connect(&sandbox.config).await.unwrap();
    store::upsert_binding(&pool, "alice", WIDGET_URL, None)
        .await
        .unwrap();
    let locks = RepoLocks::new();

    let outcome = pipeline::generate_report(
        &sandbox.config,
        &pool,
        &locks,
        &FailingGenerator,
        "alice",
        Some("2024-05-01"),
        None,
    )
    .await
    .unwrap();

    assert_eq!(outcome.commits, 1);

    let report = store::get_report(&pool, "alice", "2024-05-01")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.content, GENERATION_FALLBACK);

    pool.close().await;
}

#[tokio::test]
async fn store_upsert_is_idempotent_per_user_and_date() {
    let sandbox = Sandbox::new();
    migrate::run_migrations(&sandbox.config).await.unwrap();
    let pool = db::connect(&sandbox.config).await.unwrap();

    store::upsert_report(&pool, "alice", "2024-05-01", "v1", "- [abc] x")
        .await
        .unwrap();
    store::upsert_report(&pool, "alice", "2024-05-01", "v2", "- [def] y")
        .await
        .unwrap();
    // Different user, same date: its own row
    store::upsert_report(&pool, "bob", "2024-05-01", "bob v1", "")
        .await
        .unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reports")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 2);

    let report = store::get_report(&pool, "alice", "2024-05-01")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.content, "v2");
    // Overwrite touches content only
    assert_eq!(report.commit_log.as_deref(), Some("- [abc] x"));

    pool.close().await;
}

#[tokio::test]
async fn binding_upsert_updates_branch() {
    let sandbox = Sandbox::new();
    migrate::run_migrations(&sandbox.config).await.unwrap();
    let pool = db::connect(&sandbox.config).await.unwrap();

    store::upsert_binding(&pool, "alice", WIDGET_URL, None)
        .await
        .unwrap();
    store::upsert_binding(&pool, "alice", WIDGET_URL, Some("develop"))
        .await
        .unwrap();
    // Rebinding without a branch keeps the previous one
    store::upsert_binding(&pool, "alice", WIDGET_URL, None)
        .await
        .unwrap();

    let bindings = store::list_bindings(&pool, "alice").await.unwrap();
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].branch.as_deref(), Some("develop"));

    let usernames = store::list_usernames(&pool).await.unwrap();
    assert_eq!(usernames, vec!["alice"]);

    pool.close().await;
}
