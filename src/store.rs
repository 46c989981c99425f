//! Report and binding persistence.
//!
//! The report upsert is the one place in the pipeline where failure is
//! fatal to the caller: a silently lost report would be undetectable,
//! so persistence errors always propagate.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::models::{Binding, Report};

/// Insert or overwrite the report for (username, date).
///
/// The lookup and write happen inside one transaction so concurrent
/// writers cannot produce duplicate rows. An existing row keeps its
/// original commit_log; only `content` is overwritten.
pub async fn upsert_report(
    pool: &SqlitePool,
    username: &str,
    date: &str,
    content: &str,
    commit_log: &str,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM reports WHERE username = ? AND date = ?")
            .bind(username)
            .bind(date)
            .fetch_optional(&mut *tx)
            .await?;

    match existing {
        Some(id) => {
            sqlx::query("UPDATE reports SET content = ? WHERE id = ?")
                .bind(content)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        None => {
            sqlx::query(
                "INSERT INTO reports (username, date, content, commit_log) VALUES (?, ?, ?, ?)",
            )
            .bind(username)
            .bind(date)
            .bind(content)
            .bind(commit_log)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

pub async fn get_report(pool: &SqlitePool, username: &str, date: &str) -> Result<Option<Report>> {
    let row = sqlx::query(
        "SELECT id, username, date, content, commit_log FROM reports \
         WHERE username = ? AND date = ?",
    )
    .bind(username)
    .bind(date)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| Report {
        id: row.get("id"),
        username: row.get("username"),
        date: row.get("date"),
        content: row.get("content"),
        commit_log: row.get("commit_log"),
    }))
}

/// All of a user's reports, newest first.
pub async fn list_reports(pool: &SqlitePool, username: &str) -> Result<Vec<Report>> {
    let rows = sqlx::query(
        "SELECT id, username, date, content, commit_log FROM reports \
         WHERE username = ? ORDER BY date DESC",
    )
    .bind(username)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| Report {
            id: row.get("id"),
            username: row.get("username"),
            date: row.get("date"),
            content: row.get("content"),
            commit_log: row.get("commit_log"),
        })
        .collect())
}

/// Subscribe `username` to a repository. Rebinding the same pair keeps
/// the row and updates the branch (a rebind without a branch keeps the
/// previous one).
pub async fn upsert_binding(
    pool: &SqlitePool,
    username: &str,
    repo_url: &str,
    branch: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO bindings (username, repo_url, branch)
        VALUES (?, ?, ?)
        ON CONFLICT(username, repo_url) DO UPDATE SET
            branch = COALESCE(excluded.branch, bindings.branch)
        "#,
    )
    .bind(username)
    .bind(repo_url)
    .bind(branch)
    .execute(pool)
    .await?;

    Ok(())
}

/// Bindings for one user, in insertion order.
pub async fn list_bindings(pool: &SqlitePool, username: &str) -> Result<Vec<Binding>> {
    let rows = sqlx::query(
        "SELECT username, repo_url, branch FROM bindings WHERE username = ? ORDER BY id",
    )
    .bind(username)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| Binding {
            username: row.get("username"),
            repo_url: row.get("repo_url"),
            branch: row.get("branch"),
        })
        .collect())
}

pub async fn list_all_bindings(pool: &SqlitePool) -> Result<Vec<Binding>> {
    let rows =
        sqlx::query("SELECT username, repo_url, branch FROM bindings ORDER BY username, id")
            .fetch_all(pool)
            .await?;

    Ok(rows
        .iter()
        .map(|row| Binding {
            username: row.get("username"),
            repo_url: row.get("repo_url"),
            branch: row.get("branch"),
        })
        .collect())
}

/// Every user with at least one binding, i.e. the scheduler's batch roster.
pub async fn list_usernames(pool: &SqlitePool) -> Result<Vec<String>> {
    let rows = sqlx::query_scalar("SELECT DISTINCT username FROM bindings ORDER BY username")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}
