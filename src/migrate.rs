use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // Repository bindings: one row per (user, repository) subscription
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bindings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL,
            repo_url TEXT NOT NULL,
            branch TEXT,
            UNIQUE(username, repo_url)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Generated reports: at most one per (user, day); regeneration
    // overwrites content in place
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reports (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL,
            date TEXT NOT NULL,
            content TEXT NOT NULL,
            commit_log TEXT,
            UNIQUE(username, date)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    pool.close().await;
    Ok(())
}
