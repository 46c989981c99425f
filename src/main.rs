//! # Git Recap CLI (`recap`)
//!
//! The `recap` binary drives the daily work-report pipeline: bind users
//! to repositories, clone them, generate reports on demand, and run the
//! scheduler + HTTP API as a long-lived daemon.
//!
//! ## Usage
//!
//! ```bash
//! recap --config ./config/recap.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `recap init` | Create the SQLite database and run schema migrations |
//! | `recap bind <user> <url>` | Subscribe a user to a repository |
//! | `recap bindings` | List repository bindings |
//! | `recap users` | List users with at least one binding |
//! | `recap sync` | Clone any bound repositories missing locally |
//! | `recap generate <user>` | Generate (or regenerate) one report now |
//! | `recap reports <user>` | List a user's stored reports |
//! | `recap prompt show` | Print the prompt template |
//! | `recap prompt set` | Overwrite the prompt template |
//! | `recap serve` | Run the scheduler and HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! recap init
//! recap bind alice https://github.com/example/widget.git --branch main
//! recap sync
//! recap generate alice --date 2024-05-01
//! recap serve
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use git_recap::models::ScanOutcome;
use git_recap::provider::DeepSeekGenerator;
use git_recap::{composer, config, db, locator, migrate, pipeline, scheduler, server, store};

/// Git Recap: daily work reports generated from git commit history.
///
/// All commands accept a `--config` flag pointing to a TOML
/// configuration file; every setting has a default, so the file is
/// optional. The provider API key is read from `DEEPSEEK_API_KEY`.
#[derive(Parser)]
#[command(
    name = "recap",
    about = "Daily work reports generated from git commit history",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Optional; defaults apply.
    #[arg(long, global = true, default_value = "./config/recap.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the bindings/reports
    /// tables. Idempotent: running it multiple times is safe.
    Init,

    /// Subscribe a user to a repository.
    ///
    /// Binding the same (user, url) pair again updates the branch.
    Bind {
        /// Username the reports are generated for. Commit author names
        /// must match this exactly.
        username: String,

        /// Repository URL (https or ssh).
        repo_url: String,

        /// Branch to check out before scanning. Defaults to whatever
        /// the clone has checked out.
        #[arg(long)]
        branch: Option<String>,
    },

    /// List repository bindings.
    Bindings {
        /// Only show bindings for this user.
        #[arg(long)]
        user: Option<String>,
    },

    /// List users with at least one binding.
    Users,

    /// Clone any bound repositories missing from the local clone root.
    ///
    /// Existing clones are left untouched; a failed clone is reported
    /// and does not stop the rest.
    Sync {
        /// Only sync repositories bound to this user.
        #[arg(long)]
        user: Option<String>,
    },

    /// Generate (or regenerate) a report for one user.
    ///
    /// Requires `DEEPSEEK_API_KEY` in the environment. Regenerating an
    /// existing (user, date) report overwrites its content.
    Generate {
        username: String,

        /// Report a specific day (YYYY-MM-DD) instead of the trailing
        /// window ending now.
        #[arg(long)]
        date: Option<String>,

        /// Override the trailing window length in days.
        #[arg(long)]
        days: Option<i64>,
    },

    /// List a user's stored reports, newest first.
    Reports {
        username: String,

        /// Print full report contents instead of one-line summaries.
        #[arg(long)]
        full: bool,
    },

    /// Show or overwrite the prompt template.
    ///
    /// The template file is read fresh on every generation, so edits
    /// take effect immediately.
    Prompt {
        #[command(subcommand)]
        action: PromptAction,
    },

    /// Run the scheduler and HTTP API until interrupted.
    ///
    /// Reports for every known user are generated on business days at
    /// the configured time. Requires `DEEPSEEK_API_KEY`.
    Serve,
}

#[derive(Subcommand)]
enum PromptAction {
    /// Print the current template (or the built-in default).
    Show,

    /// Overwrite the template wholesale.
    Set {
        /// New template text.
        text: Option<String>,

        /// Read the new template from a file instead.
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Bind {
            username,
            repo_url,
            branch,
        } => {
            let pool = db::connect(&cfg).await?;
            store::upsert_binding(&pool, username.trim(), repo_url.trim(), branch.as_deref())
                .await?;
            pool.close().await;
            println!("bound {} -> {}", username.trim(), repo_url.trim());
        }
        Commands::Bindings { user } => {
            let pool = db::connect(&cfg).await?;
            let bindings = match user {
                Some(user) => store::list_bindings(&pool, user.trim()).await?,
                None => store::list_all_bindings(&pool).await?,
            };
            pool.close().await;

            println!("{:<16} {:<48} BRANCH", "USER", "REPOSITORY");
            for b in &bindings {
                println!(
                    "{:<16} {:<48} {}",
                    b.username,
                    b.repo_url,
                    b.branch.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::Users => {
            let pool = db::connect(&cfg).await?;
            let usernames = store::list_usernames(&pool).await?;
            pool.close().await;
            for username in usernames {
                println!("{}", username);
            }
        }
        Commands::Sync { user } => {
            let pool = db::connect(&cfg).await?;
            let bindings = match user {
                Some(user) => store::list_bindings(&pool, user.trim()).await?,
                None => store::list_all_bindings(&pool).await?,
            };
            pool.close().await;

            let results = locator::clone_all(&cfg.repos.clone_root, &bindings);
            let ok = results.iter().filter(|(_, ok)| *ok).count();
            println!("sync");
            println!("  repositories: {}", results.len());
            println!("  available: {}", ok);
            for (url, _) in results.iter().filter(|(_, ok)| !*ok) {
                println!("  failed: {}", url);
            }
            println!("ok");
        }
        Commands::Generate {
            username,
            date,
            days,
        } => {
            let generator = DeepSeekGenerator::from_env(&cfg.provider)?;
            let pool = db::connect(&cfg).await?;
            let locks = locator::RepoLocks::new();

            let outcome = pipeline::generate_report(
                &cfg,
                &pool,
                &locks,
                &generator,
                username.trim(),
                date.as_deref(),
                days,
            )
            .await?;
            pool.close().await;

            println!("generate {}", outcome.username);
            println!("  report date: {}", outcome.date);
            println!("  commits: {}", outcome.commits);
            for scan in &outcome.scans {
                let marker = match scan.outcome {
                    ScanOutcome::Collected(_) => " ",
                    _ => "!",
                };
                println!("  {} {}: {}", marker, scan.repo, scan.outcome);
            }
            println!("ok");
        }
        Commands::Reports { username, full } => {
            let pool = db::connect(&cfg).await?;
            let reports = store::list_reports(&pool, username.trim()).await?;
            pool.close().await;

            if full {
                for report in &reports {
                    println!("## {}\n", report.date);
                    println!("{}\n", report.content);
                }
            } else {
                println!("{:<12} CONTENT", "DATE");
                for report in &reports {
                    let first_line = report.content.lines().next().unwrap_or("");
                    println!("{:<12} {}", report.date, first_line);
                }
            }
        }
        Commands::Prompt { action } => match action {
            PromptAction::Show => {
                print!(
                    "{}",
                    composer::load_prompt_template(&cfg.reports.prompt_path)
                );
            }
            PromptAction::Set { text, file } => {
                let template = match (text, file) {
                    (Some(text), _) => text,
                    (None, Some(file)) => std::fs::read_to_string(&file)?,
                    (None, None) => anyhow::bail!("provide template text or --file"),
                };
                composer::save_prompt_template(&cfg.reports.prompt_path, &template)?;
                println!("Prompt template updated.");
            }
        },
        Commands::Serve => {
            run_daemon(cfg).await?;
        }
    }

    Ok(())
}

/// Assemble the long-lived pieces (one provider, one pool, one lock
/// registry) and run the API and scheduler until Ctrl-C.
async fn run_daemon(cfg: config::Config) -> Result<()> {
    // Missing provider key is fatal here, before any task starts
    let generator: Arc<dyn git_recap::provider::TextGenerator> =
        Arc::new(DeepSeekGenerator::from_env(&cfg.provider)?);

    migrate::run_migrations(&cfg).await?;
    let pool = db::connect(&cfg).await?;
    let locks = Arc::new(locator::RepoLocks::new());
    let cfg = Arc::new(cfg);

    let shutdown = CancellationToken::new();

    let mut server_handle = tokio::spawn(server::run_server(
        cfg.clone(),
        pool.clone(),
        locks.clone(),
        generator.clone(),
        shutdown.clone(),
    ));

    let sched_cfg = cfg.clone();
    let sched_pool = pool.clone();
    let sched_locks = locks.clone();
    let sched_generator = generator.clone();
    let sched_shutdown = shutdown.clone();
    let mut scheduler_handle = tokio::spawn(async move {
        scheduler::run_scheduler(
            &sched_cfg,
            &sched_pool,
            &sched_locks,
            sched_generator.as_ref(),
            sched_shutdown,
        )
        .await
    });

    let mut server_result = None;
    let mut scheduler_result = None;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
        r = &mut server_handle => { server_result = Some(r); }
        r = &mut scheduler_handle => { scheduler_result = Some(r); }
    }

    shutdown.cancel();

    let server_result = match server_result {
        Some(r) => r,
        None => server_handle.await,
    };
    let scheduler_result = match scheduler_result {
        Some(r) => r,
        None => scheduler_handle.await,
    };
    server_result??;
    scheduler_result??;

    pool.close().await;
    Ok(())
}
