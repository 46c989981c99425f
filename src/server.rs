//! JSON HTTP API.
//!
//! Exposes the report pipeline over HTTP for dashboards and manual
//! triggering.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/users` | Users with at least one binding |
//! | `GET`  | `/api/reports?username=` | A user's reports, newest first |
//! | `POST` | `/api/bindings` | Subscribe a user to a repository |
//! | `POST` | `/api/daily` | Generate a report on demand |
//! | `GET`  | `/api/prompt` | Current prompt template |
//! | `POST` | `/api/prompt` | Overwrite the prompt template |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "username must not be empty" } }
//! ```
//!
//! `POST /api/daily` reports success even when individual repositories
//! or the provider call degraded (the outcome lists per-repository
//! results); only a persistence failure is a 500.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::composer;
use crate::config::Config;
use crate::locator::{self, RepoLocks};
use crate::models::{Binding, Report};
use crate::pipeline::{self, GenerateOutcome};
use crate::provider::TextGenerator;
use crate::store;

/// Shared state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
    locks: Arc<RepoLocks>,
    generator: Arc<dyn TextGenerator>,
}

/// Start the HTTP API and serve until `shutdown` is cancelled.
pub async fn run_server(
    config: Arc<Config>,
    pool: SqlitePool,
    locks: Arc<RepoLocks>,
    generator: Arc<dyn TextGenerator>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let state = AppState {
        config,
        pool,
        locks,
        generator,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/users", get(handle_users))
        .route("/api/reports", get(handle_reports))
        .route("/api/bindings", post(handle_create_binding))
        .route("/api/daily", post(handle_daily))
        .route("/api/prompt", get(handle_get_prompt).post(handle_update_prompt))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    info!("API listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ Handlers ============

async fn handle_users(State(state): State<AppState>) -> Result<Json<Vec<String>>, AppError> {
    let usernames = store::list_usernames(&state.pool)
        .await
        .map_err(|e| internal(format!("{e:#}")))?;
    Ok(Json(usernames))
}

#[derive(Deserialize)]
struct ReportsQuery {
    username: String,
}

async fn handle_reports(
    State(state): State<AppState>,
    Query(query): Query<ReportsQuery>,
) -> Result<Json<Vec<Report>>, AppError> {
    if query.username.trim().is_empty() {
        return Err(bad_request("username must not be empty"));
    }
    let reports = store::list_reports(&state.pool, query.username.trim())
        .await
        .map_err(|e| internal(format!("{e:#}")))?;
    Ok(Json(reports))
}

#[derive(Deserialize)]
struct BindingRequest {
    username: String,
    repo_url: String,
    branch: Option<String>,
}

async fn handle_create_binding(
    State(state): State<AppState>,
    Json(request): Json<BindingRequest>,
) -> Result<Json<Binding>, AppError> {
    let username = request.username.trim();
    let repo_url = request.repo_url.trim();
    if username.is_empty() {
        return Err(bad_request("username must not be empty"));
    }
    if repo_url.is_empty() {
        return Err(bad_request("repo_url must not be empty"));
    }

    store::upsert_binding(&state.pool, username, repo_url, request.branch.as_deref())
        .await
        .map_err(|e| internal(format!("{e:#}")))?;

    // Clone eagerly so the first scheduled run finds the repo; a clone
    // failure is not fatal to the binding itself
    let dest = locator::local_path(&state.config.repos.clone_root, repo_url);
    let _guard = state.locks.acquire(&dest).await;
    if let Err(e) = locator::ensure_cloned(repo_url, &dest) {
        warn!(repo = %repo_url, "clone after binding failed: {e:#}");
    }

    Ok(Json(Binding {
        username: username.to_string(),
        repo_url: repo_url.to_string(),
        branch: request.branch,
    }))
}

#[derive(Deserialize)]
struct DailyRequest {
    username: String,
    /// Target date `YYYY-MM-DD`; defaults to the trailing window.
    date: Option<String>,
}

async fn handle_daily(
    State(state): State<AppState>,
    Json(request): Json<DailyRequest>,
) -> Result<Json<GenerateOutcome>, AppError> {
    let username = request.username.trim();
    if username.is_empty() {
        return Err(bad_request("username must not be empty"));
    }
    if let Some(date) = &request.date {
        if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
            return Err(bad_request(format!(
                "invalid date '{}', expected YYYY-MM-DD",
                date
            )));
        }
    }

    let outcome = pipeline::generate_report(
        &state.config,
        &state.pool,
        &state.locks,
        state.generator.as_ref(),
        username,
        request.date.as_deref(),
        None,
    )
    .await
    .map_err(|e| {
        error!(user = %username, "report generation failed: {e:#}");
        internal(format!("{e:#}"))
    })?;

    Ok(Json(outcome))
}

#[derive(Serialize)]
struct PromptResponse {
    prompt: String,
}

async fn handle_get_prompt(State(state): State<AppState>) -> Json<PromptResponse> {
    let prompt = composer::load_prompt_template(&state.config.reports.prompt_path);
    Json(PromptResponse { prompt })
}

#[derive(Deserialize)]
struct PromptUpdateRequest {
    prompt: String,
}

async fn handle_update_prompt(
    State(state): State<AppState>,
    Json(request): Json<PromptUpdateRequest>,
) -> Result<Json<PromptResponse>, AppError> {
    if request.prompt.trim().is_empty() {
        return Err(bad_request("prompt must not be empty"));
    }
    composer::save_prompt_template(&state.config.reports.prompt_path, &request.prompt)
        .map_err(|e| internal(format!("{e:#}")))?;
    Ok(Json(PromptResponse {
        prompt: request.prompt,
    }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    model: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        model: state.generator.model_name().to_string(),
    })
}
