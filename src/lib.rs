//! # Git Recap
//!
//! Turns a team's git commit history into daily work reports.
//!
//! Git Recap scans the repositories each user is subscribed to, extracts
//! the commits they authored inside a time window, summarizes them
//! through a streaming LLM call, and persists one report per
//! (user, date); regenerating overwrites in place. A business-day
//! scheduler runs the whole batch automatically; a CLI and a small JSON
//! HTTP API expose the same pipeline on demand.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────┐   ┌───────────┐   ┌─────────┐
//! │ Locator   │──▶│ Collector │──▶│ Composer  │──▶│  Store  │
//! │ clone dir │   │ git log   │   │ LLM call  │   │ SQLite  │
//! └───────────┘   └───────────┘   └───────────┘   └────┬────┘
//!                                                      │
//!                      ┌────────────┬──────────────────┤
//!                      ▼            ▼                  ▼
//!                 ┌─────────┐  ┌─────────┐       ┌──────────┐
//!                 │Scheduler│  │   CLI   │       │   HTTP   │
//!                 │ mon-fri │  │ (recap) │       │  (axum)  │
//!                 └─────────┘  └─────────┘       └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration with environment overrides |
//! | [`models`] | Core data types |
//! | [`locator`] | URL → local clone path, idempotent cloning, per-path locks |
//! | [`collector`] | Window resolution and per-repository commit extraction |
//! | [`composer`] | Prompt construction and report composition |
//! | [`provider`] | Streaming chat-completions client |
//! | [`store`] | Report/binding persistence (idempotent upsert) |
//! | [`mirror`] | Plain-text monthly report mirror |
//! | [`pipeline`] | Collect → compose → persist orchestration |
//! | [`scheduler`] | Business-day batch trigger |
//! | [`server`] | JSON HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod collector;
pub mod composer;
pub mod config;
pub mod db;
pub mod locator;
pub mod migrate;
pub mod mirror;
pub mod models;
pub mod pipeline;
pub mod provider;
pub mod scheduler;
pub mod server;
pub mod store;
