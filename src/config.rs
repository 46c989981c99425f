use anyhow::{Context, Result};
use chrono::FixedOffset;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub repos: ReposConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/recap.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReposConfig {
    /// Root directory holding local clones of all bound repositories.
    #[serde(default = "default_clone_root")]
    pub clone_root: PathBuf,
    /// Pull the latest changes before scanning each repository.
    #[serde(default = "default_pull")]
    pub pull: bool,
}

impl Default for ReposConfig {
    fn default() -> Self {
        Self {
            clone_root: default_clone_root(),
            pull: default_pull(),
        }
    }
}

fn default_clone_root() -> PathBuf {
    std::env::var("LOCAL_REPO_DIR")
        .unwrap_or_else(|_| ".localrepo".to_string())
        .into()
}

fn default_pull() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportsConfig {
    /// Directory for the plain-text monthly report mirror.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Prompt template file, re-read on every composition.
    #[serde(default = "default_prompt_path")]
    pub prompt_path: PathBuf,
    /// Trailing window length when no target date is given.
    #[serde(default = "default_window_days")]
    pub window_days: i64,
    /// Fixed UTC offset for all date arithmetic and timestamps.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            prompt_path: default_prompt_path(),
            window_days: default_window_days(),
            utc_offset_hours: default_utc_offset_hours(),
        }
    }
}

impl ReportsConfig {
    pub fn timezone(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .with_context(|| format!("invalid utc_offset_hours: {}", self.utc_offset_hours))
    }
}

fn default_output_dir() -> PathBuf {
    std::env::var("OUTPUT_DIR")
        .unwrap_or_else(|_| "reports".to_string())
        .into()
}

fn default_prompt_path() -> PathBuf {
    PathBuf::from("prompt.txt")
}

fn default_window_days() -> i64 {
    1
}

fn default_utc_offset_hours() -> i32 {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: default_provider_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider_url() -> String {
    "https://api.deepseek.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_temperature() -> f64 {
    0.3
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    /// Trigger hour, local to the configured UTC offset.
    #[serde(default = "default_hour")]
    pub hour: u32,
    #[serde(default = "default_minute")]
    pub minute: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            hour: default_hour(),
            minute: default_minute(),
        }
    }
}

fn default_hour() -> u32 {
    18
}

fn default_minute() -> u32 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7310".to_string()
}

/// Load configuration from a TOML file.
///
/// A missing file is not an error: every setting has a default, so the
/// tool works out of the box with only the `LOCAL_REPO_DIR` / `OUTPUT_DIR`
/// environment overrides. A present-but-invalid file is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    let config: Config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };

    if config.reports.window_days < 1 {
        anyhow::bail!("reports.window_days must be >= 1");
    }

    if !(-23..=23).contains(&config.reports.utc_offset_hours) {
        anyhow::bail!("reports.utc_offset_hours must be in [-23, 23]");
    }

    if !(0.0..=2.0).contains(&config.provider.temperature) {
        anyhow::bail!("provider.temperature must be in [0.0, 2.0]");
    }

    if config.schedule.hour > 23 {
        anyhow::bail!("schedule.hour must be in [0, 23]");
    }

    if config.schedule.minute > 59 {
        anyhow::bail!("schedule.minute must be in [0, 59]");
    }

    Ok(config)
}
