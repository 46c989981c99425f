//! Report composition.
//!
//! Renders collected commits into a commit-log block, prepends the
//! operator-editable prompt template, and delegates to the configured
//! [`TextGenerator`]. The template file is read on every call so edits
//! take effect on the next invocation without a restart.

use std::path::Path;
use tracing::{error, info};

use crate::models::CommitRecord;
use crate::provider::TextGenerator;

/// Returned without any provider call when the window held no commits.
pub const NO_COMMITS_SENTINEL: &str = "No commits recorded for this period.";

/// Returned when the provider call fails at the transport level.
pub const GENERATION_FALLBACK: &str =
    "Unable to generate the work report. Check network connectivity or API configuration.";

/// Used when the prompt template file is missing or unreadable.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "\
You are a seasoned engineering lead. Based on the following git commit log, \
write a professional daily work report.
Requirements:
1. Group the work by project.
2. Call out technical difficulties and how they were resolved.
3. Do not include a plan for tomorrow.
4. Use plain, readable text rather than markdown.
Today's commits:";

/// Render commits into the log block fed to the model, one line per
/// commit: `- [hash] message (author @ date) [repo]`.
pub fn render_commit_log(commits: &[CommitRecord]) -> String {
    commits
        .iter()
        .map(|c| {
            format!(
                "- [{}] {} ({} @ {}) [{}]",
                c.hash, c.message, c.author, c.date, c.repo
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Read the prompt template, fresh on every call.
pub fn load_prompt_template(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(template) if !template.trim().is_empty() => template,
        _ => DEFAULT_PROMPT_TEMPLATE.to_string(),
    }
}

/// Overwrite the prompt template wholesale.
pub fn save_prompt_template(path: &Path, template: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, template)?;
    Ok(())
}

pub fn build_prompt(template: &str, commit_log: &str) -> String {
    format!("{}\n{}", template.trim_end(), commit_log)
}

/// Compose the report for `commits`.
///
/// Empty input short-circuits to [`NO_COMMITS_SENTINEL`] without
/// touching the provider. Provider failures degrade to
/// [`GENERATION_FALLBACK`]; they never propagate.
pub async fn compose_report(
    prompt_path: &Path,
    generator: &dyn TextGenerator,
    commits: &[CommitRecord],
) -> String {
    if commits.is_empty() {
        info!("no commits in window, skipping generation");
        return NO_COMMITS_SENTINEL.to_string();
    }

    let commit_log = render_commit_log(commits);
    let template = load_prompt_template(prompt_path);
    let prompt = build_prompt(&template, &commit_log);

    info!(
        model = generator.model_name(),
        commits = commits.len(),
        "generating work report"
    );

    match generator.generate(&prompt).await {
        Ok(content) => content,
        Err(e) => {
            error!("report generation failed: {e:#}");
            GENERATION_FALLBACK.to_string()
        }
    }
}
