//! Plain-text report mirror.
//!
//! Mirrors each generated report into a monthly file
//! (`<output_dir>/YYYY-MM.txt`) made of `## YYYY-MM-DD` blocks, newest
//! date first. The database row is the source of truth; the mirror is a
//! convenience for operators who want reports on disk.

use anyhow::{bail, Context, Result};
use std::path::Path;

/// Insert or replace the `date` block in the month file for `date`.
pub fn mirror_report(output_dir: &Path, date: &str, content: &str) -> Result<()> {
    if date.len() < 7 {
        bail!("invalid report date '{}', expected YYYY-MM-DD", date);
    }

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output dir: {}", output_dir.display()))?;

    let month = &date[..7];
    let file = output_dir.join(format!("{}.txt", month));
    let existing = std::fs::read_to_string(&file).unwrap_or_default();

    let mut blocks = parse_blocks(&existing);
    blocks.retain(|(d, _)| d != date);

    // Newest date first; ISO dates sort lexicographically
    let position = blocks
        .iter()
        .position(|(d, _)| d.as_str() < date)
        .unwrap_or(blocks.len());
    blocks.insert(position, (date.to_string(), content.trim_end().to_string()));

    let rendered: String = blocks
        .iter()
        .map(|(d, body)| format!("## {}\n\n{}\n\n", d, body))
        .collect();

    std::fs::write(&file, rendered)
        .with_context(|| format!("Failed to write mirror file: {}", file.display()))?;
    Ok(())
}

/// Split a month file into (date, body) blocks on `## ` headings.
fn parse_blocks(content: &str) -> Vec<(String, String)> {
    let mut blocks: Vec<(String, String)> = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in content.lines() {
        if let Some(date) = line.strip_prefix("## ") {
            if let Some((d, body)) = current.take() {
                blocks.push((d, body.join("\n").trim().to_string()));
            }
            current = Some((date.trim().to_string(), Vec::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }

    if let Some((d, body)) = current.take() {
        blocks.push((d, body.join("\n").trim().to_string()));
    }

    blocks
}
