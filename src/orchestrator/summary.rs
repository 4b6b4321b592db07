//! Summary and learnings extraction.
//!
//! Agents are asked to end with `<summary>...</summary>` and to put durable
//! notes in `<learnings>...</learnings>`. Both are optional; nothing here may
//! fail an execution.

use crate::error::{DroverError, Result};
use chrono::Utc;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::io::AsyncWriteExt;

/// Longest summary kept when falling back to the last assistant text.
pub const SUMMARY_MAX_CHARS: usize = 600;

static SUMMARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<summary>(.*?)</summary>").expect("Invalid summary regex"));

static LEARNINGS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<learnings>(.*?)</learnings>").expect("Invalid learnings regex")
});

/// The last `<summary>` block, else the last assistant text, truncated.
pub fn extract_summary(transcript: &str, last_text: Option<&str>) -> Option<String> {
    let tagged = SUMMARY_RE
        .captures_iter(transcript)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .last();

    tagged
        .or_else(|| last_text.map(str::trim).filter(|s| !s.is_empty()))
        .map(|s| truncate_chars(s, SUMMARY_MAX_CHARS))
}

/// Bullet lines from every `<learnings>` block, markers stripped, deduplicated.
pub fn extract_learnings(transcript: &str) -> Vec<String> {
    let mut learnings: Vec<String> = Vec::new();
    for caps in LEARNINGS_RE.captures_iter(transcript) {
        for line in caps[1].lines() {
            let line = line
                .trim()
                .trim_start_matches(['-', '*', '•'])
                .trim();
            if !line.is_empty() && !learnings.iter().any(|l| l == line) {
                learnings.push(line.to_string());
            }
        }
    }
    learnings
}

pub fn learnings_path(project: &Path) -> PathBuf {
    project.join(".drover").join("memory").join("learnings.md")
}

/// Append a dated section for `feature_id` to the project's learnings file.
pub async fn append_learnings(project: &Path, feature_id: &str, learnings: &[String]) -> Result<()> {
    if learnings.is_empty() {
        return Ok(());
    }

    let path = learnings_path(project);
    let io_err = |what: &str, e: std::io::Error| {
        DroverError::UserError(format!("failed to {} '{}': {}", what, path.display(), e))
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_err("create directory for", e))?;
    }

    let mut section = format!(
        "\n## {} ({})\n\n",
        feature_id,
        Utc::now().format("%Y-%m-%d")
    );
    for learning in learnings {
        section.push_str(&format!("- {}\n", learning));
    }

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
        .map_err(|e| io_err("open", e))?;
    file.write_all(section.as_bytes())
        .await
        .map_err(|e| io_err("write", e))?;
    file.flush().await.map_err(|e| io_err("flush", e))
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}
