//! Prompt construction.
//!
//! Three prompts exist: the initial feature prompt, the continuation prompt
//! (approved plan or unresolved tasks after an incomplete run), and the
//! resume prompt for an interrupted provider session. Each has a built-in
//! template that a project can override in `prompt_templates`.
//!
//! # Variables
//!
//! - `{id}`, `{title}`, `{description}`
//! - `{spec}` - specification section, empty if the feature has none
//! - `{images}` - attached image manifest, empty if none
//! - `{plan}` - approved plan text, empty if none
//! - `{tasks}` - unresolved plan tasks as a `- [ID] description` list
//! - `{instructions}` - project instruction files, empty when disabled

mod template;

pub use template::{TemplateError, render_template};

use crate::config::{Config, PromptTemplates};
use crate::error::{DroverError, Result};
use crate::feature::Feature;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Marker an agent prints after finishing a plan task.
pub const TASK_COMPLETE_MARKER: &str = "[TASK_COMPLETE]";

const FEATURE_TEMPLATE: &str = "\
# Feature: {title}

{description}
{spec}{images}{plan}
## Instructions

- Implement the feature completely in the current working directory.
- Read the relevant code before changing it, and run the project's tests.
- When you finish a plan task, print `[TASK_COMPLETE] <task id>` on its own line.
- End with a short summary inside <summary></summary> tags.
- Put anything future runs on this project should know inside
  <learnings></learnings>, one bullet per line.
{instructions}";

const CONTINUATION_TEMPLATE: &str = "\
# Continue: {title}

Work on this feature is not finished yet.
{plan}
## Remaining tasks

{tasks}

Complete exactly these tasks. Print `[TASK_COMPLETE] <task id>` after each one
and end with a summary inside <summary></summary> tags.
{instructions}";

const RESUME_TEMPLATE: &str = "\
Continue working on \"{title}\" from where you left off. The previous run was
interrupted before it finished.

{tasks}
End with a summary inside <summary></summary> tags.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Feature,
    Continuation,
    Resume,
}

impl PromptKind {
    fn template<'a>(&self, overrides: &'a PromptTemplates) -> &'a str {
        let custom = match self {
            PromptKind::Feature => overrides.feature.as_deref(),
            PromptKind::Continuation => overrides.continuation.as_deref(),
            PromptKind::Resume => overrides.resume.as_deref(),
        };
        custom.unwrap_or(match self {
            PromptKind::Feature => FEATURE_TEMPLATE,
            PromptKind::Continuation => CONTINUATION_TEMPLATE,
            PromptKind::Resume => RESUME_TEMPLATE,
        })
    }
}

/// Render a prompt for `feature`.
pub fn build_prompt(
    kind: PromptKind,
    feature: &Feature,
    templates: &PromptTemplates,
    instructions: &str,
) -> Result<String> {
    let vars = feature_variables(feature, instructions);
    let rendered = render_template(kind.template(templates), &vars)
        .map_err(|e| DroverError::Config(format!("prompt template: {}", e)))?;
    Ok(rendered.trim_end().to_string() + "\n")
}

fn feature_variables<'a>(feature: &Feature, instructions: &str) -> HashMap<&'a str, String> {
    let spec = feature
        .spec
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| format!("\n## Specification\n\n{}\n", s.trim()))
        .unwrap_or_default();

    let images = if feature.image_paths.is_empty() {
        String::new()
    } else {
        let list: Vec<String> = feature
            .image_paths
            .iter()
            .map(|p| format!("- {}", p.display()))
            .collect();
        format!("\n## Attached images\n\n{}\n", list.join("\n"))
    };

    let plan = feature
        .plan
        .as_ref()
        .and_then(|p| p.content.as_deref())
        .filter(|c| !c.trim().is_empty())
        .map(|c| format!("\n## Approved plan\n\n{}\n", c.trim()))
        .unwrap_or_default();

    let tasks = feature
        .unresolved_tasks()
        .iter()
        .map(|t| format!("- [{}] {}", t.id, t.description))
        .collect::<Vec<_>>()
        .join("\n");

    let instructions = if instructions.trim().is_empty() {
        String::new()
    } else {
        format!("\n{}\n", instructions.trim())
    };

    HashMap::from([
        ("id", feature.id.clone()),
        ("title", feature.title.clone()),
        ("description", feature.description.trim().to_string()),
        ("spec", spec),
        ("images", images),
        ("plan", plan),
        ("tasks", tasks),
        ("instructions", instructions),
    ])
}

/// Concatenate the project's instruction files, if enabled.
///
/// Missing files are skipped; unreadable ones are logged and skipped.
pub async fn load_project_instructions(project: &Path, config: &Config) -> String {
    if !config.auto_load_project_instructions {
        return String::new();
    }

    let mut sections = Vec::new();
    for name in &config.instruction_files {
        let path = project.join(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) if !content.trim().is_empty() => {
                debug!(file = %path.display(), "loaded project instructions");
                sections.push(format!(
                    "## Project instructions ({})\n\n{}",
                    name,
                    content.trim()
                ));
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(file = %path.display(), error = %e, "failed to read instruction file"),
        }
    }
    sections.join("\n\n")
}
