//! Plan task progress from the agent's stream.
//!
//! Two signals move a task forward:
//!
//! - a `[TASK_COMPLETE] <id>` line in assistant text
//! - a `TodoWrite` call whose todo content matches a task's description

use crate::feature::{Plan, TaskStatus};
use crate::prompt::TASK_COMPLETE_MARKER;
use crate::provider::{ContentBlock, ProviderMessage};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static TASK_COMPLETE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"{}\s*:?\s*([A-Za-z0-9][A-Za-z0-9_.\-]*)",
        regex::escape(TASK_COMPLETE_MARKER)
    ))
    .expect("Invalid task marker regex")
});

/// Apply one message to `plan`, returning the tasks whose status changed.
pub fn apply_message(plan: &mut Plan, message: &ProviderMessage) -> Vec<(String, TaskStatus)> {
    let mut changed = Vec::new();

    match message {
        ProviderMessage::Assistant { content, .. } => {
            for block in content {
                match block {
                    ContentBlock::Text { text } => apply_markers(plan, text, &mut changed),
                    ContentBlock::ToolUse { name, input, .. } if name == "TodoWrite" => {
                        apply_todos(plan, input, &mut changed)
                    }
                    _ => {}
                }
            }
        }
        ProviderMessage::Result { text, .. } => apply_markers(plan, text, &mut changed),
        ProviderMessage::Error { .. } => {}
    }

    changed
}

fn apply_markers(plan: &mut Plan, text: &str, changed: &mut Vec<(String, TaskStatus)>) {
    for caps in TASK_COMPLETE_RE.captures_iter(text) {
        let id = caps[1].trim_end_matches(['.', '-']);
        set_status(plan, id, TaskStatus::Completed, changed);
    }
}

fn apply_todos(plan: &mut Plan, input: &Value, changed: &mut Vec<(String, TaskStatus)>) {
    let Some(todos) = input.get("todos").and_then(Value::as_array) else {
        return;
    };

    for todo in todos {
        let (Some(content), Some(status)) = (
            todo.get("content").and_then(Value::as_str),
            todo.get("status").and_then(Value::as_str),
        ) else {
            continue;
        };
        let status = match status {
            "completed" => TaskStatus::Completed,
            "in_progress" => TaskStatus::InProgress,
            _ => continue,
        };

        let content = content.trim();
        let matched = plan
            .tasks
            .iter()
            .find(|t| {
                t.description.trim().eq_ignore_ascii_case(content)
                    || content.starts_with(&format!("[{}]", t.id))
            })
            .map(|t| t.id.clone());
        if let Some(id) = matched {
            set_status(plan, &id, status, changed);
        }
    }
}

/// Status only moves forward; a completed task is never reopened.
fn set_status(
    plan: &mut Plan,
    id: &str,
    status: TaskStatus,
    changed: &mut Vec<(String, TaskStatus)>,
) {
    let Some(task) = plan.task_mut(id) else {
        return;
    };
    let advances = match (task.status, status) {
        (TaskStatus::Completed, _) => false,
        (TaskStatus::InProgress, TaskStatus::InProgress) => false,
        (_, TaskStatus::Pending) => false,
        _ => true,
    };
    if advances {
        task.status = status;
        changed.push((task.id.clone(), status));
    }
}
