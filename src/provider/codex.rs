//! Codex provider (`codex exec --json`).
//!
//! Codex reports work as typed items (`command_execution`, `file_change`,
//! `todo_list`, ...) rather than named tool calls, so every item type goes
//! through the tool-name table and checklist items are rewritten into the
//! shared `TodoWrite` argument shape.

use super::{
    ContentBlock, ExecutionRequest, Invocation, Provider, ProviderKind, ProviderMessage, Role,
    StreamSession, translate_todos,
};
use serde_json::{Value, json};
use std::collections::HashMap;

pub struct CodexProvider;

const TOOL_NAMES: &[(&str, &str)] = &[
    ("command_execution", "Bash"),
    ("local_shell_call", "Bash"),
    ("shell", "Bash"),
    ("file_change", "Edit"),
    ("apply_patch", "Edit"),
    ("read_file", "Read"),
    ("list_dir", "Glob"),
    ("grep_files", "Grep"),
    ("web_search", "WebSearch"),
    ("web_fetch", "WebFetch"),
    ("todo_list", "TodoWrite"),
    ("update_plan", "TodoWrite"),
];

impl Provider for CodexProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Codex
    }

    fn default_command(&self) -> &'static str {
        "codex"
    }

    fn build_invocation(&self, request: &ExecutionRequest) -> Invocation {
        let mut args: Vec<String> = ["exec", "--json", "--skip-git-repo-check"]
            .into_iter()
            .map(String::from)
            .collect();

        if !request.model.trim().is_empty() {
            args.push("--model".to_string());
            args.push(request.model.trim().to_string());
        }
        for image in &request.image_paths {
            args.push("--image".to_string());
            args.push(image.display().to_string());
        }
        if let Some(session) = &request.resume_session {
            args.push("resume".to_string());
            args.push(session.clone());
        }
        // Prompt is read from stdin.
        args.push("-".to_string());

        Invocation {
            program: self.default_command().to_string(),
            args,
            stdin: Some(request.prompt.clone()),
            env: HashMap::new(),
        }
    }

    fn normalize(&self, record: &Value, session: &mut StreamSession) -> Option<ProviderMessage> {
        let event = record.get("type").and_then(Value::as_str)?;
        match event {
            "thread.started" => {
                if let Some(id) = record.get("thread_id").and_then(Value::as_str) {
                    session.session_id = Some(id.to_string());
                }
                None
            }
            "item.started" | "item.updated" | "item.completed" => {
                let item = record.get("item")?;
                self.normalize_item(event, item, session)
            }
            "turn.completed" => Some(ProviderMessage::Result {
                text: session.last_text.clone().unwrap_or_default(),
                session_id: session.session_id.clone(),
            }),
            "turn.failed" | "error" => {
                let message = record
                    .get("error")
                    .and_then(|e| e.get("message").and_then(Value::as_str).or(e.as_str()))
                    .or_else(|| record.get("message").and_then(Value::as_str))
                    .filter(|m| !m.trim().is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| session.synthesized_failure(self.name()));
                Some(ProviderMessage::Error {
                    message,
                    exit_code: None,
                    session_id: session.session_id.clone(),
                })
            }
            _ => None,
        }
    }

    fn tool_name_map(&self) -> &'static [(&'static str, &'static str)] {
        TOOL_NAMES
    }

    fn install_hint(&self) -> &'static str {
        "Install Codex with `npm install -g @openai/codex` and make sure `codex` is on PATH."
    }

    fn login_hint(&self) -> &'static str {
        "Run `codex login`, or set OPENAI_API_KEY."
    }
}

impl CodexProvider {
    fn normalize_item(
        &self,
        event: &str,
        item: &Value,
        session: &mut StreamSession,
    ) -> Option<ProviderMessage> {
        let item_type = item.get("type").and_then(Value::as_str)?;
        let id = item
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let session_id = session.session_id.clone();

        let content = match item_type {
            "agent_message" => {
                if event != "item.completed" {
                    return None;
                }
                let text = item.get("text").and_then(Value::as_str)?.to_string();
                session.last_text = Some(text.clone());
                vec![ContentBlock::Text { text }]
            }
            "reasoning" => return None,
            // Checklists are re-announced on every change.
            "todo_list" => vec![self.tool_use(&id, item_type, translate_todos(item))],
            _ => {
                let input = tool_input(item_type, item);
                match event {
                    "item.started" => {
                        session.open_tools.insert(id.clone());
                        vec![self.tool_use(&id, item_type, input)]
                    }
                    "item.completed" => {
                        let mut blocks = Vec::new();
                        if !session.open_tools.remove(&id) {
                            blocks.push(self.tool_use(&id, item_type, input));
                        }
                        blocks.push(tool_result(&id, item));
                        blocks
                    }
                    _ => return None,
                }
            }
        };

        Some(ProviderMessage::Assistant {
            role: Role::Assistant,
            content,
            session_id,
        })
    }

    fn tool_use(&self, id: &str, item_type: &str, input: Value) -> ContentBlock {
        let name = match item_type {
            "mcp_tool_call" => input
                .get("tool")
                .and_then(Value::as_str)
                .map(|t| self.shared_tool_name(t))
                .unwrap_or_else(|| item_type.to_string()),
            "file_change" if all_changes_are_adds(&input) => "Write".to_string(),
            _ => self.shared_tool_name(item_type),
        };
        ContentBlock::ToolUse {
            id: id.to_string(),
            name,
            input,
        }
    }
}

fn tool_input(item_type: &str, item: &Value) -> Value {
    match item_type {
        "command_execution" => json!({ "command": item.get("command").cloned().unwrap_or(Value::Null) }),
        "file_change" => json!({ "changes": item.get("changes").cloned().unwrap_or(json!([])) }),
        "web_search" => json!({ "query": item.get("query").cloned().unwrap_or(Value::Null) }),
        "mcp_tool_call" => json!({
            "server": item.get("server").cloned().unwrap_or(Value::Null),
            "tool": item.get("tool").cloned().unwrap_or(Value::Null),
            "arguments": item.get("arguments").cloned().unwrap_or(Value::Null),
        }),
        _ => item.clone(),
    }
}

fn tool_result(id: &str, item: &Value) -> ContentBlock {
    let content = item
        .get("aggregated_output")
        .or_else(|| item.get("output"))
        .or_else(|| item.get("result"))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default();

    let failed_status = item
        .get("status")
        .and_then(Value::as_str)
        .is_some_and(|s| s == "failed" || s == "declined");
    let nonzero_exit = item
        .get("exit_code")
        .and_then(Value::as_i64)
        .is_some_and(|code| code != 0);

    ContentBlock::ToolResult {
        tool_use_id: id.to_string(),
        content,
        is_error: failed_status || nonzero_exit,
    }
}

fn all_changes_are_adds(input: &Value) -> bool {
    input
        .get("changes")
        .and_then(Value::as_array)
        .is_some_and(|changes| {
            !changes.is_empty()
                && changes
                    .iter()
                    .all(|c| c.get("kind").and_then(Value::as_str) == Some("add"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn run(records: &[Value]) -> (Vec<ProviderMessage>, StreamSession) {
        let mut session = StreamSession::default();
        let out = records
            .iter()
            .filter_map(|r| CodexProvider.normalize(r, &mut session))
            .collect();
        (out, session)
    }

    fn tool_uses(messages: &[ProviderMessage]) -> Vec<(String, Value)> {
        messages
            .iter()
            .filter_map(|m| match m {
                ProviderMessage::Assistant { content, .. } => Some(content),
                _ => None,
            })
            .flatten()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { name, input, .. } => Some((name.clone(), input.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn invocation_reads_prompt_from_stdin() {
        let inv = CodexProvider.build_invocation(&ExecutionRequest {
            prompt: "Do the thing".into(),
            model: "gpt-5".into(),
            cwd: PathBuf::from("/tmp"),
            resume_session: None,
            image_paths: vec![PathBuf::from("a.png")],
        });
        assert_eq!(inv.program, "codex");
        assert_eq!(
            inv.args,
            vec![
                "exec",
                "--json",
                "--skip-git-repo-check",
                "--model",
                "gpt-5",
                "--image",
                "a.png",
                "-"
            ]
        );
        assert_eq!(inv.stdin.as_deref(), Some("Do the thing"));
    }

    #[test]
    fn resume_places_session_before_stdin_marker() {
        let inv = CodexProvider.build_invocation(&ExecutionRequest {
            resume_session: Some("thread-1".into()),
            ..Default::default()
        });
        assert_eq!(inv.args[inv.args.len() - 3..], ["resume", "thread-1", "-"]);
    }

    #[test]
    fn command_items_become_bash_tool_calls() {
        let (messages, session) = run(&[
            json!({"type": "thread.started", "thread_id": "th-1"}),
            json!({"type": "item.started", "item": {"id": "i1", "type": "command_execution", "command": "ls", "status": "in_progress"}}),
            json!({"type": "item.completed", "item": {"id": "i1", "type": "command_execution", "command": "ls", "aggregated_output": "src\n", "exit_code": 0, "status": "completed"}}),
        ]);
        assert_eq!(session.session_id.as_deref(), Some("th-1"));
        assert_eq!(tool_uses(&messages), vec![("Bash".to_string(), json!({"command": "ls"}))]);

        match &messages[1] {
            ProviderMessage::Assistant { content, .. } => assert_eq!(
                content,
                &vec![ContentBlock::ToolResult {
                    tool_use_id: "i1".into(),
                    content: "src\n".into(),
                    is_error: false
                }]
            ),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn completed_without_start_still_announces_tool() {
        let (messages, _) = run(&[json!({"type": "item.completed", "item": {
            "id": "i2", "type": "file_change", "status": "completed",
            "changes": [{"path": "new.rs", "kind": "add"}]
        }})]);
        let uses = tool_uses(&messages);
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].0, "Write");
    }

    #[test]
    fn failed_command_marks_result_as_error() {
        let (messages, _) = run(&[json!({"type": "item.completed", "item": {
            "id": "i3", "type": "command_execution", "command": "false", "exit_code": 1, "status": "failed"
        }})]);
        let ProviderMessage::Assistant { content, .. } = &messages[0] else {
            panic!("expected assistant message");
        };
        assert!(matches!(content[1], ContentBlock::ToolResult { is_error: true, .. }));
    }

    #[test]
    fn todo_list_is_translated_to_todowrite() {
        let (messages, _) = run(&[json!({"type": "item.updated", "item": {
            "id": "t1", "type": "todo_list",
            "items": [{"text": "plan", "completed": true}, {"text": "build", "completed": false}]
        }})]);
        assert_eq!(
            tool_uses(&messages),
            vec![(
                "TodoWrite".to_string(),
                json!({"todos": [
                    {"content": "plan", "status": "completed"},
                    {"content": "build", "status": "pending"}
                ]})
            )]
        );
    }

    #[test]
    fn turn_completed_carries_last_agent_message() {
        let (messages, _) = run(&[
            json!({"type": "thread.started", "thread_id": "th-2"}),
            json!({"type": "item.completed", "item": {"id": "m1", "type": "agent_message", "text": "Finished."}}),
            json!({"type": "turn.completed", "usage": {"input_tokens": 10}}),
        ]);
        assert_eq!(
            messages.last(),
            Some(&ProviderMessage::Result {
                text: "Finished.".into(),
                session_id: Some("th-2".into())
            })
        );
    }

    #[test]
    fn turn_failed_without_message_is_synthesized() {
        let (messages, _) = run(&[
            json!({"type": "thread.started", "thread_id": "th-3"}),
            json!({"type": "turn.failed", "error": {}}),
        ]);
        match &messages[0] {
            ProviderMessage::Error { message, .. } => {
                assert!(message.starts_with("codex run failed"));
                assert!(message.contains("th-3"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn reasoning_items_are_dropped() {
        let (messages, _) = run(&[json!({"type": "item.completed", "item": {"id": "r", "type": "reasoning", "text": "hmm"}})]);
        assert!(messages.is_empty());
    }
}
