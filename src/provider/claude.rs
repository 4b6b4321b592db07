//! Claude Code provider (`claude -p --output-format stream-json`).
//!
//! Claude's stream already uses the shared tool vocabulary, so normalization
//! is mostly a reshaping of `assistant` / `user` / `result` records.

use super::{
    ContentBlock, ExecutionRequest, Invocation, Provider, ProviderKind, ProviderMessage, Role,
    StreamSession,
};
use serde_json::Value;
use std::collections::HashMap;

pub struct ClaudeProvider;

const TOOL_NAMES: &[(&str, &str)] = &[
    ("MultiEdit", "Edit"),
    ("NotebookEdit", "Edit"),
    ("NotebookRead", "Read"),
    ("Agent", "Task"),
];

impl Provider for ClaudeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Claude
    }

    fn default_command(&self) -> &'static str {
        "claude"
    }

    fn build_invocation(&self, request: &ExecutionRequest) -> Invocation {
        let mut args: Vec<String> = ["-p", "--output-format", "stream-json", "--verbose"]
            .into_iter()
            .map(String::from)
            .collect();

        if !request.model.trim().is_empty() {
            args.push("--model".to_string());
            args.push(request.model.trim().to_string());
        }
        if let Some(session) = &request.resume_session {
            args.push("--resume".to_string());
            args.push(session.clone());
        }

        // Images reach Claude through the prompt's attachment list.
        Invocation {
            program: self.default_command().to_string(),
            args,
            stdin: Some(request.prompt.clone()),
            env: HashMap::new(),
        }
    }

    fn normalize(&self, record: &Value, session: &mut StreamSession) -> Option<ProviderMessage> {
        if let Some(id) = record.get("session_id").and_then(Value::as_str) {
            session.session_id = Some(id.to_string());
        }
        let session_id = session.session_id.clone();

        match record.get("type").and_then(Value::as_str)? {
            "assistant" | "user" => {
                let message = record.get("message")?;
                let role = match message.get("role").and_then(Value::as_str) {
                    Some("user") => Role::User,
                    _ => Role::Assistant,
                };
                let content: Vec<ContentBlock> = match message.get("content")? {
                    Value::String(text) => vec![ContentBlock::Text { text: text.clone() }],
                    Value::Array(blocks) => blocks
                        .iter()
                        .filter_map(|block| self.content_block(block))
                        .collect(),
                    _ => Vec::new(),
                };
                if content.is_empty() {
                    return None;
                }
                Some(ProviderMessage::Assistant {
                    role,
                    content,
                    session_id,
                })
            }
            "result" => {
                let text = record
                    .get("result")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let is_error = record
                    .get("is_error")
                    .and_then(Value::as_bool)
                    .unwrap_or(false)
                    || record
                        .get("subtype")
                        .and_then(Value::as_str)
                        .is_some_and(|s| s.starts_with("error"));

                if is_error {
                    let message = if text.trim().is_empty() {
                        session.synthesized_failure(self.name())
                    } else {
                        text
                    };
                    return Some(ProviderMessage::Error {
                        message,
                        exit_code: None,
                        session_id,
                    });
                }
                Some(ProviderMessage::Result { text, session_id })
            }
            "error" => {
                let message = record
                    .get("error")
                    .and_then(|e| e.get("message").and_then(Value::as_str).or(e.as_str()))
                    .or_else(|| record.get("message").and_then(Value::as_str))
                    .map(str::to_string)
                    .unwrap_or_else(|| session.synthesized_failure(self.name()));
                Some(ProviderMessage::Error {
                    message,
                    exit_code: None,
                    session_id,
                })
            }
            _ => None,
        }
    }

    fn tool_name_map(&self) -> &'static [(&'static str, &'static str)] {
        TOOL_NAMES
    }

    fn install_hint(&self) -> &'static str {
        "Install Claude Code with `npm install -g @anthropic-ai/claude-code` and make sure `claude` is on PATH."
    }

    fn login_hint(&self) -> &'static str {
        "Run `claude` once interactively and complete `/login`, or set ANTHROPIC_API_KEY."
    }
}

impl ClaudeProvider {
    fn content_block(&self, block: &Value) -> Option<ContentBlock> {
        match block.get("type").and_then(Value::as_str)? {
            "text" => {
                let text = block.get("text").and_then(Value::as_str)?;
                Some(ContentBlock::Text {
                    text: text.to_string(),
                })
            }
            "tool_use" => Some(ContentBlock::ToolUse {
                id: string_field(block, "id"),
                name: self.shared_tool_name(&string_field(block, "name")),
                input: block.get("input").cloned().unwrap_or(Value::Null),
            }),
            "tool_result" => Some(ContentBlock::ToolResult {
                tool_use_id: string_field(block, "tool_use_id"),
                content: flatten_tool_content(block.get("content")),
                is_error: block
                    .get("is_error")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            }),
            _ => None,
        }
    }
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn flatten_tool_content(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) if !other.is_null() => other.to_string(),
        _ => String::new(),
    }
}
