//! Markdown transcript of an execution, persisted as `agent-output.md`.

use super::verdict::TOOL_MARKER;
use crate::provider::{ContentBlock, ProviderMessage};

pub const TRANSCRIPT_FILE: &str = "agent-output.md";

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    text: String,
    /// Last assistant text seen, so a `result` repeating it is not doubled.
    last_text: Option<String>,
    /// Byte offset where this execution's text starts.
    start: usize,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue an existing transcript.
    pub fn resume(existing: String) -> Self {
        let mut transcript = Self {
            text: existing,
            last_text: None,
            start: 0,
        };
        if !transcript.text.trim().is_empty() {
            transcript.section("Resumed session");
        }
        transcript.start = transcript.text.len();
        transcript
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Text recorded since this transcript was created or resumed.
    pub fn recorded(&self) -> &str {
        &self.text[self.start..]
    }

    pub fn last_text(&self) -> Option<&str> {
        self.last_text.as_deref()
    }

    /// Start a new titled section, e.g. for a follow-up invocation.
    pub fn section(&mut self, title: &str) {
        self.ensure_blank_line();
        self.text.push_str(&format!("---\n\n## {}\n\n", title));
    }

    pub fn record(&mut self, message: &ProviderMessage) {
        match message {
            ProviderMessage::Assistant { content, .. } => {
                for block in content {
                    self.record_block(block);
                }
            }
            ProviderMessage::Result { text, .. } => {
                let text = text.trim();
                if !text.is_empty() && self.last_text.as_deref() != Some(text) {
                    self.push_paragraph(text);
                    self.last_text = Some(text.to_string());
                }
            }
            ProviderMessage::Error { message, .. } => {
                self.push_paragraph(&format!("❌ Error: {}", message.trim()));
            }
        }
    }

    fn record_block(&mut self, block: &ContentBlock) {
        match block {
            ContentBlock::Text { text } => {
                let text = text.trim();
                if !text.is_empty() {
                    self.push_paragraph(text);
                    self.last_text = Some(text.to_string());
                }
            }
            ContentBlock::ToolUse { name, input, .. } => {
                let input = serde_json::to_string(input).unwrap_or_default();
                self.push_paragraph(&format!("{} {}\nInput: {}", TOOL_MARKER, name, input));
            }
            ContentBlock::ToolResult {
                content, is_error, ..
            } => {
                if *is_error {
                    let first_line = content.lines().next().unwrap_or_default();
                    self.push_paragraph(&format!("Tool failed: {}", first_line.trim()));
                }
            }
        }
    }

    fn push_paragraph(&mut self, paragraph: &str) {
        self.ensure_blank_line();
        self.text.push_str(paragraph);
        self.text.push('\n');
    }

    fn ensure_blank_line(&mut self) {
        if self.text.is_empty() {
            return;
        }
        while !self.text.ends_with("\n\n") {
            self.text.push('\n');
        }
    }
}
