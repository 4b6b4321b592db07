//! Uniform event protocol every provider normalizes into.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Assistant,
    User,
}

/// One block of assistant content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        /// Name from the shared tool vocabulary when the provider's tool maps
        /// onto one, otherwise the provider's own name.
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

/// A normalized message from any provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderMessage {
    Assistant {
        role: Role,
        content: Vec<ContentBlock>,
        #[serde(default)]
        session_id: Option<String>,
    },
    Result {
        text: String,
        #[serde(default)]
        session_id: Option<String>,
    },
    Error {
        message: String,
        /// Set when the error came from the process exiting.
        #[serde(default)]
        exit_code: Option<i32>,
        #[serde(default)]
        session_id: Option<String>,
    },
}

impl ProviderMessage {
    pub fn assistant_text(text: impl Into<String>, session_id: Option<String>) -> Self {
        ProviderMessage::Assistant {
            role: Role::Assistant,
            content: vec![ContentBlock::Text { text: text.into() }],
            session_id,
        }
    }

    pub fn error(message: impl Into<String>, exit_code: Option<i32>) -> Self {
        ProviderMessage::Error {
            message: message.into(),
            exit_code,
            session_id: None,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            ProviderMessage::Assistant { session_id, .. }
            | ProviderMessage::Result { session_id, .. }
            | ProviderMessage::Error { session_id, .. } => session_id.as_deref(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ProviderMessage::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_shape_is_tagged() {
        let msg = ProviderMessage::Assistant {
            role: Role::Assistant,
            content: vec![ContentBlock::ToolUse {
                id: "t1".into(),
                name: "Read".into(),
                input: json!({"file_path": "src/lib.rs"}),
            }],
            session_id: Some("s".into()),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "assistant",
                "role": "assistant",
                "content": [{"type": "tool_use", "id": "t1", "name": "Read", "input": {"file_path": "src/lib.rs"}}],
                "session_id": "s"
            })
        );
    }

    #[test]
    fn session_id_accessor() {
        let msg = ProviderMessage::Result {
            text: "done".into(),
            session_id: Some("abc".into()),
        };
        assert_eq!(msg.session_id(), Some("abc"));
        assert_eq!(ProviderMessage::error("x", Some(1)).session_id(), None);
        assert!(ProviderMessage::error("x", None).is_error());
    }
}
