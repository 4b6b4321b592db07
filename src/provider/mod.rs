//! Provider normalizers.
//!
//! A provider knows how to launch one agent tool and how to turn that tool's
//! proprietary stream records into [`ProviderMessage`]s. The provider set is
//! closed ([`ProviderKind`]) and looked up through a static table; nothing is
//! registered at runtime.
//!
//! # Model selectors
//!
//! | Selector | Provider | Model passed to the tool |
//! |----------|----------|--------------------------|
//! | `claude:opus` / `codex:gpt-5` | explicit prefix | the rest |
//! | `gpt-*`, `o1`, `o3-mini`, `codex-*` | Codex | as given |
//! | `claude-*`, `sonnet`, `opus`, `haiku`, anything else | Claude | as given |

pub mod claude;
pub mod codex;
pub mod errors;
pub mod message;

pub use errors::{ErrorClassification, ErrorKind, classify};
pub use message::{ContentBlock, ProviderMessage, Role};

use crate::config::ProviderProfile;
use crate::error::{DroverError, Result};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

/// Closed set of supported agent tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Claude,
    Codex,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Claude, ProviderKind::Codex];

    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Claude => "claude",
            ProviderKind::Codex => "codex",
        }
    }

    /// The provider implementation for this kind.
    pub fn provider(&self) -> &'static dyn Provider {
        match self {
            ProviderKind::Claude => &claude::ClaudeProvider,
            ProviderKind::Codex => &codex::CodexProvider,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderKind {
    type Err = DroverError;

    fn from_str(s: &str) -> Result<Self> {
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                DroverError::UserError(format!(
                    "unknown provider '{}' (expected one of: claude, codex)",
                    s
                ))
            })
    }
}

/// Resolve a model selector to the provider that serves it and the model name
/// to hand to that provider.
pub fn resolve_model(selector: &str) -> (ProviderKind, String) {
    let selector = selector.trim();

    if let Some((prefix, model)) = selector.split_once(':')
        && let Ok(kind) = prefix.parse::<ProviderKind>()
    {
        return (kind, model.trim().to_string());
    }

    let lower = selector.to_ascii_lowercase();
    let is_openai_reasoning = lower.len() >= 2
        && lower.starts_with('o')
        && lower[1..].starts_with(|c: char| c.is_ascii_digit());
    if lower.starts_with("gpt-") || lower.starts_with("codex") || is_openai_reasoning {
        return (ProviderKind::Codex, selector.to_string());
    }

    (ProviderKind::Claude, selector.to_string())
}

/// Everything a provider needs to build one invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    pub prompt: String,
    pub model: String,
    pub cwd: PathBuf,
    /// Provider session to resume instead of starting fresh.
    pub resume_session: Option<String>,
    pub image_paths: Vec<PathBuf>,
}

/// A fully built command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
    pub env: HashMap<String, String>,
}

impl Invocation {
    /// Apply a configured profile: replacement binary, extra args, environment.
    pub fn with_profile(mut self, profile: &ProviderProfile) -> Result<Self> {
        if let Some(command) = profile.command.as_deref().map(str::trim)
            && !command.is_empty()
        {
            self.program = command.to_string();
        }

        if !profile.args.trim().is_empty() {
            let extra = shell_words::split(&profile.args).map_err(|e| {
                DroverError::Config(format!(
                    "failed to parse provider args '{}': {}",
                    profile.args, e
                ))
            })?;
            self.args.extend(extra);
        }

        self.env.extend(
            profile
                .environment
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        Ok(self)
    }
}

/// Per-stream state threaded through `normalize`.
#[derive(Debug, Clone)]
pub struct StreamSession {
    pub session_id: Option<String>,
    pub started: Instant,
    /// Tool calls announced as started but not yet completed.
    pub open_tools: HashSet<String>,
    /// Most recent assistant text, for tools whose final record carries none.
    pub last_text: Option<String>,
}

impl StreamSession {
    pub fn new(session_id: Option<String>) -> Self {
        Self {
            session_id,
            started: Instant::now(),
            open_tools: HashSet::new(),
            last_text: None,
        }
    }

    /// Message for a failure the tool reported without any text.
    pub fn synthesized_failure(&self, provider: &str) -> String {
        format!(
            "{} run failed without an error message after {:.1}s (session {})",
            provider,
            self.started.elapsed().as_secs_f64(),
            self.session_id.as_deref().unwrap_or("none")
        )
    }
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Shared tool vocabulary.
pub const SHARED_TOOLS: [&str; 10] = [
    "Read",
    "Write",
    "Edit",
    "Bash",
    "Glob",
    "Grep",
    "WebSearch",
    "WebFetch",
    "TodoWrite",
    "Task",
];

/// Capability interface implemented once per agent tool.
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Binary name used when no profile overrides it.
    fn default_command(&self) -> &'static str;

    fn build_invocation(&self, request: &ExecutionRequest) -> Invocation;

    /// Map one raw stream record. `None` means the record carries nothing the
    /// orchestrator cares about.
    fn normalize(&self, record: &Value, session: &mut StreamSession) -> Option<ProviderMessage>;

    /// Tool-name table into [`SHARED_TOOLS`].
    fn tool_name_map(&self) -> &'static [(&'static str, &'static str)];

    fn install_hint(&self) -> &'static str;

    fn login_hint(&self) -> &'static str;

    fn classify_failure(&self, text: &str, exit_code: Option<i32>) -> ErrorClassification {
        let classification = classify(text, exit_code);
        match classification.kind {
            ErrorKind::NotInstalled => classification.with_suggestion(self.install_hint()),
            ErrorKind::NotAuthenticated => classification.with_suggestion(self.login_hint()),
            _ => classification,
        }
    }

    /// Translate a provider tool name into the shared vocabulary.
    fn shared_tool_name(&self, name: &str) -> String {
        self.tool_name_map()
            .iter()
            .find(|(from, _)| from.eq_ignore_ascii_case(name))
            .map(|(_, to)| (*to).to_string())
            .unwrap_or_else(|| name.to_string())
    }
}

/// Rewrite checklist items into the shared `{ todos: [{ content, status }] }`.
///
/// Accepts the common shapes tools emit: `{items: [{text, completed}]}`,
/// `{todos: [...]}`, or a bare array. Status strings are normalized to
/// `pending`, `in_progress` or `completed`.
pub fn translate_todos(input: &Value) -> Value {
    let items = input
        .get("items")
        .or_else(|| input.get("todos"))
        .or_else(|| input.get("plan"))
        .unwrap_or(input);

    let todos: Vec<Value> = items
        .as_array()
        .map(|items| items.iter().filter_map(translate_todo_item).collect())
        .unwrap_or_default();

    json!({ "todos": todos })
}

fn translate_todo_item(item: &Value) -> Option<Value> {
    if let Some(text) = item.as_str() {
        return Some(json!({ "content": text, "status": "pending" }));
    }

    let content = ["content", "text", "step", "description", "title"]
        .iter()
        .find_map(|key| item.get(*key).and_then(Value::as_str))?;

    let status = match item.get("status").and_then(Value::as_str) {
        Some(s) => normalize_todo_status(s),
        None => match item.get("completed").and_then(Value::as_bool) {
            Some(true) => "completed",
            _ => "pending",
        },
    };

    Some(json!({ "content": content, "status": status }))
}

fn normalize_todo_status(status: &str) -> &'static str {
    match status.to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
        "completed" | "complete" | "done" => "completed",
        "in_progress" | "active" | "running" | "doing" => "in_progress",
        _ => "pending",
    }
}
