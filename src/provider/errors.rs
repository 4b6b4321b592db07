//! Shared failure taxonomy.
//!
//! Every provider funnels its failures through [`classify`], which matches the
//! failure text against known patterns and falls back to exit-code heuristics.
//! Providers decorate the result with their own remediation hints.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Closed set of failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotInstalled,
    NotAuthenticated,
    RateLimited,
    ModelUnavailable,
    NetworkError,
    ProcessCrashed,
    Timeout,
    Unknown,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::NotInstalled,
        ErrorKind::NotAuthenticated,
        ErrorKind::RateLimited,
        ErrorKind::ModelUnavailable,
        ErrorKind::NetworkError,
        ErrorKind::ProcessCrashed,
        ErrorKind::Timeout,
        ErrorKind::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotInstalled => "not_installed",
            ErrorKind::NotAuthenticated => "not_authenticated",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ModelUnavailable => "model_unavailable",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::ProcessCrashed => "process_crashed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Whether retrying later without user action can succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited
                | ErrorKind::NetworkError
                | ErrorKind::ProcessCrashed
                | ErrorKind::Timeout
        )
    }

    /// Kinds that make every subsequent run fail too, so auto mode should
    /// stop at the first occurrence.
    pub fn pauses_immediately(&self) -> bool {
        matches!(self, ErrorKind::NotInstalled | ErrorKind::NotAuthenticated)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure, ready to show to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub kind: ErrorKind,
    pub message: String,
    pub recoverable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ErrorClassification {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            recoverable: kind.is_recoverable(),
            suggestion: default_suggestion(kind).map(str::to_string),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

static NOT_AUTHENTICATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)not (logged in|authenticated)|unauthori[sz]ed|\b401\b|invalid (api[ _-]?key|x-api-key|token)|authentication (failed|required|error)|please run /login|login required|credentials? (expired|missing)",
    )
    .expect("Invalid auth regex")
});

static RATE_LIMITED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)rate[ _-]?limit|\b429\b|too many requests|quota exceeded|usage limit|overloaded",
    )
    .expect("Invalid rate limit regex")
});

static MODEL_UNAVAILABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)model[ _-]not[ _-]found|unknown model|invalid model|model (\S+ )?(is )?not (available|supported)|does not have access to (the )?model|unsupported model",
    )
    .expect("Invalid model regex")
});

static NOT_INSTALLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)command not found|not found in \$?path|is not installed|\benoent\b|no such file or directory")
        .expect("Invalid install regex")
});

static NETWORK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(econnrefused|econnreset|etimedout|enotfound|eai_again)\b|network (error|unreachable)|connection (refused|reset|closed)|socket hang up|getaddrinfo|dns (lookup|resolution)",
    )
    .expect("Invalid network regex")
});

static TIMEOUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)timed out|\btimeout\b").expect("Invalid timeout regex"));

static CRASH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)segmentation fault|\bsigsegv\b|\bsigkill\b|out of memory|killed by signal|\bpanicked\b")
        .expect("Invalid crash regex")
});

/// Classify a failure from its text and, when known, the process exit code.
pub fn classify(text: &str, exit_code: Option<i32>) -> ErrorClassification {
    let message = if text.trim().is_empty() {
        match exit_code {
            Some(code) => format!("agent exited with code {}", code),
            None => "agent failed without an error message".to_string(),
        }
    } else {
        text.trim().to_string()
    };

    if exit_code == Some(127) {
        return ErrorClassification::new(ErrorKind::NotInstalled, message);
    }

    let by_pattern = [
        (&*NOT_AUTHENTICATED, ErrorKind::NotAuthenticated),
        (&*RATE_LIMITED, ErrorKind::RateLimited),
        (&*MODEL_UNAVAILABLE, ErrorKind::ModelUnavailable),
        (&*NOT_INSTALLED, ErrorKind::NotInstalled),
        (&*NETWORK, ErrorKind::NetworkError),
        (&*TIMEOUT, ErrorKind::Timeout),
    ]
    .into_iter()
    .find(|(pattern, _)| pattern.is_match(text))
    .map(|(_, kind)| kind);

    if let Some(kind) = by_pattern {
        return ErrorClassification::new(kind, message);
    }

    match exit_code {
        Some(137) => ErrorClassification::new(ErrorKind::ProcessCrashed, message).with_suggestion(
            "The agent was killed (SIGKILL), usually by the OS under memory pressure. \
             Close other processes or reduce parallel runs, then retry.",
        ),
        Some(139) => ErrorClassification::new(ErrorKind::ProcessCrashed, message)
            .with_suggestion("The agent crashed with a segmentation fault (SIGSEGV). Retry; update the agent tool if it persists."),
        _ if CRASH.is_match(text) => ErrorClassification::new(ErrorKind::ProcessCrashed, message),
        _ => ErrorClassification::new(ErrorKind::Unknown, message),
    }
}

fn default_suggestion(kind: ErrorKind) -> Option<&'static str> {
    match kind {
        ErrorKind::NotInstalled => Some("Install the agent CLI and make sure it is on PATH."),
        ErrorKind::NotAuthenticated => Some("Log in to the agent CLI, then retry."),
        ErrorKind::RateLimited => {
            Some("The provider is rate limiting requests. Wait a few minutes before retrying.")
        }
        ErrorKind::ModelUnavailable => {
            Some("Pick a different model or check that your account has access to it.")
        }
        ErrorKind::NetworkError => Some("Check your network connection and retry."),
        ErrorKind::ProcessCrashed => Some("The agent process crashed. Retry the feature."),
        ErrorKind::Timeout => {
            Some("The agent stopped producing output. Retry, or raise idle_timeout_secs.")
        }
        ErrorKind::Unknown => None,
    }
}
