//! Slot record types.

use crate::provider::ProviderKind;
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// What the caller knows at acquire time.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub project_path: PathBuf,
    pub model: String,
    pub provider: ProviderKind,
    pub is_auto_mode: bool,
}

/// Bookkeeping for one live execution.
#[derive(Debug, Clone)]
pub struct RunningExecution {
    pub feature_id: String,

    /// Identifies this run; releases carrying a different id are ignored.
    pub run_id: Uuid,

    /// Cancelling this token stops the agent process.
    pub cancel: CancellationToken,

    pub started_at: DateTime<Utc>,

    pub project_path: PathBuf,

    /// Resolved working directory, once known.
    pub worktree: Option<PathBuf>,

    pub branch: Option<String>,

    pub model: String,

    pub provider: ProviderKind,

    pub is_auto_mode: bool,

    /// Number of holders sharing this record through reusable acquires.
    pub leases: u32,
}

impl RunningExecution {
    pub(super) fn new(feature_id: &str, context: ExecutionContext) -> Self {
        Self {
            feature_id: feature_id.to_string(),
            run_id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
            started_at: Utc::now(),
            project_path: context.project_path,
            worktree: None,
            branch: None,
            model: context.model,
            provider: context.provider,
            is_auto_mode: context.is_auto_mode,
            leases: 1,
        }
    }

    /// Directory the agent runs in.
    pub fn working_dir(&self) -> &Path {
        self.worktree.as_deref().unwrap_or(&self.project_path)
    }

    pub fn age(&self) -> Duration {
        Utc::now().signed_duration_since(self.started_at)
    }

    /// Format the age as a human-readable string.
    pub fn age_string(&self) -> String {
        let age = self.age();
        let seconds = age.num_seconds();
        let minutes = age.num_minutes();
        let hours = age.num_hours();

        if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds % 60)
        } else {
            format!("{}s", seconds)
        }
    }
}

impl std::fmt::Display for RunningExecution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}:{}, running {}, in {}{})",
            self.feature_id,
            self.provider,
            self.model,
            self.age_string(),
            self.working_dir().display(),
            if self.is_auto_mode { ", auto" } else { "" }
        )
    }
}

/// Options for [`super::ConcurrencyManager::release`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReleaseOptions {
    /// Remove the record regardless of outstanding leases.
    pub force: bool,

    /// Only release if the record still belongs to this run.
    pub run_id: Option<Uuid>,
}

impl ReleaseOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            run_id: None,
        }
    }

    pub fn for_run(run_id: Uuid) -> Self {
        Self {
            force: false,
            run_id: Some(run_id),
        }
    }
}
