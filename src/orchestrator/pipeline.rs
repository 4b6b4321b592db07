//! Post-execution pipeline.
//!
//! After the agent finishes, the project's configured steps run in order in
//! the feature's working directory. A pipeline may settle the feature's
//! status itself (a failed `merge` step sets `merge_conflict`); the
//! orchestrator then leaves that status alone.

use crate::config::{PipelineStep, PipelineStepKind};
use crate::error::{DroverError, Result};
use crate::events::{Event, EventKind, EventSink};
use crate::feature::{FeatureStatus, FeatureStore};
use async_trait::async_trait;
use serde_json::json;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Maximum number of output lines kept in a failure message.
pub const FAILURE_MAX_LINES: usize = 50;

/// Maximum characters kept in a failure message.
pub const FAILURE_MAX_CHARS: usize = 4096;

/// Everything a pipeline needs to run for one feature.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub project: PathBuf,
    pub feature_id: String,
    pub working_dir: PathBuf,
    pub branch: Option<String>,
    /// Non-excluded steps, already in execution order.
    pub steps: Vec<PipelineStep>,
    /// Cancelled by `stop_feature`; kills the running step.
    pub cancel: CancellationToken,
}

#[async_trait]
pub trait PipelineRunner: Send + Sync {
    async fn execute(&self, context: &PipelineContext) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone)]
pub struct StepResult {
    pub id: String,
    pub name: String,
    pub status: StepStatus,
    pub message: Option<String>,
}

impl StepResult {
    fn pass(step: &PipelineStep) -> Self {
        Self {
            id: step.id.clone(),
            name: step.display_name().to_string(),
            status: StepStatus::Pass,
            message: None,
        }
    }

    fn fail(step: &PipelineStep, message: impl Into<String>) -> Self {
        Self {
            id: step.id.clone(),
            name: step.display_name().to_string(),
            status: StepStatus::Fail,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Pass
    }
}

/// Runs each step's command line with shell-words splitting.
pub struct CommandPipeline {
    store: Arc<dyn FeatureStore>,
    events: Arc<dyn EventSink>,
}

impl CommandPipeline {
    pub fn new(store: Arc<dyn FeatureStore>, events: Arc<dyn EventSink>) -> Self {
        Self { store, events }
    }
}

#[async_trait]
impl PipelineRunner for CommandPipeline {
    async fn execute(&self, context: &PipelineContext) -> Result<()> {
        for step in &context.steps {
            if context.cancel.is_cancelled() {
                return Err(DroverError::Cancelled);
            }
            let result = run_step(step, context).await?;
            self.events.emit(
                Event::new(EventKind::PipelineStep)
                    .with_feature(&context.feature_id)
                    .with_details(json!({
                        "step": result.id,
                        "name": result.name,
                        "passed": result.is_success(),
                        "message": result.message,
                    })),
            );

            if result.is_success() {
                info!(feature_id = %context.feature_id, step = %step.id, "pipeline step passed");
                continue;
            }

            let message = result.message.unwrap_or_default();
            match step.kind {
                PipelineStepKind::Merge => {
                    warn!(feature_id = %context.feature_id, step = %step.id, "merge step failed");
                    self.store
                        .update_status(
                            &context.project,
                            &context.feature_id,
                            FeatureStatus::MergeConflict,
                        )
                        .await?;
                    return Ok(());
                }
                PipelineStepKind::Command => {
                    return Err(DroverError::Pipeline(format!(
                        "{}: {}",
                        step.display_name(),
                        message
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Run one step. Cancellation kills the command and returns
/// [`DroverError::Cancelled`]; every other problem is a failed step.
async fn run_step(step: &PipelineStep, context: &PipelineContext) -> Result<StepResult> {
    let command = step.command.trim();
    let args = match shell_words::split(command) {
        Ok(args) if !args.is_empty() => args,
        Ok(_) => return Ok(StepResult::fail(step, "command is empty")),
        Err(e) => {
            return Ok(StepResult::fail(
                step,
                format!(
                    "failed to parse command: {}\nCommand: {}\nFix: check for unmatched quotes or invalid escape sequences.",
                    e, command
                ),
            ));
        }
    };

    let mut cmd = Command::new(&args[0]);
    cmd.args(&args[1..])
        .current_dir(&context.working_dir)
        .env("DROVER_FEATURE_ID", &context.feature_id)
        .env("DROVER_PROJECT", &context.project)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(branch) = &context.branch {
        cmd.env("DROVER_BRANCH", branch);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return Ok(StepResult::fail(
                step,
                format!(
                    "failed to execute command: {}\nCommand: {}\nFix: ensure the command is installed and in PATH.",
                    e, command
                ),
            ));
        }
    };
    let stdout = tokio::spawn(read_all(child.stdout.take()));
    let stderr = tokio::spawn(read_all(child.stderr.take()));

    let status = tokio::select! {
        biased;
        _ = context.cancel.cancelled() => {
            warn!(feature_id = %context.feature_id, step = %step.id, "pipeline step cancelled; killing it");
            let _ = child.start_kill();
            let _ = child.wait().await;
            stdout.abort();
            stderr.abort();
            return Err(DroverError::Cancelled);
        }
        status = child.wait() => status,
    };

    let status = match status {
        Ok(status) => status,
        Err(e) => {
            return Ok(StepResult::fail(
                step,
                format!("failed to wait for command: {}\nCommand: {}", e, command),
            ));
        }
    };
    if status.success() {
        return Ok(StepResult::pass(step));
    }

    let stdout = stdout.await.unwrap_or_default();
    let stderr = stderr.await.unwrap_or_default();
    let stdout = String::from_utf8_lossy(&stdout);
    let stderr = String::from_utf8_lossy(&stderr);
    let combined = if stderr.is_empty() {
        stdout.to_string()
    } else {
        format!("{}\n{}", stdout, stderr)
    };

    let mut msg = format!(
        "command failed with exit code {}\nCommand: {}\n",
        status.code().unwrap_or(-1),
        command
    );
    let truncated = truncate_output(&combined, FAILURE_MAX_LINES, FAILURE_MAX_CHARS);
    if !truncated.trim().is_empty() {
        msg.push_str("\nOutput (truncated):\n```\n");
        msg.push_str(&truncated);
        msg.push_str("\n```\n");
    }
    Ok(StepResult::fail(step, msg))
}

async fn read_all<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut out = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut out).await;
    }
    out
}

/// Keep the tail of `output`: at most `max_lines` lines and `max_chars` characters.
fn truncate_output(output: &str, max_lines: usize, max_chars: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let tail = if lines.len() > max_lines {
        &lines[lines.len() - max_lines..]
    } else {
        &lines[..]
    };
    let result = tail.join("\n");

    let count = result.chars().count();
    if count > max_chars {
        let kept: String = result.chars().skip(count - max_chars).collect();
        format!("...(truncated)...\n{}", kept)
    } else {
        result
    }
}
