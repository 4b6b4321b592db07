//! Execution orchestrator.
//!
//! Drives one feature from `backlog`/`ready`/`interrupted` to a terminal
//! status:
//!
//! 1. Acquire the feature's concurrency slot.
//! 2. Re-enter with a continuation prompt if an approved plan is waiting, or
//!    with a resume prompt if an interrupted provider session exists.
//! 3. Resolve the working directory (override, branch worktree, project root).
//! 4. Guarded transition to `in_progress`.
//! 5. Build the prompt and run the agent.
//! 6. Re-run with a continuation prompt while plan tasks remain unresolved,
//!    at most `max_incomplete_retries` times.
//! 7. Run the project's pipeline; a status it sets is final.
//! 8. Decide `verified` or `waiting_approval` from the transcript.
//! 9. Persist status and summary, emit telemetry, append learnings.
//! 10. Release the slot, whatever happened.
//!
//! Cancellation ends in `interrupted`; any other error ends in `backlog` with
//! the classified message recorded and, in auto mode, fed to the
//! [`FailureTracker`].

mod failure;
mod pipeline;
mod progress;
mod runner;
mod summary;
mod transcript;
mod verdict;


pub use failure::{FailureTracker, PauseReason};
pub use pipeline::{CommandPipeline, PipelineContext, PipelineRunner, StepResult, StepStatus};
pub use runner::{AgentRequest, AgentRunner, MessageStream, ProcessAgentRunner};
pub use summary::{extract_learnings, extract_summary, learnings_path};
pub use transcript::{TRANSCRIPT_FILE, Transcript};
pub use verdict::{DEFAULT_MIN_CHARS, TOOL_MARKER, terminal_status};

use crate::concurrency::{ConcurrencyManager, ExecutionContext, ReleaseOptions, SlotGuard};
use crate::config::{Config, SettingsProvider};
use crate::error::{DroverError, Result};
use crate::events::{Event, EventKind, EventSink};
use crate::feature::{Feature, FeatureDir, FeatureFiles, FeatureStatus, FeatureStore};
use crate::prompt::{PromptKind, build_prompt, load_project_instructions};
use crate::provider::{
    ErrorClassification, ErrorKind, ExecutionRequest, ProviderKind, ProviderMessage,
    resolve_model,
};
use crate::worktree::WorktreeResolver;
use serde_json::json;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Options for re-entrant calls.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Prompt to use instead of the feature prompt.
    pub continuation_prompt: Option<String>,
    /// Set on the orchestrator's own re-entry; the slot is reused.
    pub internal_call: bool,
}

/// The orchestrator's collaborators.
pub struct Collaborators {
    pub store: Arc<dyn FeatureStore>,
    pub worktrees: Arc<dyn WorktreeResolver>,
    pub pipeline: Arc<dyn PipelineRunner>,
    pub settings: Arc<dyn SettingsProvider>,
    pub events: Arc<dyn EventSink>,
    pub runner: Arc<dyn AgentRunner>,
}

pub struct ExecutionOrchestrator {
    concurrency: Arc<ConcurrencyManager>,
    failures: Arc<FailureTracker>,
    store: Arc<dyn FeatureStore>,
    worktrees: Arc<dyn WorktreeResolver>,
    pipeline: Arc<dyn PipelineRunner>,
    settings: Arc<dyn SettingsProvider>,
    events: Arc<dyn EventSink>,
    runner: Arc<dyn AgentRunner>,
}

/// Per-execution state shared by the steps.
struct Scope<'a> {
    project: &'a Path,
    feature_id: &'a str,
    use_worktrees: bool,
    is_auto_mode: bool,
    worktree_override: Option<&'a Path>,
    config: Config,
    provider: ProviderKind,
    model: String,
    run_id: Uuid,
    cancel: CancellationToken,
    started: Instant,
}

impl Scope<'_> {
    fn ensure_live(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(DroverError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind).with_feature(self.feature_id)
    }
}

enum Flow {
    /// This call ran the feature to `status`.
    Finished(FeatureStatus),
    /// A re-entrant call ran it; its result is final and already handled.
    Delegated(Result<FeatureStatus>),
}

type BoxedExecution<'a> = Pin<Box<dyn Future<Output = Result<FeatureStatus>> + Send + 'a>>;

impl ExecutionOrchestrator {
    pub fn new(
        concurrency: Arc<ConcurrencyManager>,
        failures: Arc<FailureTracker>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            concurrency,
            failures,
            store: collaborators.store,
            worktrees: collaborators.worktrees,
            pipeline: collaborators.pipeline,
            settings: collaborators.settings,
            events: collaborators.events,
            runner: collaborators.runner,
        }
    }

    pub fn concurrency(&self) -> &Arc<ConcurrencyManager> {
        &self.concurrency
    }

    pub fn failures(&self) -> &Arc<FailureTracker> {
        &self.failures
    }

    /// Run `feature_id` to a terminal status.
    ///
    /// Returns the status the feature finished in. Cancellation returns
    /// [`DroverError::Cancelled`] after the feature is set to `interrupted`.
    pub async fn execute_feature(
        &self,
        project: &Path,
        feature_id: &str,
        use_worktrees: bool,
        is_auto_mode: bool,
        worktree_override: Option<&Path>,
        options: ExecuteOptions,
    ) -> Result<FeatureStatus> {
        if is_auto_mode
            && !options.internal_call
            && let Some(reason) = self.failures.pause_reason()
        {
            return Err(DroverError::AutoPaused(reason.to_string()));
        }

        let config = self.settings.settings(project)?;
        let feature = self.store.load(project, feature_id).await?;
        let selector = feature
            .model
            .clone()
            .unwrap_or_else(|| config.default_model.clone());
        let (provider, model) = resolve_model(&selector);

        let record = self.concurrency.acquire(
            feature_id,
            ExecutionContext {
                project_path: project.to_path_buf(),
                model: model.clone(),
                provider,
                is_auto_mode,
            },
            options.internal_call,
        )?;
        let scope = Scope {
            project,
            feature_id,
            use_worktrees,
            is_auto_mode,
            worktree_override,
            config,
            provider,
            model,
            run_id: record.run_id,
            cancel: record.cancel.clone(),
            started: Instant::now(),
        };
        let slot = SlotGuard::new(self.concurrency.clone(), record);

        let result = match self.run(&scope, feature, options).await {
            Ok(Flow::Delegated(result)) => result,
            Ok(Flow::Finished(_)) if scope.cancel.is_cancelled() => {
                Err(self.on_cancelled(&scope).await)
            }
            Ok(Flow::Finished(status)) => Ok(status),
            Err(e) if e.is_cancellation() || scope.cancel.is_cancelled() => {
                Err(self.on_cancelled(&scope).await)
            }
            Err(e) => Err(self.on_failure(&scope, e).await),
        };

        slot.release();
        result
    }

    /// Stop a running execution.
    ///
    /// Writes `interrupted` before signalling so callers see the new status
    /// at once, then cancels and force-releases the slot. Returns `false` if
    /// nothing was running.
    pub async fn stop_feature(&self, feature_id: &str) -> bool {
        let Some(record) = self.concurrency.get(feature_id) else {
            return false;
        };

        if let Err(e) = self
            .store
            .update_status(&record.project_path, feature_id, FeatureStatus::Interrupted)
            .await
        {
            warn!(feature_id, error = %e, "failed to persist interrupted status");
        }
        record.cancel.cancel();
        self.concurrency
            .release(feature_id, ReleaseOptions::forced());
        info!(feature_id, run_id = %record.run_id, "stop requested");
        true
    }

    async fn run(&self, scope: &Scope<'_>, feature: Feature, options: ExecuteOptions) -> Result<Flow> {
        if !options.internal_call
            && let Some(kind) = reentry_kind(&feature)
        {
            let instructions = load_project_instructions(scope.project, &scope.config).await;
            let prompt = build_prompt(
                kind,
                &feature,
                &scope.config.prompt_templates,
                &instructions,
            )?;
            info!(feature_id = scope.feature_id, ?kind, "re-entering execution");

            let inner = self.reenter(scope, prompt).await;
            return Ok(Flow::Delegated(inner));
        }

        let working_dir = self.resolve_working_dir(scope, &feature).await?;

        if !self
            .store
            .mark_in_progress(scope.project, scope.feature_id)
            .await?
        {
            debug!(feature_id = scope.feature_id, status = %feature.status, "status left unchanged");
        }
        let mut feature = self.store.load(scope.project, scope.feature_id).await?;

        let files = FeatureDir::new(scope.project, scope.feature_id)?;
        let instructions = load_project_instructions(scope.project, &scope.config).await;
        let is_continuation = options.continuation_prompt.is_some();
        let mut transcript = if is_continuation {
            Transcript::resume(files.read(TRANSCRIPT_FILE).await?.unwrap_or_default())
        } else {
            Transcript::new()
        };
        let mut prompt = match options.continuation_prompt {
            Some(prompt) => prompt,
            None => build_prompt(
                PromptKind::Feature,
                &feature,
                &scope.config.prompt_templates,
                &instructions,
            )?,
        };
        let mut resume_session = if is_continuation {
            feature.session_id.clone()
        } else {
            None
        };

        let mut retries = 0;
        loop {
            self.invoke(
                scope,
                &working_dir,
                &files,
                &mut feature,
                &mut transcript,
                prompt,
                resume_session.take(),
            )
            .await?;

            feature = self.store.load(scope.project, scope.feature_id).await?;
            let unresolved = feature.unresolved_tasks().len();
            if unresolved == 0 {
                break;
            }
            if retries >= scope.config.max_incomplete_retries {
                warn!(
                    feature_id = scope.feature_id,
                    unresolved, retries, "giving up on unresolved tasks"
                );
                break;
            }
            scope.ensure_live()?;

            retries += 1;
            info!(feature_id = scope.feature_id, unresolved, retry = retries, "tasks remain; continuing");
            self.events.emit(scope.event(EventKind::RetryScheduled).with_details(json!({
                "retry": retries,
                "unresolved": feature
                    .unresolved_tasks()
                    .iter()
                    .map(|t| t.id.as_str())
                    .collect::<Vec<_>>(),
            })));
            transcript.section(&format!("Follow-up {}", retries));
            prompt = build_prompt(
                PromptKind::Continuation,
                &feature,
                &scope.config.prompt_templates,
                &instructions,
            )?;
            resume_session = feature.session_id.clone();
        }

        let steps = scope.config.pipeline_steps(&feature.excluded_pipeline_steps);
        if !steps.is_empty() {
            let before = feature.status;
            let context = PipelineContext {
                project: scope.project.to_path_buf(),
                feature_id: scope.feature_id.to_string(),
                working_dir: working_dir.clone(),
                branch: feature.branch_name.clone(),
                steps,
                cancel: scope.cancel.clone(),
            };
            self.pipeline.execute(&context).await?;
            scope.ensure_live()?;

            feature = self.store.load(scope.project, scope.feature_id).await?;
            if feature.status != before {
                info!(feature_id = scope.feature_id, status = %feature.status, "pipeline settled status");
                self.complete(scope, &feature, retries);
                return Ok(Flow::Finished(feature.status));
            }
        }

        let status = terminal_status(
            transcript.as_str(),
            feature.skip_tests,
            scope.config.verification_min_chars,
        );
        scope.ensure_live()?;

        feature.set_status(status);
        feature.summary = summary::extract_summary(transcript.recorded(), transcript.last_text());
        feature.session_id = None;
        feature.last_error = None;
        self.store.save(scope.project, &feature).await?;
        self.complete(scope, &feature, retries);

        let learnings = summary::extract_learnings(transcript.recorded());
        if let Err(e) = summary::append_learnings(scope.project, scope.feature_id, &learnings).await {
            warn!(feature_id = scope.feature_id, error = %e, "failed to record learnings");
        }

        Ok(Flow::Finished(status))
    }

    /// Re-entrant call, boxed so `execute_feature` can recurse.
    fn reenter<'a>(&'a self, scope: &Scope<'a>, prompt: String) -> BoxedExecution<'a> {
        Box::pin(self.execute_feature(
            scope.project,
            scope.feature_id,
            scope.use_worktrees,
            scope.is_auto_mode,
            scope.worktree_override,
            ExecuteOptions {
                continuation_prompt: Some(prompt),
                internal_call: true,
            },
        ))
    }

    /// One agent invocation, streamed to the end.
    #[allow(clippy::too_many_arguments)]
    async fn invoke(
        &self,
        scope: &Scope<'_>,
        working_dir: &Path,
        files: &FeatureDir,
        feature: &mut Feature,
        transcript: &mut Transcript,
        prompt: String,
        resume_session: Option<String>,
    ) -> Result<()> {
        let request = AgentRequest {
            provider: scope.provider,
            execution: ExecutionRequest {
                prompt,
                model: scope.model.clone(),
                cwd: working_dir.to_path_buf(),
                resume_session: resume_session.clone(),
                image_paths: feature.image_paths.clone(),
            },
            profile: scope.config.provider_profile(scope.provider).cloned(),
            idle_timeout: scope.config.idle_timeout(),
        };

        self.events.emit(scope.event(EventKind::AgentStarted).with_details(json!({
            "provider": scope.provider.name(),
            "model": scope.model,
            "working_dir": working_dir,
            "run_id": scope.run_id,
            "resume_session": resume_session,
        })));

        let mut stream = self.runner.start(request, scope.cancel.clone())?;
        let mut failure: Option<(String, Option<i32>)> = None;

        while let Some(message) = stream.next().await {
            if let Some(id) = message.session_id()
                && feature.session_id.as_deref() != Some(id)
            {
                debug!(feature_id = scope.feature_id, session_id = id, "captured provider session");
                feature.session_id = Some(id.to_string());
            }

            transcript.record(&message);

            if let Some(plan) = feature.plan.as_mut() {
                for (task_id, status) in progress::apply_message(plan, &message) {
                    info!(feature_id = scope.feature_id, task_id = %task_id, ?status, "task progress");
                    self.events.emit(scope.event(EventKind::TaskProgress).with_details(json!({
                        "task": task_id,
                        "status": status,
                    })));
                }
            }

            if let ProviderMessage::Error {
                message: text,
                exit_code,
                ..
            } = &message
            {
                match &mut failure {
                    None => failure = Some((text.clone(), *exit_code)),
                    Some((_, code)) if code.is_none() => *code = *exit_code,
                    Some(_) => {}
                }
            }

            self.events.emit(
                scope
                    .event(EventKind::AgentMessage)
                    .with_details(serde_json::to_value(&message).unwrap_or_default()),
            );
        }

        if let Err(e) = files.write(TRANSCRIPT_FILE, transcript.as_str()).await {
            warn!(feature_id = scope.feature_id, error = %e, "failed to write transcript");
        }
        self.persist_progress(scope, feature).await?;
        scope.ensure_live()?;

        match failure {
            Some((text, exit_code)) => Err(DroverError::Agent(
                scope.provider.provider().classify_failure(&text, exit_code),
            )),
            None => Ok(()),
        }
    }

    /// Store plan progress and the session id without touching the status,
    /// which `stop_feature` may have changed meanwhile.
    async fn persist_progress(&self, scope: &Scope<'_>, feature: &Feature) -> Result<()> {
        let mut stored = self.store.load(scope.project, scope.feature_id).await?;
        if stored.plan == feature.plan && stored.session_id == feature.session_id {
            return Ok(());
        }
        stored.plan = feature.plan.clone();
        stored.session_id = feature.session_id.clone();
        self.store.save(scope.project, &stored).await
    }

    async fn resolve_working_dir(&self, scope: &Scope<'_>, feature: &Feature) -> Result<PathBuf> {
        let dir = if let Some(path) = scope.worktree_override {
            path.to_path_buf()
        } else if scope.use_worktrees
            && let Some(branch) = feature.branch_name.as_deref()
        {
            match self
                .worktrees
                .find_worktree_for_branch(scope.project, branch)
                .await
            {
                Ok(Some(path)) => path,
                Ok(None) => {
                    debug!(feature_id = scope.feature_id, branch, "no worktree for branch; using project root");
                    scope.project.to_path_buf()
                }
                Err(e) => {
                    warn!(feature_id = scope.feature_id, branch, error = %e, "worktree lookup failed; using project root");
                    scope.project.to_path_buf()
                }
            }
        } else {
            scope.project.to_path_buf()
        };

        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => {}
            _ => return Err(DroverError::InvalidWorkingDirectory(dir)),
        }

        for other in self.concurrency.running() {
            if other.feature_id != scope.feature_id && other.working_dir() == dir {
                warn!(
                    feature_id = scope.feature_id,
                    other = %other.feature_id,
                    dir = %dir.display(),
                    "working directory is shared with another running feature"
                );
            }
        }

        let branch = feature.branch_name.clone();
        let worktree = dir.clone();
        self.concurrency.update(scope.feature_id, move |record| {
            record.worktree = Some(worktree);
            record.branch = branch;
        });
        Ok(dir)
    }

    fn complete(&self, scope: &Scope<'_>, feature: &Feature, retries: u32) {
        if scope.is_auto_mode {
            self.failures.record_success();
        }
        info!(
            feature_id = scope.feature_id,
            status = %feature.status,
            elapsed_secs = scope.started.elapsed().as_secs(),
            retries,
            "feature finished"
        );
        self.events.emit(scope.event(EventKind::FeatureCompleted).with_details(json!({
            "status": feature.status,
            "duration_ms": scope.started.elapsed().as_millis() as u64,
            "retries": retries,
            "summary": feature.summary,
        })));
    }

    async fn on_cancelled(&self, scope: &Scope<'_>) -> DroverError {
        if let Err(e) = self
            .store
            .update_status(scope.project, scope.feature_id, FeatureStatus::Interrupted)
            .await
        {
            warn!(feature_id = scope.feature_id, error = %e, "failed to persist interrupted status");
        }
        info!(feature_id = scope.feature_id, "execution interrupted");
        self.events.emit(scope.event(EventKind::FeatureInterrupted).with_details(json!({
            "duration_ms": scope.started.elapsed().as_millis() as u64,
        })));
        DroverError::Cancelled
    }

    async fn on_failure(&self, scope: &Scope<'_>, error: DroverError) -> DroverError {
        let classification = classify_error(scope.provider, &error);
        warn!(
            feature_id = scope.feature_id,
            kind = %classification.kind,
            error = %classification.message,
            "execution failed"
        );

        match self.store.load(scope.project, scope.feature_id).await {
            Ok(mut feature) => {
                feature.set_status(FeatureStatus::Backlog);
                feature.last_error = Some(match &classification.suggestion {
                    Some(suggestion) => format!("{} ({})", classification.message, suggestion),
                    None => classification.message.clone(),
                });
                if let Err(e) = self.store.save(scope.project, &feature).await {
                    warn!(feature_id = scope.feature_id, error = %e, "failed to persist backlog status");
                }
            }
            Err(e) => warn!(feature_id = scope.feature_id, error = %e, "failed to reload feature after error"),
        }

        self.events.emit(scope.event(EventKind::FeatureFailed).with_details(json!({
            "kind": classification.kind,
            "message": classification.message,
            "suggestion": classification.suggestion,
            "recoverable": classification.recoverable,
        })));

        if scope.is_auto_mode
            && let Some(reason) = self.failures.record_failure(&classification)
        {
            self.events.emit(scope.event(EventKind::AutoPaused).with_details(json!({
                "kind": reason.kind,
                "count": reason.count,
                "message": reason.message,
                "suggestion": reason.suggestion,
            })));
        }

        match error {
            DroverError::Spawn { .. } => DroverError::Agent(classification),
            other => other,
        }
    }
}

/// Which prompt a top-level call re-enters with, if any.
fn reentry_kind(feature: &Feature) -> Option<PromptKind> {
    if feature.plan.as_ref().is_some_and(|p| p.awaiting_execution()) {
        Some(PromptKind::Continuation)
    } else if feature.session_id.is_some() && feature.status == FeatureStatus::Interrupted {
        Some(PromptKind::Resume)
    } else {
        None
    }
}

fn classify_error(provider: ProviderKind, error: &DroverError) -> ErrorClassification {
    match error {
        DroverError::Agent(classification) => classification.clone(),
        DroverError::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
            provider.provider().classify_failure(&error.to_string(), Some(127))
        }
        DroverError::Spawn { .. } => provider.provider().classify_failure(&error.to_string(), None),
        other => ErrorClassification::new(ErrorKind::Unknown, other.to_string()),
    }
}
