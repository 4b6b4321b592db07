//! Implementation of the `drover run` command.
//!
//! Wires the file-backed collaborators into an orchestrator, runs one
//! feature and prints progress from the event bus. Ctrl-C stops the agent.

use crate::cli::RunArgs;
use anyhow::Result;
use drover::concurrency::ConcurrencyManager;
use drover::config::{Config, ProjectSettings};
use drover::events::{BroadcastBus, Event, EventKind, EventLog, FanOut};
use drover::feature::FileFeatureStore;
use drover::orchestrator::{
    Collaborators, CommandPipeline, ExecuteOptions, ExecutionOrchestrator, FailureTracker,
    ProcessAgentRunner,
};
use drover::worktree::GitWorktreeResolver;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

/// Execute the `drover run` command.
pub async fn cmd_run(args: RunArgs) -> Result<()> {
    let project = super::project_root(args.project)?;
    let config = Config::load_for_project(&project)?;

    let store = Arc::new(FileFeatureStore::new());
    let bus = Arc::new(BroadcastBus::default());
    let events = Arc::new(
        FanOut::new()
            .with(Arc::new(EventLog::for_project(&project)))
            .with(bus.clone()),
    );
    let orchestrator = ExecutionOrchestrator::new(
        Arc::new(ConcurrencyManager::new()),
        Arc::new(FailureTracker::from_config(&config.auto_pause)),
        Collaborators {
            store: store.clone(),
            worktrees: Arc::new(GitWorktreeResolver),
            pipeline: Arc::new(CommandPipeline::new(store, events.clone())),
            settings: Arc::new(ProjectSettings),
            events,
            runner: Arc::new(ProcessAgentRunner),
        },
    );

    let progress = tokio::spawn(report_progress(bus.subscribe()));

    let execution = orchestrator.execute_feature(
        &project,
        &args.feature_id,
        args.worktrees,
        args.auto,
        args.worktree.as_deref(),
        ExecuteOptions::default(),
    );
    tokio::pin!(execution);

    let result = tokio::select! {
        result = &mut execution => result,
        _ = tokio::signal::ctrl_c() => {
            warn!(feature_id = %args.feature_id, "interrupt received, stopping agent");
            orchestrator.stop_feature(&args.feature_id).await;
            execution.await
        }
    };
    progress.abort();

    let status = result?;
    println!("{}: {}", args.feature_id, status);
    Ok(())
}

async fn report_progress(mut events: broadcast::Receiver<Event>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(line) = describe(&event) {
                    eprintln!("{}", line);
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "progress output fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// One line of human-readable progress, for the events worth showing.
fn describe(event: &Event) -> Option<String> {
    let d = &event.details;
    let line = match event.kind {
        EventKind::AgentStarted => format!(
            "▶ {} ({}) in {}",
            d["provider"].as_str().unwrap_or("agent"),
            d["model"].as_str().unwrap_or("default model"),
            d["working_dir"].as_str().unwrap_or(".")
        ),
        EventKind::TaskProgress => format!(
            "  task {} {}",
            d["task"].as_str().unwrap_or("?"),
            d["status"].as_str().unwrap_or("updated")
        ),
        EventKind::RetryScheduled => format!("↻ follow-up {} for unfinished tasks", d["retry"]),
        EventKind::PipelineStep => format!(
            "  {} {}",
            if d["passed"].as_bool() == Some(true) { "✓" } else { "✗" },
            d["name"].as_str().unwrap_or("step")
        ),
        EventKind::FeatureFailed => format!(
            "✗ {}: {}",
            d["kind"].as_str().unwrap_or("unknown"),
            d["suggestion"]
                .as_str()
                .or(d["message"].as_str())
                .unwrap_or("")
        ),
        EventKind::AutoPaused => format!(
            "⏸ auto mode paused after {} {} failures",
            d["count"],
            d["kind"].as_str().unwrap_or("")
        ),
        _ => return None,
    };
    Some(line)
}
