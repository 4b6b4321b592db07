//! Implementation of the `drover show` command.
//!
//! Displays the status and metadata of a feature.

use crate::cli::ShowArgs;
use anyhow::Result;
use drover::feature::{FeatureStore, FileFeatureStore, TaskStatus};
use drover::orchestrator::TRANSCRIPT_FILE;

/// Execute the `drover show` command.
pub async fn cmd_show(args: ShowArgs) -> Result<()> {
    let project = super::project_root(args.project)?;
    let feature = FileFeatureStore::new()
        .load(&project, &args.feature_id)
        .await?;

    println!("================================================================================");
    println!("{} [{}]", feature.id, feature.status);
    println!("================================================================================");
    println!();

    println!("Title:      {}", feature.title);
    if let Some(model) = &feature.model {
        println!("Model:      {}", model);
    }
    if let Some(started) = feature.started_at {
        println!("Started:    {}", started.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(updated) = feature.updated_at {
        println!("Updated:    {}", updated.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(branch) = &feature.branch_name {
        println!("Branch:     {}", branch);
    }
    if let Some(session) = &feature.session_id {
        println!("Session:    {} (resumable)", session);
    }

    if let Some(plan) = &feature.plan {
        println!();
        println!("Plan ({:?}):", plan.status);
        for task in &plan.tasks {
            let mark = match task.status {
                TaskStatus::Completed => "x",
                TaskStatus::InProgress => "~",
                TaskStatus::Pending => " ",
            };
            println!("  [{}] {} {}", mark, task.id, task.description);
        }
    }

    if let Some(summary) = &feature.summary {
        println!();
        println!("Summary:");
        println!("{}", summary);
    }

    if let Some(error) = &feature.last_error {
        println!();
        println!("Last error:");
        println!("{}", error);
    }

    let transcript = FileFeatureStore::feature_dir(&project, &feature.id).join(TRANSCRIPT_FILE);
    if transcript.is_file() {
        println!();
        println!("Transcript: {}", transcript.display());
    }

    Ok(())
}
