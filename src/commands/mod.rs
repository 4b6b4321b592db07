//! Command implementations for drover.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations.

mod classify;
mod providers;
mod run;
mod show;

use crate::cli::Command;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Dispatch a command to its implementation.
pub async fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Run(args) => run::cmd_run(args).await,
        Command::Show(args) => show::cmd_show(args).await,
        Command::Classify(args) => classify::cmd_classify(args),
        Command::Providers(args) => providers::cmd_providers(args),
    }
}

/// The `--project` argument, or the current directory.
fn project_root(project: Option<PathBuf>) -> Result<PathBuf> {
    match project {
        Some(path) => Ok(path),
        None => std::env::current_dir().context("failed to determine current directory"),
    }
}
