//! CLI argument parsing for drover.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Drover: drives coding-agent CLIs to finish features.
///
/// Features live under `.drover/features/<id>/feature.json` in the project.
/// Each run spawns the configured agent, streams its output into a
/// transcript and settles the feature's status when the agent is done.
#[derive(Parser, Debug)]
#[command(name = "drover")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for drover.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an agent on a feature until it reaches a terminal status.
    ///
    /// Ctrl-C stops the agent and leaves the feature `interrupted`; the next
    /// run resumes the provider session.
    Run(RunArgs),

    /// Show a feature's status, plan and last error.
    Show(ShowArgs),

    /// Classify an agent failure message.
    ///
    /// Prints the error kind, whether it is recoverable and the suggested
    /// fix as JSON.
    Classify(ClassifyArgs),

    /// List supported providers and the commands they run.
    Providers(ProvidersArgs),
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Feature ID to run.
    pub feature_id: String,

    /// Project root. Defaults to the current directory.
    #[arg(short, long)]
    pub project: Option<PathBuf>,

    /// Run in the git worktree checked out for the feature's branch, if any.
    #[arg(long)]
    pub worktrees: bool,

    /// Auto mode: refuse to start while paused after repeated failures.
    #[arg(long)]
    pub auto: bool,

    /// Run in this directory instead of resolving one.
    #[arg(long, value_name = "PATH")]
    pub worktree: Option<PathBuf>,
}

/// Arguments for the `show` command.
#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Feature ID to show.
    pub feature_id: String,

    /// Project root. Defaults to the current directory.
    #[arg(short, long)]
    pub project: Option<PathBuf>,
}

/// Arguments for the `classify` command.
#[derive(Parser, Debug)]
pub struct ClassifyArgs {
    /// Failure text, as printed by the agent.
    pub text: String,

    /// Exit code the agent process ended with.
    #[arg(long, allow_hyphen_values = true)]
    pub exit_code: Option<i32>,

    /// Provider whose install/login hints to use.
    #[arg(long, default_value = "claude")]
    pub provider: String,
}

/// Arguments for the `providers` command.
#[derive(Parser, Debug)]
pub struct ProvidersArgs {
    /// Project root whose provider overrides to show.
    #[arg(short, long)]
    pub project: Option<PathBuf>,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
