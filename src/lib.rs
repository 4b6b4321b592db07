//! Drover: drives external coding-agent processes to completion for
//! feature-sized units of work.
//!
//! The crate is organised bottom-up:
//!
//! - [`subprocess`] spawns an agent CLI and turns its stdout into JSON records,
//!   with idle-timeout and cancellation handling.
//! - [`provider`] normalizes each tool's records into [`provider::ProviderMessage`]
//!   and classifies failures.
//! - [`concurrency`] keeps at most one execution per feature.
//! - [`orchestrator`] runs a feature end to end and settles its status.
//!
//! The remaining modules are the collaborators the orchestrator talks to:
//! feature storage, worktree lookup, settings, prompts and events.

pub mod concurrency;
pub mod config;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod feature;
pub mod fs;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod subprocess;
pub mod worktree;
