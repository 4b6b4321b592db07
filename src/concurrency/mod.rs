//! Concurrency manager.
//!
//! At most one agent execution runs per feature. The manager maps feature ids
//! to [`RunningExecution`] records; a record exists exactly while an execution
//! holds the feature's slot.
//!
//! # Leases
//!
//! Internal continuations (an approved plan, or resuming an in-flight
//! session) re-enter `acquire` with `allow_reuse`, which shares the existing
//! record and bumps its lease count instead of failing. Each non-forced
//! release drops one lease; the record goes away when the last lease does.
//! `stop_feature` uses a forced release to clear the slot immediately.
//!
//! # RAII Guards
//!
//! [`SlotGuard`] releases its lease on drop, so an execution that unwinds
//! through `?` or a panic still frees the slot.

mod guard;
mod manager;
mod types;

#[cfg(test)]
mod tests;

pub use guard::SlotGuard;
pub use manager::ConcurrencyManager;
pub use types::{ExecutionContext, ReleaseOptions, RunningExecution};
