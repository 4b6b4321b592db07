//! Worktree lookup.
//!
//! When a feature runs with worktrees enabled, the agent works inside the
//! git worktree checked out on the feature's branch. The lookup is a seam so
//! the orchestrator can be exercised without a repository.

use crate::error::{DroverError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

#[async_trait]
pub trait WorktreeResolver: Send + Sync {
    /// Path of the worktree whose checkout is `branch`, if one exists.
    async fn find_worktree_for_branch(&self, project: &Path, branch: &str)
    -> Result<Option<PathBuf>>;
}

/// One entry of `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    /// `None` for a detached HEAD or a bare entry.
    pub branch: Option<String>,
}

/// Resolves worktrees by asking git.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitWorktreeResolver;

impl GitWorktreeResolver {
    pub async fn list(&self, project: &Path) -> Result<Vec<WorktreeEntry>> {
        let output = Command::new("git")
            .current_dir(project)
            .args(["worktree", "list", "--porcelain"])
            .output()
            .await
            .map_err(|e| DroverError::UserError(format!("failed to execute git worktree: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(DroverError::UserError(format!(
                "git worktree list failed (exit code {}): {}",
                output.status.code().unwrap_or(-1),
                stderr
            )));
        }

        Ok(parse_worktree_list(&String::from_utf8_lossy(&output.stdout)))
    }
}

#[async_trait]
impl WorktreeResolver for GitWorktreeResolver {
    async fn find_worktree_for_branch(
        &self,
        project: &Path,
        branch: &str,
    ) -> Result<Option<PathBuf>> {
        let branch = branch.strip_prefix("refs/heads/").unwrap_or(branch);
        Ok(self
            .list(project)
            .await?
            .into_iter()
            .find(|wt| wt.branch.as_deref() == Some(branch))
            .map(|wt| wt.path))
    }
}

/// Parse porcelain output.
///
/// Format: `worktree <path>` starts an entry, followed by `HEAD <sha>`,
/// then `branch refs/heads/<name>` or `detached`; entries are separated by a
/// blank line.
pub fn parse_worktree_list(output: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    let mut current: Option<WorktreeEntry> = None;

    for line in output.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            entries.extend(current.take());
            current = Some(WorktreeEntry {
                path: PathBuf::from(path),
                branch: None,
            });
        } else if let Some(branch_ref) = line.strip_prefix("branch ")
            && let Some(entry) = current.as_mut()
        {
            entry.branch = Some(
                branch_ref
                    .strip_prefix("refs/heads/")
                    .unwrap_or(branch_ref)
                    .to_string(),
            );
        }
    }

    entries.extend(current);
    entries
}

/// Fixed branch → path table, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct StaticWorktrees(pub std::collections::HashMap<String, PathBuf>);

#[cfg(test)]
#[async_trait]
impl WorktreeResolver for StaticWorktrees {
    async fn find_worktree_for_branch(
        &self,
        _project: &Path,
        branch: &str,
    ) -> Result<Option<PathBuf>> {
        Ok(self.0.get(branch).cloned())
    }
}
