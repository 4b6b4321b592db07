//! Tests for the concurrency manager.

use super::*;
use crate::error::DroverError;
use crate::provider::ProviderKind;
use std::path::PathBuf;
use std::sync::Arc;

fn context() -> ExecutionContext {
    ExecutionContext {
        project_path: PathBuf::from("/projects/demo"),
        model: "sonnet".to_string(),
        provider: ProviderKind::Claude,
        is_auto_mode: false,
    }
}

#[test]
fn test_second_acquire_is_rejected() {
    let manager = ConcurrencyManager::new();
    manager.acquire("f-1", context(), false).unwrap();

    let err = manager.acquire("f-1", context(), false).unwrap_err();
    assert!(matches!(err, DroverError::AlreadyRunning(id) if id == "f-1"));
    assert_eq!(manager.running().len(), 1);
}

#[test]
fn test_reuse_returns_same_record() {
    let manager = ConcurrencyManager::new();
    let first = manager.acquire("f-1", context(), false).unwrap();
    let second = manager.acquire("f-1", context(), true).unwrap();

    assert_eq!(first.run_id, second.run_id);
    assert_eq!(second.leases, 2);
    assert_eq!(manager.running().len(), 1);

    // Both handles share one token.
    second.cancel.cancel();
    assert!(first.cancel.is_cancelled());
}

#[test]
fn test_reuse_without_existing_record_creates_one() {
    let manager = ConcurrencyManager::new();
    let record = manager.acquire("f-2", context(), true).unwrap();
    assert_eq!(record.leases, 1);
    assert!(manager.is_running("f-2"));
}

#[test]
fn test_leases_release_one_at_a_time() {
    let manager = ConcurrencyManager::new();
    let record = manager.acquire("f-1", context(), false).unwrap();
    manager.acquire("f-1", context(), true).unwrap();

    assert!(!manager.release("f-1", ReleaseOptions::for_run(record.run_id)));
    assert!(manager.is_running("f-1"));
    assert!(manager.release("f-1", ReleaseOptions::for_run(record.run_id)));
    assert!(!manager.is_running("f-1"));
}

#[test]
fn test_forced_release_ignores_leases() {
    let manager = ConcurrencyManager::new();
    manager.acquire("f-1", context(), false).unwrap();
    manager.acquire("f-1", context(), true).unwrap();

    assert!(manager.release("f-1", ReleaseOptions::forced()));
    assert!(manager.get("f-1").is_none());
}

#[test]
fn test_stale_run_cannot_release_newer_run() {
    let manager = ConcurrencyManager::new();
    let old = manager.acquire("f-1", context(), false).unwrap();
    manager.release("f-1", ReleaseOptions::forced());
    let new = manager.acquire("f-1", context(), false).unwrap();

    assert!(!manager.release("f-1", ReleaseOptions::for_run(old.run_id)));
    assert_eq!(manager.get("f-1").unwrap().run_id, new.run_id);
}

#[test]
fn test_release_of_unknown_feature_is_noop() {
    let manager = ConcurrencyManager::new();
    assert!(!manager.release("nope", ReleaseOptions::default()));
}

#[test]
fn test_update_records_worktree() {
    let manager = ConcurrencyManager::new();
    manager.acquire("f-1", context(), false).unwrap();

    assert!(manager.update("f-1", |r| {
        r.worktree = Some(PathBuf::from("/projects/demo/.worktrees/f-1"));
        r.branch = Some("feature/f-1".to_string());
    }));
    let record = manager.get("f-1").unwrap();
    assert_eq!(
        record.working_dir(),
        PathBuf::from("/projects/demo/.worktrees/f-1").as_path()
    );
    assert_eq!(record.branch.as_deref(), Some("feature/f-1"));
    assert!(!manager.update("missing", |_| {}));
}

#[test]
fn test_working_dir_defaults_to_project() {
    let manager = ConcurrencyManager::new();
    let record = manager.acquire("f-1", context(), false).unwrap();
    assert_eq!(record.working_dir(), PathBuf::from("/projects/demo").as_path());
    assert!(record.to_string().starts_with("f-1 (claude:sonnet"));
}

#[test]
fn test_guard_releases_on_drop() {
    let manager = Arc::new(ConcurrencyManager::new());
    let record = manager.acquire("f-1", context(), false).unwrap();
    {
        let _guard = SlotGuard::new(manager.clone(), record);
        assert!(manager.is_running("f-1"));
    }
    assert!(!manager.is_running("f-1"));
}

#[test]
fn test_guard_drop_after_forced_release_leaves_new_run_alone() {
    let manager = Arc::new(ConcurrencyManager::new());
    let record = manager.acquire("f-1", context(), false).unwrap();
    let guard = SlotGuard::new(manager.clone(), record);

    manager.release("f-1", ReleaseOptions::forced());
    let newer = manager.acquire("f-1", context(), false).unwrap();
    drop(guard);

    assert_eq!(manager.get("f-1").map(|r| r.run_id), Some(newer.run_id));
}

#[test]
fn test_guard_explicit_release() {
    let manager = Arc::new(ConcurrencyManager::new());
    let record = manager.acquire("f-1", context(), false).unwrap();
    let guard = SlotGuard::new(manager.clone(), record);
    assert_eq!(guard.record().feature_id, "f-1");
    assert!(guard.release());
    assert!(manager.running().is_empty());
}

#[tokio::test]
async fn test_concurrent_acquires_admit_exactly_one() {
    let manager = Arc::new(ConcurrencyManager::new());
    let mut handles = Vec::new();
    for _ in 0..16 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager.acquire("shared", context(), false).is_ok()
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 1);
}
