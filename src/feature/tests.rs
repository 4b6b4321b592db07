//! Tests for the feature model and stores.

use super::*;
use crate::error::DroverError;
use serde_json::json;
use tempfile::TempDir;

fn plan(statuses: &[TaskStatus]) -> Plan {
    Plan {
        status: PlanStatus::Approved,
        content: Some("1. do it".to_string()),
        tasks: statuses
            .iter()
            .enumerate()
            .map(|(i, status)| PlanTask {
                id: format!("T{}", i + 1),
                description: format!("task {}", i + 1),
                status: *status,
            })
            .collect(),
    }
}

#[test]
fn test_can_start_statuses() {
    assert!(FeatureStatus::Backlog.can_start());
    assert!(FeatureStatus::Ready.can_start());
    assert!(FeatureStatus::Interrupted.can_start());
    assert!(!FeatureStatus::InProgress.can_start());
    assert!(!FeatureStatus::Verified.can_start());
    assert!(!FeatureStatus::WaitingApproval.can_start());
    assert!(!FeatureStatus::MergeConflict.can_start());
}

#[test]
fn test_status_serializes_snake_case() {
    assert_eq!(
        serde_json::to_value(FeatureStatus::WaitingApproval).unwrap(),
        json!("waiting_approval")
    );
    assert_eq!(
        serde_json::from_value::<FeatureStatus>(json!("merge_conflict")).unwrap(),
        FeatureStatus::MergeConflict
    );
}

#[test]
fn test_unresolved_tasks_keep_plan_order() {
    let p = plan(&[
        TaskStatus::Completed,
        TaskStatus::InProgress,
        TaskStatus::Pending,
    ]);
    let ids: Vec<_> = p.unresolved_tasks().iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["T2", "T3"]);
}

#[test]
fn test_plan_awaiting_execution() {
    assert!(plan(&[TaskStatus::Pending]).awaiting_execution());
    assert!(!plan(&[TaskStatus::Completed]).awaiting_execution());

    let mut rejected = plan(&[TaskStatus::Pending]);
    rejected.status = PlanStatus::Rejected;
    assert!(!rejected.awaiting_execution());
}

#[test]
fn test_unknown_fields_round_trip() {
    let raw = json!({
        "id": "f-1",
        "title": "Login page",
        "status": "ready",
        "category": "ui",
        "priority": 2
    });
    let feature: Feature = serde_json::from_value(raw).unwrap();
    assert_eq!(feature.extra.get("category"), Some(&json!("ui")));

    let back = serde_json::to_value(&feature).unwrap();
    assert_eq!(back["category"], json!("ui"));
    assert_eq!(back["priority"], json!(2));
    assert_eq!(back["status"], json!("ready"));
}

#[test]
fn test_set_status_stamps_start_time() {
    let mut feature = Feature::new("f-1", "x");
    assert!(feature.started_at.is_none());
    feature.set_status(FeatureStatus::InProgress);
    assert!(feature.started_at.is_some());
    assert!(feature.updated_at.is_some());
}

#[tokio::test]
async fn test_file_store_round_trip() {
    let temp = TempDir::new().unwrap();
    let store = FileFeatureStore::new();
    let mut feature = Feature::new("f-1", "Add search");
    feature.plan = Some(plan(&[TaskStatus::Pending]));

    store.save(temp.path(), &feature).await.unwrap();
    let loaded = store.load(temp.path(), "f-1").await.unwrap();

    assert_eq!(loaded.title, "Add search");
    assert_eq!(loaded.plan, feature.plan);
    assert!(FileFeatureStore::feature_path(temp.path(), "f-1").is_file());
    assert_eq!(store.list(temp.path()).await.unwrap(), vec!["f-1"]);
}

#[tokio::test]
async fn test_file_store_missing_feature() {
    let temp = TempDir::new().unwrap();
    let err = FileFeatureStore::new()
        .load(temp.path(), "nope")
        .await
        .unwrap_err();
    assert!(matches!(err, DroverError::FeatureNotFound(id) if id == "nope"));
}

#[tokio::test]
async fn test_file_store_rejects_path_like_ids() {
    let temp = TempDir::new().unwrap();
    let store = FileFeatureStore::new();
    for id in ["../escape", "a/b", "..", ""] {
        assert!(store.load(temp.path(), id).await.is_err(), "id {:?}", id);
    }
}

#[tokio::test]
async fn test_mark_in_progress_guards_terminal_status() {
    let temp = TempDir::new().unwrap();
    let store = FileFeatureStore::new();

    let mut done = Feature::new("done", "x");
    done.status = FeatureStatus::Verified;
    store.save(temp.path(), &done).await.unwrap();
    store
        .save(temp.path(), &Feature::new("fresh", "y"))
        .await
        .unwrap();

    assert!(!store.mark_in_progress(temp.path(), "done").await.unwrap());
    assert_eq!(
        store.load(temp.path(), "done").await.unwrap().status,
        FeatureStatus::Verified
    );

    assert!(store.mark_in_progress(temp.path(), "fresh").await.unwrap());
    assert!(!store.mark_in_progress(temp.path(), "fresh").await.unwrap());
    assert_eq!(
        store.load(temp.path(), "fresh").await.unwrap().status,
        FeatureStatus::InProgress
    );
}

#[tokio::test]
async fn test_update_status_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let store = FileFeatureStore::new();
    store
        .save(temp.path(), &Feature::new("f-1", "x"))
        .await
        .unwrap();

    store
        .update_status(temp.path(), "f-1", FeatureStatus::Interrupted)
        .await
        .unwrap();
    store
        .update_status(temp.path(), "f-1", FeatureStatus::Interrupted)
        .await
        .unwrap();
    assert_eq!(
        store.load(temp.path(), "f-1").await.unwrap().status,
        FeatureStatus::Interrupted
    );
}

#[tokio::test]
async fn test_feature_dir_sandbox() {
    let temp = TempDir::new().unwrap();
    let dir = FeatureDir::new(temp.path(), "f-1").unwrap();

    dir.write("agent-output.md", "hello").await.unwrap();
    dir.append("agent-output.md", " world").await.unwrap();
    assert_eq!(
        dir.read("agent-output.md").await.unwrap().as_deref(),
        Some("hello world")
    );
    assert_eq!(dir.read("missing.md").await.unwrap(), None);

    dir.write("notes/./plan.md", "nested").await.unwrap();
    assert!(dir.root().join("notes").join("plan.md").is_file());

    for bad in ["../feature.json", "/etc/passwd", "a/../../b", ""] {
        assert!(dir.resolve(bad).is_err(), "path {:?}", bad);
        assert!(dir.write(bad, "x").await.is_err());
    }
}
