//! Tests for config functionality.

use super::*;
use crate::error::DroverError;
use crate::provider::ProviderKind;
use std::collections::BTreeSet;
use tempfile::TempDir;

#[test]
fn test_default_config() {
    let config = Config::default();

    assert_eq!(config.default_model, "sonnet");
    assert_eq!(config.idle_timeout_secs, 30);
    assert_eq!(config.max_incomplete_retries, 3);
    assert_eq!(config.verification_min_chars, 200);
    assert_eq!(config.auto_pause.threshold, 3);
    assert_eq!(config.auto_pause.window_secs, 60);
    assert!(config.auto_load_project_instructions);
    assert_eq!(config.instruction_files, vec!["AGENTS.md", "CLAUDE.md"]);
    assert!(config.pipeline.is_empty());
    assert!(config.validate().is_ok());
}

#[test]
fn test_parse_empty_yaml() {
    assert_eq!(Config::from_yaml("").unwrap(), Config::default());
}

#[test]
fn test_parse_partial_yaml_keeps_defaults() {
    let config = Config::from_yaml("default_model: gpt-5\nauto_pause:\n  threshold: 5\n").unwrap();

    assert_eq!(config.default_model, "gpt-5");
    assert_eq!(config.auto_pause.threshold, 5);
    assert_eq!(config.auto_pause.window_secs, 60);
    assert_eq!(config.idle_timeout_secs, 30);
}

#[test]
fn test_unknown_fields_ignored() {
    let config = Config::from_yaml("future_setting: true\nidle_timeout_secs: 45\n").unwrap();
    assert_eq!(config.idle_timeout_secs, 45);
}

#[test]
fn test_full_yaml() {
    let yaml = r#"
providers:
  codex:
    command: /opt/bin/codex
    args: "--sandbox workspace-write"
    environment:
      CODEX_HOME: /tmp/codex
pipeline:
  - id: merge
    order: 2
    kind: merge
    command: git merge --no-edit main
  - id: test
    name: Run tests
    order: 1
    command: cargo test
prompt_templates:
  continuation: "Remaining: {tasks}"
"#;
    let config = Config::from_yaml(yaml).unwrap();

    let codex = config.provider_profile(ProviderKind::Codex).unwrap();
    assert_eq!(codex.command.as_deref(), Some("/opt/bin/codex"));
    assert_eq!(codex.args, "--sandbox workspace-write");
    assert!(config.provider_profile(ProviderKind::Claude).is_none());

    let steps = config.pipeline_steps(&BTreeSet::new());
    assert_eq!(steps[0].id, "test");
    assert_eq!(steps[0].display_name(), "Run tests");
    assert_eq!(steps[1].kind, PipelineStepKind::Merge);
    assert_eq!(steps[1].display_name(), "merge");

    assert_eq!(
        config.prompt_templates.continuation.as_deref(),
        Some("Remaining: {tasks}")
    );
}

#[test]
fn test_pipeline_steps_exclusion_and_stable_order() {
    let step = |id: &str, order: i32| PipelineStep {
        id: id.to_string(),
        name: String::new(),
        order,
        command: "true".to_string(),
        kind: PipelineStepKind::Command,
    };
    let config = Config {
        pipeline: vec![step("b", 1), step("a", 1), step("lint", 0), step("deploy", 5)],
        ..Config::default()
    };

    let excluded: BTreeSet<String> = ["deploy".to_string()].into();
    let ids: Vec<_> = config
        .pipeline_steps(&excluded)
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids, vec!["lint", "b", "a"]);
}

#[test]
fn test_validation_rejects_zero_timeouts() {
    for yaml in [
        "idle_timeout_secs: 0",
        "auto_pause:\n  threshold: 0",
        "auto_pause:\n  window_secs: 0",
        "default_model: ''",
    ] {
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, DroverError::Config(_)), "yaml: {}", yaml);
    }
}

#[test]
fn test_validation_rejects_unknown_provider() {
    let err = Config::from_yaml("providers:\n  gemini:\n    command: gemini\n").unwrap_err();
    assert!(err.to_string().contains("gemini"));
}

#[test]
fn test_validation_rejects_duplicate_pipeline_ids() {
    let yaml = "pipeline:\n  - id: t\n    command: a\n  - id: t\n    command: b\n";
    let err = Config::from_yaml(yaml).unwrap_err();
    assert!(err.to_string().contains("duplicate"));
}

#[test]
fn test_validation_rejects_empty_pipeline_command() {
    let yaml = "pipeline:\n  - id: t\n    command: '  '\n";
    assert!(Config::from_yaml(yaml).is_err());
}

#[test]
fn test_yaml_round_trip() {
    let mut config = Config::default();
    config.default_model = "codex:gpt-5".to_string();
    let yaml = config.to_yaml().unwrap();
    assert_eq!(Config::from_yaml(&yaml).unwrap(), config);
}

#[test]
fn test_project_settings_default_when_missing() {
    let temp = TempDir::new().unwrap();
    let config = ProjectSettings.settings(temp.path()).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_project_settings_reads_file() {
    let temp = TempDir::new().unwrap();
    let path = Config::path_for_project(temp.path());
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "verification_min_chars: 50\n").unwrap();

    let config = ProjectSettings.settings(temp.path()).unwrap();
    assert_eq!(config.verification_min_chars, 50);
}
