//! End-to-end tests for the `permission-sync` binary's file-mutation
//! contract.

use std::process::Command;

use tempfile::TempDir;

fn run_sync(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_permission-sync"))
        .args(args)
        .output()
        .expect("run permission-sync")
}

#[test]
fn apply_writes_harvested_rules_into_settings_file() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("log.jsonl");
    let settings_path = dir.path().join("settings.json");

    std::fs::write(
        &log_path,
        concat!(
            "{\"rule\":\"Bash(git status *)\",\"cwd\":\"/a\"}\n",
            "{\"rule\":\"Bash(git status *)\",\"cwd\":\"/a\"}\n",
            "{\"rule\":\"Read\",\"cwd\":\"/a\"}\n",
        ),
    )
    .unwrap();

    let output = run_sync(&[
        "--apply",
        "--log-path",
        log_path.to_str().unwrap(),
        "--settings-path",
        settings_path.to_str().unwrap(),
    ]);
    assert!(output.status.success());

    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&settings_path).unwrap()).unwrap();
    let allow = doc["permissions"]["allow"].as_array().unwrap();
    assert_eq!(allow.len(), 2);
    assert!(allow.contains(&serde_json::json!("Bash(git status *)")));
    assert!(allow.contains(&serde_json::json!("Read")));
}

#[test]
fn apply_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("log.jsonl");
    let settings_path = dir.path().join("settings.json");
    std::fs::write(&log_path, "{\"rule\":\"Bash(git log *)\",\"cwd\":\"/a\"}\n").unwrap();

    let args = [
        "--apply",
        "--log-path",
        log_path.to_str().unwrap(),
        "--settings-path",
        settings_path.to_str().unwrap(),
    ];
    run_sync(&args);
    let first = std::fs::read_to_string(&settings_path).unwrap();
    run_sync(&args);
    let second = std::fs::read_to_string(&settings_path).unwrap();

    assert_eq!(first, second);
}

#[test]
fn refine_apply_expands_broad_git_rule() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("log.jsonl");
    let settings_path = dir.path().join("settings.json");
    std::fs::write(&log_path, "{\"rule\":\"Bash(git *)\",\"cwd\":\"/a\"}\n").unwrap();

    let output = run_sync(&[
        "--refine",
        "--apply",
        "--log-path",
        log_path.to_str().unwrap(),
        "--settings-path",
        settings_path.to_str().unwrap(),
    ]);
    assert!(output.status.success());

    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&settings_path).unwrap()).unwrap();
    let allow: Vec<String> = doc["permissions"]["allow"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();

    assert!(!allow.contains(&"Bash(git *)".to_string()));
    assert!(allow.contains(&"Bash(git status *)".to_string()));
    assert!(allow.contains(&"Bash(git -C * status *)".to_string()));
}

#[test]
fn preserves_other_settings_keys() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("log.jsonl");
    let settings_path = dir.path().join("settings.json");
    std::fs::write(&log_path, "{\"rule\":\"Read\",\"cwd\":\"/a\"}\n").unwrap();
    std::fs::write(
        &settings_path,
        r#"{"hooks":{"PermissionRequest":[{"matcher":"*","hooks":[]}]}}"#,
    )
    .unwrap();

    let output = run_sync(&[
        "--apply",
        "--log-path",
        log_path.to_str().unwrap(),
        "--settings-path",
        settings_path.to_str().unwrap(),
    ]);
    assert!(output.status.success());

    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&settings_path).unwrap()).unwrap();
    assert!(doc["hooks"]["PermissionRequest"].is_array());
}

#[test]
fn print_does_not_touch_settings_file() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("log.jsonl");
    let settings_path = dir.path().join("settings.json");
    std::fs::write(&log_path, "{\"rule\":\"Bash(git log *)\",\"cwd\":\"/a\"}\n").unwrap();

    let output = run_sync(&[
        "--print",
        "--log-path",
        log_path.to_str().unwrap(),
        "--settings-path",
        settings_path.to_str().unwrap(),
    ]);
    assert!(output.status.success());
    assert!(String::from_utf8(output.stdout).unwrap().contains("Bash(git log *)"));
    assert!(!settings_path.exists());
}
