use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const DEFINITIONS: &str = r#"
workflows:
  - name: greet
    defaults:
      who: world
    tasks:
      - name: hello
        function: echo
        args: ["$who"]
        output_key: greeting
      - name: record
        function: set_context
        kwargs:
          done: true
        depends_on: [hello]
  - name: broken
    tasks:
      - name: explode
        function: fail
        kwargs:
          message: nothing to see
"#;

const CYCLIC: &str = r#"
workflows:
  - name: loop
    tasks:
      - name: a
        function: noop
        depends_on: [b]
      - name: b
        function: noop
        depends_on: [a]
"#;

/// Command running inside `dir` with no inherited CONDUCTOR_* settings.
fn conductor(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("conductor").unwrap();
    cmd.current_dir(dir);
    for (key, _) in std::env::vars() {
        if key.starts_with("CONDUCTOR_") {
            cmd.env_remove(key);
        }
    }
    cmd
}

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn sqlite_config(dir: &TempDir) -> PathBuf {
    let db = dir.path().join("state.db");
    write(
        dir,
        "conductor.toml",
        &format!(
            "[persistence]\nbackend = \"sqlite\"\nurl = \"sqlite://{}\"\n",
            db.display()
        ),
    )
}

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    conductor(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("recover"));
}

#[test]
fn test_run_command_help() {
    let dir = TempDir::new().unwrap();
    conductor(dir.path())
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Start a workflow and wait for it to finish"))
        .stdout(predicate::str::contains("--param"));
}

#[test]
fn test_validate_accepts_good_document() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "workflows.yaml", DEFINITIONS);
    conductor(dir.path())
        .arg("validate")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("ok    greet (2 tasks)"))
        .stdout(predicate::str::contains("ok    broken (1 tasks)"));
}

#[test]
fn test_validate_rejects_cycle() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "cyclic.yaml", CYCLIC);
    conductor(dir.path())
        .arg("validate")
        .arg(&file)
        .assert()
        .failure()
        .stdout(predicate::str::contains("error loop: circular dependency"));
}

#[test]
fn test_validate_reports_missing_file() {
    let dir = TempDir::new().unwrap();
    conductor(dir.path())
        .args(["validate", "absent.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("absent.yaml"));
}

#[test]
fn test_run_prints_completed_instance() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "workflows.yaml", DEFINITIONS);
    let output = conductor(dir.path())
        .arg("run")
        .arg(&file)
        .args(["--workflow", "greet", "--param", "who=\"conductor\"", "--user", "ci"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let instance: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(instance["status"], "completed");
    assert_eq!(instance["user_id"], "ci");
    assert_eq!(instance["tenant_id"], "local");
    assert_eq!(instance["context"]["greeting"]["args"][0], "conductor");
    assert_eq!(instance["context"]["done"], true);
}

#[test]
fn test_run_failing_workflow_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "workflows.yaml", DEFINITIONS);
    conductor(dir.path())
        .arg("run")
        .arg(&file)
        .args(["-w", "broken"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"failed\""))
        .stderr(predicate::str::contains("nothing to see"));
}

#[test]
fn test_run_unknown_workflow_reports_code() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "workflows.yaml", DEFINITIONS);
    conductor(dir.path())
        .arg("run")
        .arg(&file)
        .args(["-w", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("WFE-DEF-001"));
}

#[test]
fn test_run_then_show_and_list_from_sqlite() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "workflows.yaml", DEFINITIONS);
    let config = sqlite_config(&dir);

    let output = conductor(dir.path())
        .arg("run")
        .arg(&file)
        .args(["-w", "greet", "--tenant", "acme", "--config"])
        .arg(&config)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let instance: Value = serde_json::from_slice(&output).unwrap();
    let id = instance["instance_id"].as_str().unwrap().to_string();

    let shown = conductor(dir.path())
        .args(["show", &id, "--config"])
        .arg(&config)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let shown: Value = serde_json::from_slice(&shown).unwrap();
    assert_eq!(shown, instance);

    conductor(dir.path())
        .args(["list", "--tenant", "acme", "--status", "completed", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains(id.as_str()))
        .stdout(predicate::str::contains("greet"));

    conductor(dir.path())
        .args(["list", "--tenant", "other", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    conductor(dir.path())
        .args(["recover", "--timeout", "5s", "--config"])
        .arg(&config)
        .assert()
        .success();
}

#[test]
fn test_show_unknown_instance_fails() {
    let dir = TempDir::new().unwrap();
    conductor(dir.path())
        .args(["show", "6f1d2c3b-0000-4000-8000-000000000000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("WFE-INST-001"));
}

#[test]
fn test_show_rejects_malformed_id() {
    let dir = TempDir::new().unwrap();
    conductor(dir.path())
        .args(["show", "not-a-uuid"])
        .assert()
        .failure();
}
