//! CLI integration tests for the offline subcommands.
//!
//! Uses `assert_cmd` to spawn the `formflow` binary and verify
//! exit codes, stdout content, and stderr content.
//!
//! All tests set `current_dir` to the workspace root so that relative
//! paths to the demo forms resolve correctly.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const DEMO_FORM: &str = "demos/forms/leave-request.json";

/// Locate the workspace root by walking up from CARGO_MANIFEST_DIR.
fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    // crates/cli -> workspace root is two levels up
    manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .to_path_buf()
}

/// Helper: create a Command for the `formflow` binary, rooted at workspace.
fn formflow() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_formflow"));
    cmd.current_dir(workspace_root());
    cmd.env_remove("RUST_LOG");
    cmd
}

fn write_values(dir: &TempDir, json: &str) -> PathBuf {
    let path = dir.path().join("values.json");
    fs::write(&path, json).unwrap();
    path
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    formflow()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Multi-stage form submission engine"));
}

#[test]
fn version_exits_0() {
    formflow()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("formflow"));
}

// ──────────────────────────────────────────────
// 2. Check subcommand
// ──────────────────────────────────────────────

#[test]
fn check_demo_form_is_clean() {
    formflow()
        .args(["check", DEMO_FORM])
        .assert()
        .success()
        .stdout(predicate::str::contains("Form version 1 'Leave request' (published)"))
        .stdout(predicate::str::contains("2 stage(s), 2 section(s), 6 field(s), 2 transition(s)"))
        .stdout(predicate::str::contains("ok"));
}

#[test]
fn check_json_output() {
    let output = formflow()
        .args(["--output", "json", "check", DEMO_FORM])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["form_version_id"], 1);
    assert_eq!(report["fields"], 6);
    assert_eq!(report["warnings"], serde_json::json!([]));
}

#[test]
fn check_strict_fails_on_warnings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("odd.json");
    fs::write(
        &path,
        r#"{"id": 3, "stages": [{"id": 1, "is_initial": true, "sections": [
            {"id": 1, "fields": [{"id": 1, "label": "X", "field_type": "Hologram Input"}]}
        ]}]}"#,
    )
    .unwrap();

    formflow()
        .args(["check", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("unknown type 'Hologram Input'"));
    formflow()
        .args(["check", "--strict", path.to_str().unwrap()])
        .assert()
        .code(1);
}

#[test]
fn check_structural_error_exits_1() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(
        &path,
        r#"{"id": 3, "stages": [{"id": 1, "is_initial": true}, {"id": 2, "is_initial": true}]}"#,
    )
    .unwrap();

    formflow()
        .args(["check", path.to_str().unwrap()])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("broken.json"));
}

#[test]
fn check_missing_file_exits_1() {
    formflow()
        .args(["--output", "json", "check", "does/not/exist.json"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("\"error\""));
}

// ──────────────────────────────────────────────
// 3. Submit subcommand
// ──────────────────────────────────────────────

#[test]
fn submit_reports_validation_errors() {
    let dir = TempDir::new().unwrap();
    let values = write_values(&dir, r#"{"101": "Ann", "102": "not-an-email", "103": "40"}"#);

    formflow()
        .args(["submit", DEMO_FORM, "--values", values.to_str().unwrap()])
        .arg("--blob-root")
        .arg(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("field 102: Must be a valid email address."))
        .stderr(predicate::str::contains("field 103: Value must not exceed 30."));
}

#[test]
fn submit_conditional_required_field() {
    let dir = TempDir::new().unwrap();
    let values = write_values(&dir, r#"{"101": "Ann", "102": "ann@example.com", "103": 8}"#);

    formflow()
        .args(["submit", DEMO_FORM, "--values", values.to_str().unwrap()])
        .arg("--blob-root")
        .arg(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("field 104: This field is required."));
}

#[test]
fn submit_moves_to_review_stage() {
    let dir = TempDir::new().unwrap();
    let values = write_values(
        &dir,
        r#"[{"field_id": 101, "value": "Ann"},
            {"field_id": 102, "value": " Ann@Example.com "},
            {"field_id": 103, "value": "2"}]"#,
    );

    let output = formflow()
        .args(["--output", "json", "submit", DEMO_FORM])
        .args(["--values", values.to_str().unwrap(), "--transition", "10"])
        .arg("--blob-root")
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let outcome: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(outcome["current_stage_id"], 2);
    assert_eq!(outcome["is_complete"], false);
    assert_eq!(outcome["message"], "Form submitted successfully");
    // Nobody holds role 2 in the offline directory.
    assert_eq!(outcome["action_results"][0]["success"], false);
    assert_eq!(
        outcome["action_results"][0]["message"],
        "No recipients specified or found"
    );
}

#[test]
fn submit_rejects_transition_from_other_stage() {
    let dir = TempDir::new().unwrap();
    let values = write_values(&dir, r#"{"101": "Ann", "102": "ann@example.com", "103": 1}"#);

    formflow()
        .args(["submit", DEMO_FORM, "--values", values.to_str().unwrap()])
        .args(["--transition", "11"])
        .arg("--blob-root")
        .arg(dir.path())
        .assert()
        .code(1);
}
