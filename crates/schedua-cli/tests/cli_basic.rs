//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run against a throwaway database
//! file and verify outputs.

use std::path::PathBuf;
use std::process::Command;

/// A fresh database path per test so runs don't interfere.
fn temp_db(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("schedua-cli-test-{}-{}.db", std::process::id(), tag))
}

/// Run a CLI command and return output.
fn run_cli(db: &PathBuf, args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-p", "schedua-cli", "--", "--db"])
        .arg(db)
        .args(args)
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

/// Assert command succeeded.
fn assert_success(result: &(String, String, i32), context: &str) {
    let (_stdout, stderr, code) = result;
    if *code != 0 {
        panic!("{} failed with code {}: {}", context, code, stderr);
    }
}

const RULE: &str =
    "FREQ=WEEKLY;BYDAY=MO,TU,WE,TH,FR;BYHOUR=9;BYMINUTE=0;DTSTART:20260216T090000;DURATION=PT1H";

#[test]
fn test_series_add_and_list() {
    let db = temp_db("series");
    let output = run_cli(
        &db,
        &[
            "series", "add", "Morning start", "--endpoint", "opc.tcp://localhost:4840",
            "--node", "ns=2;i=1001", "--value", "1", "--rule", RULE,
        ],
    );
    assert_success(&output, "series add");
    assert!(output.0.contains("created"));

    let output = run_cli(&db, &["series", "list", "--json"]);
    assert_success(&output, "series list");
    let parsed: serde_json::Value = serde_json::from_str(&output.0).expect("valid JSON");
    let series = parsed.as_array().expect("array");
    assert_eq!(series.len(), 1);
    assert_eq!(series[0]["task_name"], "Morning start");

    let _ = std::fs::remove_file(&db);
}

#[test]
fn test_category_seed_is_visible() {
    let db = temp_db("categories");
    let output = run_cli(&db, &["category", "list", "--json"]);
    assert_success(&output, "category list");
    let parsed: serde_json::Value = serde_json::from_str(&output.0).expect("valid JSON");
    let categories = parsed.as_array().expect("array");
    assert_eq!(categories.len(), 8);
    assert_eq!(categories[0]["name"], "Red");

    let _ = std::fs::remove_file(&db);
}

#[test]
fn test_override_set_show_clear() {
    let db = temp_db("override");
    let output = run_cli(&db, &["override", "set", "75"]);
    assert_success(&output, "override set");

    let output = run_cli(&db, &["override", "show"]);
    assert_success(&output, "override show");
    assert!(output.0.contains("value=75"));

    let output = run_cli(&db, &["override", "clear"]);
    assert_success(&output, "override clear");

    let output = run_cli(&db, &["override", "show"]);
    assert_success(&output, "override show after clear");
    assert!(output.0.contains("no active override"));

    let _ = std::fs::remove_file(&db);
}

#[test]
fn test_resolve_window_json() {
    let db = temp_db("resolve");
    let output = run_cli(
        &db,
        &[
            "series", "add", "Morning start", "--endpoint", "opc.tcp://localhost:4840",
            "--node", "ns=2;i=1001", "--value", "1", "--rule", RULE,
        ],
    );
    assert_success(&output, "series add");

    let output = run_cli(
        &db,
        &[
            "resolve", "--from", "2026-02-16 00:00", "--to", "2026-02-23 00:00", "--json",
        ],
    );
    assert_success(&output, "resolve");
    let parsed: serde_json::Value = serde_json::from_str(&output.0).expect("valid JSON");
    assert_eq!(parsed.as_array().expect("array").len(), 5);

    let _ = std::fs::remove_file(&db);
}

#[test]
fn test_run_once() {
    let db = temp_db("run-once");
    let output = run_cli(&db, &["run", "--once"]);
    assert_success(&output, "run --once");

    let _ = std::fs::remove_file(&db);
}

#[test]
fn test_status_idle() {
    let db = temp_db("status");
    let output = run_cli(&db, &["status"]);
    assert_success(&output, "status");
    assert!(output.0.contains("idle") || output.0.contains("current value"));

    let _ = std::fs::remove_file(&db);
}
