//! Basic CLI E2E tests.
//!
//! Tests invoke the built binary with an isolated HOME and verify outputs.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_restwise"))
        .args(args)
        .env("HOME", home)
        .env_remove("RESTWISE_ENV")
        .env_remove("RESTWISE_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_ok(home: &Path, args: &[&str]) -> String {
    let (stdout, stderr, code) = run_cli(home, args);
    assert_eq!(code, 0, "command {args:?} failed: {stderr}");
    stdout
}

fn parse_json(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout).expect("Failed to parse JSON output")
}

#[test]
fn test_recommend_without_history() {
    let home = tempfile::tempdir().unwrap();
    let out = run_ok(
        home.path(),
        &["recommend", "--user", "u1", "--exercise", "back-squat", "--set", "1", "--reps", "5", "--rpe", "8"],
    );
    let calc = parse_json(&out);
    assert_eq!(calc["recommended_rest_seconds"], 144);
    assert_eq!(calc["base_rest_seconds"], 120);
    assert!(calc["confidence"].as_f64().unwrap() < 0.5);
    assert_eq!(calc["adjustments"][0]["reason"], "rpe");
}

#[test]
fn test_recommend_unknown_exercise_fails() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(
        home.path(),
        &["recommend", "--user", "u1", "--exercise", "moon-jump", "--set", "1", "--reps", "5"],
    );
    assert_ne!(code, 0);
    assert!(stderr.contains("not found"), "stderr was: {stderr}");
}

#[test]
fn test_recommend_rejects_effort_out_of_range() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(
        home.path(),
        &["recommend", "--user", "u1", "--exercise", "deadlift", "--set", "1", "--reps", "3", "--rpe", "11"],
    );
    assert_ne!(code, 0);
    assert!(stderr.contains("1-10"), "stderr was: {stderr}");
}

#[test]
fn test_history_personalizes_recommendation() {
    let home = tempfile::tempdir().unwrap();
    for set in 1..=12 {
        let set = ((set - 1) % 4 + 1).to_string();
        run_ok(
            home.path(),
            &["history", "add", "--user", "u1", "--exercise", "bench-press", "--set", &set, "--rpe", "8", "--rest", "200"],
        );
    }

    let profile = parse_json(&run_ok(
        home.path(),
        &["history", "show", "--user", "u1", "--exercise", "bench-press"],
    ));
    assert_eq!(profile["sample_count"], 12);

    let calc = parse_json(&run_ok(
        home.path(),
        &["recommend", "--user", "u1", "--exercise", "bench-press", "--set", "2", "--reps", "8", "--rpe", "8"],
    ));
    let reasons: Vec<&str> = calc["adjustments"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["reason"].as_str().unwrap())
        .collect();
    assert!(reasons.contains(&"personalization"));
    assert!(calc["confidence"].as_f64().unwrap() > 0.5);
}

#[test]
fn test_exercises_list_json() {
    let home = tempfile::tempdir().unwrap();
    let out = run_ok(home.path(), &["exercises", "list", "--json"]);
    let entries = parse_json(&out);
    let squat = entries
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["id"] == "back-squat")
        .expect("back-squat listed");
    assert_eq!(squat["class"], "compound");
    assert_eq!(squat["base_rest_seconds"], 120);
}

#[test]
fn test_config_get_set() {
    let home = tempfile::tempdir().unwrap();
    assert_eq!(run_ok(home.path(), &["config", "get", "timer.tick_interval_ms"]).trim(), "1000");

    let out = run_ok(home.path(), &["config", "set", "rest.base.isolation", "045"]);
    assert_eq!(out.trim(), "rest.base.isolation = 45");
    assert_eq!(run_ok(home.path(), &["config", "get", "rest.base.isolation"]).trim(), "45");

    let out = run_ok(home.path(), &["config", "set", "rest.personalization_max_influence", "0.50"]);
    assert_eq!(out.trim(), "rest.personalization_max_influence = 0.5");

    let list = parse_json(&run_ok(home.path(), &["config", "list"]));
    assert_eq!(list["rest"]["base"]["isolation"], 45);
}

#[test]
fn test_config_rejects_unknown_key() {
    let home = tempfile::tempdir().unwrap();
    let (_, _, code) = run_cli(home.path(), &["config", "get", "timer.nope"]);
    assert_ne!(code, 0);
    let (_, _, code) = run_cli(home.path(), &["config", "set", "timer.nope", "1"]);
    assert_ne!(code, 0);
}

#[test]
fn test_config_set_rejects_inconsistent_bounds() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["config", "set", "rest.floor_seconds", "400"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("rest.floor_seconds"), "stderr was: {stderr}");
    assert_eq!(run_ok(home.path(), &["config", "get", "rest.floor_seconds"]).trim(), "15");
}

#[test]
fn test_custom_exercise_from_config() {
    let home = tempfile::tempdir().unwrap();
    run_ok(home.path(), &["config", "set", "exercises.sled-push", "compound"]);
    let calc = parse_json(&run_ok(
        home.path(),
        &["recommend", "--user", "u1", "--exercise", "sled-push", "--set", "1", "--reps", "1"],
    ));
    assert_eq!(calc["base_rest_seconds"], 120);
}

#[test]
fn test_timer_run_streams_events_until_completion() {
    let home = tempfile::tempdir().unwrap();
    run_ok(home.path(), &["config", "set", "rest.floor_seconds", "1"]);
    run_ok(home.path(), &["config", "set", "rest.ceiling_seconds", "2"]);
    run_ok(home.path(), &["config", "set", "timer.tick_interval_ms", "100"]);

    let out = run_ok(
        home.path(),
        &["timer", "run", "--user", "u1", "--exercise", "bicep-curl", "--set", "1", "--reps", "12", "--checkpoint", "1"],
    );
    let types: Vec<String> = out
        .lines()
        .map(|line| parse_json(line)["type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        types,
        vec!["RecommendationApplied", "TimerStarted", "AlertFired", "TimerCompleted"]
    );
}

#[test]
fn test_timer_run_with_unknown_exercise_uses_fallback() {
    let home = tempfile::tempdir().unwrap();
    run_ok(home.path(), &["config", "set", "timer.fallback_rest_seconds", "1"]);
    run_ok(home.path(), &["config", "set", "timer.tick_interval_ms", "100"]);

    let (stdout, stderr, code) = run_cli(
        home.path(),
        &["timer", "run", "--user", "u1", "--exercise", "moon-jump", "--set", "1", "--reps", "5", "--checkpoint", "30"],
    );
    assert_eq!(code, 0, "stderr: {stderr}");
    assert!(stderr.contains("default rest duration"));
    let first = parse_json(stdout.lines().next().unwrap());
    assert_eq!(first["fallback"], true);
    assert_eq!(first["recommended_rest_secs"], 1);
}
