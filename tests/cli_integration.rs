// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Integration tests for the chainform CLI commands

use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

/// Get the path to the chainform binary
fn chainform_binary() -> PathBuf {
    // For cargo test, the binary is in target/debug/
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("target");
    path.push("debug");
    path.push("chainform");
    path
}

/// Run chainform with the given arguments
fn run_chainform(args: &[&str]) -> std::process::Output {
    Command::new(chainform_binary())
        .args(args)
        .output()
        .expect("Failed to execute chainform")
}

/// Helper to get stdout as string
fn stdout_str(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Helper to get stderr as string
fn stderr_str(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

/// Write a file into the temp dir and return its path as a string
fn write_file(dir: &TempDir, name: &str, contents: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path.to_string_lossy().to_string()
}

const CHAINS_TOML: &str = r#"
[[chain]]
name = "conversion"

[[chain.steps]]
id = "part_no"
label = "Part No"
invalidates = ["grn_no", "bin_type"]
required = true

[[chain.steps]]
id = "grn_no"
label = "GRN No"
depends_on = ["part_no"]
invalidates = ["bin_type"]
required = true

[[chain.steps]]
id = "bin_type"
label = "Bin Type"
depends_on = ["part_no", "grn_no"]
"#;

const FIXTURE_JSON: &str = r#"{
    "options": [
        {
            "step": "grn_no",
            "upstream": ["PN-100"],
            "options": [
                {"value": "G1", "label": "GRN 1"},
                {"value": "G2", "label": "GRN 2", "extras": {"grn_date": "2025-02-01"}}
            ]
        },
        {
            "step": "bin_type",
            "upstream": ["PN-100", "G2"],
            "options": [
                {"value": "RACK", "label": "Rack"},
                {"value": "FLOOR", "label": "Floor"}
            ]
        }
    ],
    "candidates": [
        {"id": "c1", "fields": {"part_no": "PN-100", "grn_no": "G1"}},
        {"id": "c2", "fields": {"part_no": "PN-100", "grn_no": "G2"}},
        {"id": "c3", "fields": {"part_no": "PN-200", "grn_no": "G7"}}
    ]
}"#;

#[test]
fn test_validate_accepts_declaration() {
    let dir = TempDir::new().unwrap();
    let chains = write_file(&dir, "chains.toml", CHAINS_TOML);

    let output = run_chainform(&["validate", &chains]);
    assert!(
        output.status.success(),
        "validate failed: {}",
        stderr_str(&output)
    );
    let stdout = stdout_str(&output);
    assert!(stdout.contains("OK"));
    assert!(stdout.contains("chain 'conversion' (3 steps)"));
    assert!(stdout.contains("part_no"));
    assert!(stdout.contains("[required]"));
}

#[test]
fn test_validate_rejects_forward_dependency() {
    let dir = TempDir::new().unwrap();
    let chains = write_file(
        &dir,
        "chains.toml",
        r#"
        [[chain]]
        name = "broken"

        [[chain.steps]]
        id = "grn_no"
        label = "GRN No"
        depends_on = ["part_no"]

        [[chain.steps]]
        id = "part_no"
        label = "Part No"
        "#,
    );

    let output = run_chainform(&["validate", &chains]);
    assert!(!output.status.success());
    assert!(stderr_str(&output).contains("does not appear earlier"));
}

#[test]
fn test_run_replays_cascade_script() {
    let dir = TempDir::new().unwrap();
    let chains = write_file(&dir, "chains.toml", CHAINS_TOML);
    let fixture = write_file(&dir, "fixture.json", FIXTURE_JSON);
    let script = write_file(
        &dir,
        "script.json",
        r#"[
            {"op": "add_row"},
            {"op": "set", "row": 1, "field": "part_no", "value": "PN-100"},
            {"op": "select", "row": 1, "field": "grn_no", "value": "G2"},
            {"op": "save"}
        ]"#,
    );

    let output = run_chainform(&[
        "run", "--chains", &chains, "--fixture", &fixture, "--script", &script,
    ]);
    assert!(
        output.status.success(),
        "run failed: {}",
        stderr_str(&output)
    );
    let stdout = stdout_str(&output);
    assert!(stdout.contains("added"));
    assert!(stdout.contains("saved"));
    assert!(stdout.contains("grn_no=G2"));
    // Selecting G2 copied the option's sibling data into the row.
    assert!(stdout.contains("grn_date=2025-02-01"));
}

#[test]
fn test_run_json_snapshot() {
    let dir = TempDir::new().unwrap();
    let chains = write_file(&dir, "chains.toml", CHAINS_TOML);
    let fixture = write_file(&dir, "fixture.json", FIXTURE_JSON);
    let script = write_file(
        &dir,
        "script.json",
        r#"[
            {"op": "add_row"},
            {"op": "set", "row": 1, "field": "part_no", "value": "PN-100"},
            {"op": "set", "row": 1, "field": "grn_no", "value": "G1"},
            {"op": "save"}
        ]"#,
    );

    let output = run_chainform(&[
        "--json", "run", "--chains", &chains, "--fixture", &fixture, "--script", &script,
    ]);
    assert!(
        output.status.success(),
        "run failed: {}",
        stderr_str(&output)
    );
    let stdout = stdout_str(&output);
    assert!(stdout.contains("\"id\": \"row:1\""));
    assert!(stdout.contains("\"part_no\": \"PN-100\""));
}

#[test]
fn test_run_fill_flow() {
    let dir = TempDir::new().unwrap();
    let chains = write_file(&dir, "chains.toml", CHAINS_TOML);
    let fixture = write_file(&dir, "fixture.json", FIXTURE_JSON);
    let script = write_file(
        &dir,
        "script.json",
        r#"[
            {"op": "fill_load", "document": "DOC-1"},
            {"op": "fill_filter", "text": "pn-100"},
            {"op": "fill_select_all"},
            {"op": "fill_apply"},
            {"op": "save"}
        ]"#,
    );

    let output = run_chainform(&[
        "run", "--chains", &chains, "--fixture", &fixture, "--script", &script,
    ]);
    assert!(
        output.status.success(),
        "run failed: {}",
        stderr_str(&output)
    );
    let stdout = stdout_str(&output);
    assert!(stdout.contains("fill grid: 3 candidate(s)"));
    // The filter hides c3, so select-all merges exactly two rows.
    assert!(stdout.contains("2 visible"));
    assert!(stdout.contains("2 row(s) merged"));
    assert!(stdout.contains("saved"));
}

#[test]
fn test_run_surfaces_fetch_failure_as_notice() {
    let dir = TempDir::new().unwrap();
    let chains = write_file(&dir, "chains.toml", CHAINS_TOML);
    let fixture = write_file(
        &dir,
        "fixture.json",
        r#"{"options": [], "candidates": [], "fail": ["grn_no"]}"#,
    );
    let script = write_file(
        &dir,
        "script.json",
        r#"[
            {"op": "add_row"},
            {"op": "set", "row": 1, "field": "part_no", "value": "PN-100"},
            {"op": "save"}
        ]"#,
    );

    let output = run_chainform(&[
        "run", "--chains", &chains, "--fixture", &fixture, "--script", &script,
    ]);
    // Fetch failures and blocked saves are reported, not fatal.
    assert!(
        output.status.success(),
        "run failed: {}",
        stderr_str(&output)
    );
    let stdout = stdout_str(&output);
    assert!(stdout.contains("save blocked:"));
    assert!(stdout.contains("missing required fields: grn_no"));
    assert!(stdout.contains("notice"));
    assert!(stdout.contains("1 notice(s)"));
}
