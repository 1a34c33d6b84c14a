#![allow(missing_docs)]

mod common;

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use serde_json::Value;

use common::Fixture;

fn atlas(fixture: &Fixture) -> Command {
    let mut cmd = cargo_bin_cmd!("atlas");
    cmd.env_remove("ATLAS_DATA_DIR")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(fixture.config_path());
    cmd
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("valid json")
}

#[test]
fn sources_lists_resolved_paths() {
    let fixture = Fixture::new();
    let json = json_stdout(atlas(&fixture).args(["--format", "json", "sources"]));

    let entries = json.as_array().expect("array");
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["source"], "PO");
    assert_eq!(entries[0]["exists"], true);

    let output = atlas(&fixture)
        .arg("sources")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.contains("ONHAND"));
    assert!(!text.contains("(missing)"));
}

#[test]
fn schema_prints_canonical_columns() {
    let fixture = Fixture::new();
    let json = json_stdout(atlas(&fixture).args(["--format", "json", "schema", "onhand"]));

    assert_eq!(json["source"], "ONHAND");
    let columns: Vec<&str> = json["columns"]
        .as_array()
        .expect("columns")
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(columns.contains(&"onhand_qty"));
    assert!(columns.contains(&"available_qty"));
}

#[test]
fn schema_of_unconfigured_source_fails() {
    let fixture = Fixture::new();
    atlas(&fixture).args(["schema", "LPN"]).assert().failure().code(1);
}

#[test]
fn plan_honours_intent_and_source_overrides() {
    let fixture = Fixture::new();
    let json = json_stdout(atlas(&fixture).args([
        "--format",
        "json",
        "plan",
        "--question",
        "show purchase order PO-0000173",
        "--intent",
        "transactional",
        "--source",
        "PO",
    ]));

    assert_eq!(json["intent"], "TRANSACTIONAL");
    assert_eq!(json["steps"][0]["op"], "filter");
    assert_eq!(json["steps"][0]["source"], "PO");
    assert_eq!(json["steps"][0]["params"]["limit"], 5000);
}

#[test]
fn run_executes_request_file() {
    let fixture = Fixture::new();
    let request = fixture.path().join("request.json");
    fs::write(
        &request,
        r#"{"intent": "TRANSACTIONAL", "target": "PO",
            "filters": [{"col": "po_number", "op": "eq", "value": "PO-0000173"}]}"#,
    )
    .expect("write request");

    let json = json_stdout(
        atlas(&fixture)
            .args(["--format", "json", "run", "-q", "status of PO-0000173", "--request"])
            .arg(&request),
    );

    assert_eq!(json["rows"].as_array().map(Vec::len), Some(1));
    assert_eq!(json["rows"][0]["po_status"], "OPEN");
    assert_eq!(json["meta"]["lineage"][0]["rows_after_step"], 1);
    assert_eq!(json["meta"]["plan_intent"], "TRANSACTIONAL");
    assert!(json["request_id"].as_str().is_some_and(|id| id.contains('-')));
}

#[test]
fn run_exits_with_two_when_a_step_fails() {
    let fixture = Fixture::new();
    let request = fixture.path().join("bad.json");
    fs::write(
        &request,
        r#"{"intent": "TRANSACTIONAL", "source": "PO",
            "filters": [{"col": "warehouse_code", "value": "W1"}]}"#,
    )
    .expect("write request");

    let output = atlas(&fixture)
        .args(["--format", "json", "run", "-q", "lookup", "--request"])
        .arg(&request)
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(json["meta"]["lineage"][0]["error_code"], "ColumnNotFound");
}

#[test]
fn missing_config_file_is_reported() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    cargo_bin_cmd!("atlas")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .arg("sources")
        .assert()
        .failure()
        .code(1);
}
