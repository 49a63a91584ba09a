//! CLI integration tests for all subcommands.
//!
//! Uses `assert_cmd` to spawn the `pmsi` binary and verify exit codes,
//! stdout content, and stderr content. Table and stay files are written
//! to temporary directories.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Helper: create a Command for the `pmsi` binary with logs silenced.
fn pmsi() -> Command {
    let mut cmd = cargo_bin_cmd!("pmsi");
    cmd.env("PMSI_LOG", "off");
    cmd
}

fn write_json(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

/// A price file alone: it builds an index, but not a usable one.
fn write_prices(dir: &Path) -> PathBuf {
    write_json(
        dir,
        "prices.json",
        &json!({
            "tables": [{
                "date": "2019-03-01",
                "sector": "public",
                "ghs_coefficient": "0.993",
                "supplements": { "REA": 81254 },
                "ghs": { "1500": { "price_cents": 102460 } }
            }]
        }),
    )
}

fn write_stays(dir: &Path) -> PathBuf {
    write_json(
        dir,
        "stays.json",
        &json!([{
            "bill_id": 1,
            "sex": 2,
            "birthdate": "1980-05-04",
            "entry_date": "2019-04-01",
            "entry_mode": 8,
            "entry_origin": "",
            "exit_date": "2019-04-03",
            "exit_mode": 8,
            "exit_destination": "",
            "unit": 1203,
            "dp": "K359",
            "das": ["E119"],
            "procedures": [{ "code": "HHFA016", "activity": 1, "date": "2019-04-01" }]
        }]),
    )
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    pmsi()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "MCO hospital stay classifier and pricer",
        ));
}

#[test]
fn version_exits_0() {
    pmsi()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pmsi"));
}

#[test]
fn classify_help_lists_dispense_modes() {
    pmsi()
        .args(["classify", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dispense"))
        .stdout(predicate::str::contains("ExJ2"));
}

// ──────────────────────────────────────────────
// 2. Tables subcommand
// ──────────────────────────────────────────────

#[test]
fn tables_json_lists_price_index() {
    let dir = TempDir::new().unwrap();
    let prices = write_prices(dir.path());

    let output = pmsi()
        .args(["--output", "json", "tables", "-t"])
        .arg(&prices)
        .output()
        .unwrap();
    assert!(output.status.success());

    let value = stdout_json(&output);
    assert_eq!(value["tables"], 1);
    assert_eq!(value["indexes"].as_array().unwrap().len(), 1);
    assert_eq!(value["indexes"][0]["start"], "2019-03-01");
    assert_eq!(value["indexes"][0]["valid"], false);
    assert_eq!(value["indexes"][0]["counts"]["prices"][0], 1);
    assert_eq!(value["fingerprint"].as_str().unwrap().len(), 64);
}

#[test]
fn tables_fingerprint_is_stable() {
    let dir = TempDir::new().unwrap();
    let prices = write_prices(dir.path());

    let run = || {
        let output = pmsi()
            .args(["--output", "json", "tables", "-T"])
            .arg(dir.path())
            .output()
            .unwrap();
        assert!(output.status.success());
        stdout_json(&output)["fingerprint"].clone()
    };
    assert_eq!(run(), run());
    assert!(prices.exists());
}

#[test]
fn tables_text_output_has_title() {
    let dir = TempDir::new().unwrap();
    let prices = write_prices(dir.path());

    pmsi()
        .args(["tables", "-t"])
        .arg(&prices)
        .assert()
        .success()
        .stdout(predicate::str::contains("Table Indexes"))
        .stdout(predicate::str::contains("2019-03-01"));
}

#[test]
fn json_log_format_writes_one_object_per_line() {
    let dir = TempDir::new().unwrap();
    let prices = write_prices(dir.path());

    let output = pmsi()
        .env("PMSI_LOG", "pmsi=info")
        .args(["--log-format", "json", "tables", "-t"])
        .arg(&prices)
        .output()
        .unwrap();
    assert!(output.status.success());

    let stderr = String::from_utf8(output.stderr).unwrap();
    let lines: Vec<Value> = stderr
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert!(lines
        .iter()
        .any(|line| line["fields"]["message"] == "table set ready"));
}

#[test]
fn tables_unknown_extension_exits_1() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tables.txt");
    fs::write(&path, "not a table").unwrap();

    pmsi()
        .args(["tables", "-t"])
        .arg(&path)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unknown extension"));
}

#[test]
fn tables_malformed_price_file_exits_1() {
    let dir = TempDir::new().unwrap();
    let path = write_json(dir.path(), "prices.json", &json!({ "ghs": {} }));

    pmsi()
        .args(["tables", "-t"])
        .arg(&path)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("prices.json"));
}

// ──────────────────────────────────────────────
// 3. Classify subcommand
// ──────────────────────────────────────────────

#[test]
fn classify_without_valid_index_fails_the_admission() {
    let dir = TempDir::new().unwrap();
    let prices = write_prices(dir.path());
    let stays = write_stays(dir.path());

    let output = pmsi()
        .args(["--output", "json", "classify", "--verbose", "-t"])
        .arg(&prices)
        .arg(&stays)
        .output()
        .unwrap();
    assert!(output.status.success());

    let value = stdout_json(&output);
    assert_eq!(value["summary"]["results_count"], 1);
    assert_eq!(value["summary"]["failures_count"], 1);
    assert_eq!(value["summary"]["total_cents"], 0);
    let ghm = value["results"][0]["ghm"].as_str().unwrap();
    assert!(ghm.starts_with("90Z"), "unexpected GHM {ghm}");
    assert!(value.get("dues").is_none());
}

#[test]
fn classify_text_summary() {
    let dir = TempDir::new().unwrap();
    let prices = write_prices(dir.path());
    let stays = write_stays(dir.path());

    pmsi()
        .args(["classify", "-t"])
        .arg(&prices)
        .arg(&stays)
        .assert()
        .success()
        .stdout(predicate::str::contains("Summary"))
        .stdout(predicate::str::contains("Admissions: 1 (1 stays), 1 failures"))
        .stdout(predicate::str::contains("Total: 0.00"));
}

#[test]
fn classify_dispense_outputs_dues() {
    let dir = TempDir::new().unwrap();
    let prices = write_prices(dir.path());
    let stays = write_stays(dir.path());

    let output = pmsi()
        .args(["--output", "json", "classify", "--dispense", "exj", "-t"])
        .arg(&prices)
        .arg(&stays)
        .output()
        .unwrap();
    assert!(output.status.success());

    let value = stdout_json(&output);
    assert_eq!(value["dispense_mode"], "ExJ");
    assert!(value["dues"].is_array());
}

#[test]
fn classify_missing_stay_file_exits_1() {
    let dir = TempDir::new().unwrap();
    let prices = write_prices(dir.path());

    pmsi()
        .args(["classify", "-t"])
        .arg(&prices)
        .arg(dir.path().join("missing.json"))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error loading stays"));
}

#[test]
fn classify_json_errors_go_to_stderr() {
    let dir = TempDir::new().unwrap();
    let prices = write_prices(dir.path());

    let output = pmsi()
        .args(["--output", "json", "classify", "-t"])
        .arg(&prices)
        .arg(dir.path().join("missing.json"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());

    let error: Value = serde_json::from_slice(&output.stderr).unwrap();
    assert!(error["error"].as_str().unwrap().contains("missing.json"));
}

#[test]
fn classify_bad_authorization_file_exits_1() {
    let dir = TempDir::new().unwrap();
    let prices = write_prices(dir.path());
    let stays = write_stays(dir.path());
    let auth = dir.path().join("auth.json");
    fs::write(&auth, "{ not json").unwrap();

    pmsi()
        .args(["classify", "-A"])
        .arg(&auth)
        .arg("-t")
        .arg(&prices)
        .arg(&stays)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error loading authorizations"));
}

#[test]
fn classify_rejects_unknown_dispense_mode() {
    pmsi()
        .args(["classify", "--dispense", "K", "stays.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown dispense mode"));
}

#[test]
fn classify_rejects_unknown_sector() {
    pmsi()
        .args(["classify", "--sector", "mixed", "stays.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("sector"));
}

#[test]
fn classify_requires_stay_files() {
    pmsi().arg("classify").assert().failure();
}

#[test]
fn quiet_suppresses_output() {
    let dir = TempDir::new().unwrap();
    let prices = write_prices(dir.path());
    let stays = write_stays(dir.path());

    pmsi()
        .args(["--quiet", "classify", "-t"])
        .arg(&prices)
        .arg(&stays)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

// ──────────────────────────────────────────────
// 4. Constraints subcommand
// ──────────────────────────────────────────────

#[test]
fn constraints_without_valid_index_exits_1() {
    let dir = TempDir::new().unwrap();
    let prices = write_prices(dir.path());

    pmsi()
        .args(["constraints", "--date", "2019-06-01", "-t"])
        .arg(&prices)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no valid table index for 2019-06-01"));
}

#[test]
fn constraints_rejects_malformed_date() {
    pmsi()
        .args(["constraints", "--date", "June"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("malformed date"));
}
