#![allow(missing_docs)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use symmap::{SymbolKey, SymbolMapConfig, SymbolMapReader};
use tempfile::TempDir;

fn stdout_of(root: &Path, args: &[&str]) -> Vec<u8> {
    cargo_bin_cmd!("symmap")
        .env_remove("SYMMAP_ROOT")
        .env_remove("SYMMAP_CONFIG")
        .arg("--root")
        .arg(root)
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone()
}

fn json_of(root: &Path, args: &[&str]) -> Value {
    let mut full = vec!["--format", "json"];
    full.extend_from_slice(args);
    serde_json::from_slice(&stdout_of(root, &full)).expect("valid json")
}

fn seed(root: &Path) {
    stdout_of(root, &["create", "ticker", "--capacity", "8"]);
    stdout_of(root, &["append", "ticker", "AAPL", "MSFT", "AAPL", "GOOG"]);
}

#[test]
fn append_prints_assigned_keys() {
    let dir = TempDir::new().expect("tempdir");
    stdout_of(dir.path(), &["create", "ticker"]);
    let json = json_of(dir.path(), &["append", "ticker", "AAPL", "MSFT", "AAPL"]);
    let keys: Vec<i64> = json
        .as_array()
        .expect("array")
        .iter()
        .map(|entry| entry["key"].as_i64().expect("key"))
        .collect();
    assert_eq!(keys, vec![0, 1, 0]);

    let config = SymbolMapConfig::new(dir.path());
    let reader = SymbolMapReader::open(&config, "ticker", usize::MAX).expect("reader");
    assert_eq!(reader.count(), 2);
    assert_eq!(reader.key_of("MSFT"), SymbolKey(1));
}

#[test]
fn append_reads_stdin_when_no_values_given() {
    let dir = TempDir::new().expect("tempdir");
    stdout_of(dir.path(), &["create", "venue"]);
    let output = cargo_bin_cmd!("symmap")
        .env_remove("SYMMAP_CONFIG")
        .env("SYMMAP_ROOT", dir.path())
        .args(["append", "venue"])
        .write_stdin("XNAS\nXLON\nXNAS\n")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert_eq!(text, "0\tXNAS\n1\tXLON\n0\tXNAS\n");
}

#[test]
fn get_and_lookup() {
    let dir = TempDir::new().expect("tempdir");
    seed(dir.path());

    let json = json_of(dir.path(), &["get", "ticker", "2", "-1"]);
    assert_eq!(json[0]["value"], "GOOG");
    assert!(json[1]["value"].is_null());

    let json = json_of(dir.path(), &["lookup", "ticker", "MSFT", "IBM"]);
    assert_eq!(json[0]["key"], 1);
    assert_eq!(json[1]["key"], -2);
}

#[test]
fn get_out_of_range_fails() {
    let dir = TempDir::new().expect("tempdir");
    seed(dir.path());
    let output = cargo_bin_cmd!("symmap")
        .env_remove("SYMMAP_CONFIG")
        .arg("--root")
        .arg(dir.path())
        .args(["get", "ticker", "3"])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).expect("utf8");
    assert!(stderr.contains("Invalid key"), "{stderr}");
}

#[test]
fn info_reports_header_and_sizes() {
    let dir = TempDir::new().expect("tempdir");
    seed(dir.path());
    let json = json_of(dir.path(), &["info", "ticker"]);
    assert_eq!(json["name"], "ticker");
    assert_eq!(json["capacity"], 8);
    assert_eq!(json["cached"], true);
    assert_eq!(json["count"], 3);
    assert_eq!(json["format_version"], 1);
    assert_eq!(json["offsets_bytes"], 64 + 3 * 8);
    assert_eq!(json["values_bytes"], 15);
}

#[test]
fn rollback_then_dump() {
    let dir = TempDir::new().expect("tempdir");
    seed(dir.path());
    stdout_of(dir.path(), &["rollback", "ticker", "1"]);
    let text = String::from_utf8(stdout_of(dir.path(), &["dump", "ticker"])).expect("utf8");
    assert_eq!(text, "0\tAAPL\n");

    cargo_bin_cmd!("symmap")
        .env_remove("SYMMAP_CONFIG")
        .arg("--root")
        .arg(dir.path())
        .args(["rollback", "ticker", "5"])
        .assert()
        .failure();
}

#[test]
fn config_file_supplies_root() {
    let dir = TempDir::new().expect("tempdir");
    let config_path = dir.path().join("symmap.toml");
    let root = dir.path().join("data");
    std::fs::write(
        &config_path,
        format!("root = {:?}\nsynchronous = \"full\"\n", root.display().to_string()),
    )
    .expect("write config");
    cargo_bin_cmd!("symmap")
        .env_remove("SYMMAP_ROOT")
        .arg("--config")
        .arg(&config_path)
        .args(["create", "side"])
        .assert()
        .success();
    assert!(root.join("side.o").exists());
    assert!(root.join("side.c").exists());
}

#[test]
fn missing_column_fails() {
    let dir = TempDir::new().expect("tempdir");
    let output = cargo_bin_cmd!("symmap")
        .env_remove("SYMMAP_CONFIG")
        .arg("--root")
        .arg(dir.path())
        .args(["dump", "nothing"])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).expect("utf8");
    assert!(stderr.contains("does not exist"), "{stderr}");
}

#[test]
fn append_follows_stored_cache_flag() {
    let dir = TempDir::new().expect("tempdir");
    stdout_of(dir.path(), &["create", "raw", "--no-cache"]);
    let text = String::from_utf8(stdout_of(dir.path(), &["append", "raw", "a", "a"]))
        .expect("utf8");
    assert_eq!(text, "0\ta\n1\ta\n");

    let text = String::from_utf8(stdout_of(dir.path(), &["append", "raw", "--cache", "a"]))
        .expect("utf8");
    assert_eq!(text, "0\ta\n");

    stdout_of(dir.path(), &["create", "dedup"]);
    let text = String::from_utf8(stdout_of(dir.path(), &["append", "dedup", "a", "a"]))
        .expect("utf8");
    assert_eq!(text, "0\ta\n0\ta\n");
    let text = String::from_utf8(stdout_of(
        dir.path(),
        &["append", "dedup", "--no-cache", "a"],
    ))
    .expect("utf8");
    assert_eq!(text, "1\ta\n");
}
