#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use sombra_counts::storage::counts::{write_file, IndexRef};
use sombra_counts::types::{IndexId, LabelId, PropId, TypeId};
use sombra_counts::{CounterKey, CountsSnapshot, FormatVersion, SnapshotCodec};
use tempfile::TempDir;

fn demo_snapshot() -> CountsSnapshot {
    let mut entries = BTreeMap::new();
    entries.insert(CounterKey::node(LabelId::ANY), vec![3]);
    entries.insert(CounterKey::node(1), vec![2]);
    entries.insert(CounterKey::relationship(1, TypeId(4), LabelId::ANY), vec![1]);
    entries.insert(CounterKey::index_sample(IndexId(1)), vec![5, 5]);
    CountsSnapshot::new(42, entries)
}

fn setup_file(name: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join(format!("{name}.snap"));
    write_file(&path, &demo_snapshot(), FormatVersion::V2).expect("write snapshot");
    (dir, path)
}

#[test]
fn inspect_emits_json() {
    let (_dir, path) = setup_file("inspect");
    let output = cargo_bin_cmd!("sombra-counts")
        .env_remove("SOMBRA_COUNTS_CONFIG")
        .args(["--format", "json", "inspect"])
        .arg(&path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(json["tx_id"].as_u64(), Some(42));
    assert_eq!(json["entry_count"].as_u64(), Some(4));
    assert_eq!(json["format_version"].as_u64(), Some(2));
    assert!(json["framed"].as_bool().unwrap_or(false));
    let entries = json["entries"].as_array().expect("entries array");
    assert_eq!(entries[0]["kind"], "node");
    assert_eq!(entries[0]["key"], "node(label=*)");
    assert_eq!(entries[3]["kind"], "index_sample");
    assert_eq!(entries[3]["values"], serde_json::json!([5, 5]));
}

#[test]
fn inspect_prints_text() {
    let (_dir, path) = setup_file("inspect_text");
    let output = cargo_bin_cmd!("sombra-counts")
        .env_remove("SOMBRA_COUNTS_CONFIG")
        .arg("inspect")
        .arg(&path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.contains("tx_id=42"));
    assert!(text.contains("entries=4"));
    assert!(text.contains("= [5, 5]"));
}

#[test]
fn verify_succeeds_on_intact_file() {
    let (_dir, path) = setup_file("verify");
    let output = cargo_bin_cmd!("sombra-counts")
        .env_remove("SOMBRA_COUNTS_CONFIG")
        .args(["--format", "json", "verify"])
        .arg(&path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert!(json["success"].as_bool().unwrap_or(false));
    assert_eq!(json["tx_id"].as_u64(), Some(42));
}

#[test]
fn verify_fails_on_corruption() {
    let (_dir, path) = setup_file("corrupt");
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    fs::write(&path, &bytes).unwrap();

    let output = cargo_bin_cmd!("sombra-counts")
        .env_remove("SOMBRA_COUNTS_CONFIG")
        .args(["--format", "json", "verify"])
        .arg(&path)
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(json["success"].as_bool(), Some(false));
    assert!(json["error"]
        .as_str()
        .unwrap_or_default()
        .contains("checksum"));
}

#[test]
fn raw_legacy_body_uses_config_format() {
    let dir = TempDir::new().expect("tempdir");
    let body_path = dir.path().join("legacy.body");
    let config_path = dir.path().join("counts.toml");

    let mut entries = BTreeMap::new();
    entries.insert(
        CounterKey::index_statistics(IndexRef::Legacy {
            label: LabelId(2),
            property_key: PropId(3),
        }),
        vec![0, 11],
    );
    let body = SnapshotCodec::legacy()
        .encode(&CountsSnapshot::new(9, entries))
        .unwrap();
    fs::write(&body_path, body).unwrap();
    fs::write(&config_path, "format_version = \"v1\"\n").unwrap();

    let output = cargo_bin_cmd!("sombra-counts")
        .args(["--format", "json", "--config"])
        .arg(&config_path)
        .args(["inspect", "--raw"])
        .arg(&body_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(json["format_version"].as_u64(), Some(1));
    assert_eq!(json["framed"].as_bool(), Some(false));
    assert_eq!(
        json["entries"][0]["key"],
        "index_statistics(label=2, property_key=3)"
    );
}

#[test]
fn missing_file_exits_with_error() {
    let dir = TempDir::new().expect("tempdir");
    cargo_bin_cmd!("sombra-counts")
        .env_remove("SOMBRA_COUNTS_CONFIG")
        .arg("verify")
        .arg(dir.path().join("absent.snap"))
        .assert()
        .code(1);
}
