// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Sample {
    name: String,
    count: u32,
}

#[test]
fn missing_file_reads_as_none() {
    let dir = tempfile::tempdir().unwrap();
    let got: Option<Sample> = read_json(&dir.path().join("absent.json")).unwrap();
    assert!(got.is_none());
}

#[test]
fn write_then_read_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.json");
    let value = Sample { name: "claw".to_string(), count: 3 };
    write_json(&path, &value).unwrap();
    let got: Option<Sample> = read_json(&path).unwrap();
    assert_eq!(got, Some(value));
}

#[test]
fn write_leaves_no_tmp_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.json");
    write_json(&path, &Sample { name: "x".to_string(), count: 0 }).unwrap();
    assert!(!dir.path().join("doc.json.tmp").exists());
}

#[test]
fn corrupt_document_is_quarantined_and_reads_as_none() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.json");
    std::fs::write(&path, "{not json at all").unwrap();

    let got: Option<Sample> = read_json(&path).unwrap();
    assert!(got.is_none());
    assert!(!path.exists(), "corrupt original should be renamed away");

    let quarantined: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("doc.json.corrupted."))
        .collect();
    assert_eq!(quarantined.len(), 1);
}

#[test]
fn write_creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a/b/doc.json");
    write_json(&path, &Sample { name: "nested".to_string(), count: 1 }).unwrap();
    assert!(path.exists());
}
