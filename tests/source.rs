use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use bzip2::write::BzEncoder;
use flate2::write::GzEncoder;
use pitch_loader::error::LoadError;
use pitch_loader::source::{SourceKind, SourceUnit, UnitFilter, discover_units, read_json_array};
use serde_json::{Value, json};
use tempfile::TempDir;

const LINES: &str = "{\"frameNum\": 1}\n\n{\"frameNum\": 2}\n   \n{\"frameNum\": 3}\n";

fn write_bz2(path: &Path, body: &str) {
    let mut enc = BzEncoder::new(File::create(path).unwrap(), bzip2::Compression::default());
    enc.write_all(body.as_bytes()).unwrap();
    enc.finish().unwrap();
}

fn write_gz(path: &Path, body: &str) {
    let mut enc = GzEncoder::new(File::create(path).unwrap(), flate2::Compression::default());
    enc.write_all(body.as_bytes()).unwrap();
    enc.finish().unwrap();
}

fn frame_nums(path: PathBuf) -> Vec<i64> {
    let unit = SourceUnit::from_path(path).expect("partition id");
    unit.records()
        .unwrap()
        .map(|r| r.unwrap()["frameNum"].as_i64().unwrap())
        .collect()
}

#[test]
fn reads_every_compression_and_skips_blank_lines() {
    let dir = TempDir::new().unwrap();
    let bz = dir.path().join("3812.jsonl.bz2");
    let gz = dir.path().join("3813.jsonl.gz");
    let plain = dir.path().join("3814.jsonl");
    write_bz2(&bz, LINES);
    write_gz(&gz, LINES);
    fs::write(&plain, LINES).unwrap();

    for path in [bz, gz, plain] {
        assert_eq!(frame_nums(path), vec![1, 2, 3]);
    }
}

#[test]
fn bad_line_reports_its_line_number_and_stops() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("3812.jsonl.bz2");
    write_bz2(&path, "{\"frameNum\": 1}\n\n{\"frameNum\": \n{\"frameNum\": 4}\n");

    let unit = SourceUnit::from_path(path).unwrap();
    let items = unit.records().unwrap().collect::<Vec<_>>();

    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    match &items[1] {
        Err(LoadError::Parse { line, .. }) => assert_eq!(*line, 3),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn array_sources_accept_arrays_and_single_objects() {
    let dir = TempDir::new().unwrap();
    let array = dir.path().join("3812.json");
    let single = dir.path().join("3813.json");
    fs::write(&array, r#"[{"gameEventId": 1}, {"gameEventId": 2}]"#).unwrap();
    fs::write(&single, r#"{"id": 3813}"#).unwrap();

    assert_eq!(read_json_array(&array).unwrap().len(), 2);
    assert_eq!(read_json_array(&single).unwrap(), vec![json!({"id": 3813})]);

    let unit = SourceUnit::from_path(single).unwrap();
    assert_eq!(unit.kind, SourceKind::JsonArray);
    let records = unit.records().unwrap().collect::<Result<Vec<Value>, _>>().unwrap();
    assert_eq!(records.len(), 1);
}

#[test]
fn array_source_with_bad_json_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("3812.json");
    fs::write(&path, "[{\"id\": 1},").unwrap();
    assert!(matches!(read_json_array(&path), Err(LoadError::Parse { .. })));
}

#[test]
fn discovery_sorts_filters_and_limits() {
    let dir = TempDir::new().unwrap();
    for name in ["4001.jsonl.bz2", "3812.jsonl.bz2", "3900.jsonl.bz2", "notes.jsonl.bz2"] {
        write_bz2(&dir.path().join(name), "");
    }
    let pattern = format!("{}/*.jsonl.bz2", dir.path().display());

    let all = discover_units(&pattern, &UnitFilter::default()).unwrap();
    let ids = all.iter().map(|u| u.partition_id).collect::<Vec<_>>();
    assert_eq!(ids, vec![3812, 3900, 4001]);

    let only = discover_units(
        &pattern,
        &UnitFilter {
            only_partition: Some(3900),
            max_units: None,
        },
    )
    .unwrap();
    assert_eq!(only.len(), 1);
    assert_eq!(only[0].name(), "3900.jsonl.bz2");

    let limited = discover_units(
        &pattern,
        &UnitFilter {
            only_partition: None,
            max_units: Some(2),
        },
    )
    .unwrap();
    assert_eq!(limited.len(), 2);
}
