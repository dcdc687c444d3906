use std::collections::BTreeMap;

use pitch_loader::batch::{BatchAccumulator, FlushReason};
use pitch_loader::error::{LoadError, Result};
use pitch_loader::row::{Row, TableSpec};
use pitch_loader::writer::RowSink;

/// Remembers every write; can be told to reject one table.
#[derive(Default)]
struct RecordingSink {
    writes: Vec<(&'static str, Vec<Row>)>,
    reject: Option<&'static str>,
}

impl RecordingSink {
    fn rows_for(&self, table: &str) -> usize {
        self.writes
            .iter()
            .filter(|(t, _)| *t == table)
            .map(|(_, rows)| rows.len())
            .sum()
    }
}

impl RowSink for RecordingSink {
    fn write(&mut self, table: &TableSpec, rows: &[Row]) -> Result<()> {
        if self.reject == Some(table.name) {
            return Err(LoadError::PermanentWrite {
                table: table.name.to_string(),
                rows: rows.len(),
                attempt: 1,
                message: "http 400: rejected".into(),
            });
        }
        self.writes.push((table.name, rows.to_vec()));
        Ok(())
    }
}

fn tables() -> Vec<TableSpec> {
    vec![
        TableSpec::new("frames", &["game_id", "frame_num"]).threshold(3),
        TableSpec::new("players", &["game_id", "frame_num", "jersey_num"]).threshold(100),
    ]
}

fn frame(frame_num: i64) -> Row {
    Row::new().with("game_id", 3812).with("frame_num", frame_num)
}

fn player(frame_num: i64, jersey: i64) -> Row {
    frame(frame_num).with("jersey_num", jersey)
}

#[test]
fn reaching_threshold_flushes_exactly_once() {
    let mut acc = BatchAccumulator::new(&tables(), 0);
    let mut sink = RecordingSink::default();

    assert!(acc.append("frames", frame(1), &mut sink).unwrap().is_none());
    assert!(acc.append("frames", frame(2), &mut sink).unwrap().is_none());
    let stats = acc
        .append("frames", frame(3), &mut sink)
        .unwrap()
        .expect("third row reaches threshold");

    assert_eq!(stats.flush_no, 1);
    assert_eq!(stats.reason, FlushReason::BatchThreshold);
    assert_eq!(sink.writes.len(), 1);
    assert_eq!(acc.pending(), 0);
    assert_eq!(acc.flush_count(), 1);
}

#[test]
fn one_full_table_flushes_every_batch_table() {
    let mut acc = BatchAccumulator::new(&tables(), 0);
    let mut sink = RecordingSink::default();

    for n in 1..=3 {
        acc.append_record(vec![("frames", frame(n)), ("players", player(n, 10))], &mut sink)
            .unwrap();
    }

    assert_eq!(sink.rows_for("frames"), 3);
    assert_eq!(sink.rows_for("players"), 3);
    assert_eq!(acc.pending_for("players"), 0);
}

#[test]
fn duplicates_are_collapsed_before_writing() {
    let mut acc = BatchAccumulator::new(&tables(), 0);
    let mut sink = RecordingSink::default();

    acc.push("frames", frame(1).with("period", 1)).unwrap();
    acc.push("frames", frame(1).with("period", 2)).unwrap();
    let stats = acc.finish_unit(&mut sink).unwrap().expect("pending rows flushed");

    assert_eq!(stats.tables[0].raw, 2);
    assert_eq!(stats.tables[0].unique, 1);
    assert_eq!(sink.writes[0].1, vec![frame(1).with("period", 2)]);
    assert_eq!(acc.take_written(), BTreeMap::from([("frames", 1)]));
}

#[test]
fn flush_stats_carry_first_unique_row_per_table() {
    let mut acc = BatchAccumulator::new(&tables(), 1);
    let mut sink = RecordingSink::default();

    acc.push("frames", frame(2).with("period", 1)).unwrap();
    acc.push("frames", frame(1)).unwrap();
    acc.push("frames", frame(2).with("period", 2)).unwrap();
    acc.push("players", player(2, 9)).unwrap();
    let stats = acc.finish_unit(&mut sink).unwrap().expect("pending rows flushed");

    assert_eq!(stats.tables.len(), 2);
    // Last write wins but the key keeps its first-seen slot.
    assert_eq!(stats.tables[0].sample, Some(frame(2).with("period", 2)));
    assert_eq!(stats.tables[1].sample, Some(player(2, 9)));
}

#[test]
fn empty_flush_is_not_counted() {
    let mut acc = BatchAccumulator::new(&tables(), 1);
    let mut sink = RecordingSink::default();
    assert!(acc.flush(FlushReason::EndOfUnit, &mut sink).unwrap().is_none());
    assert_eq!(acc.flush_count(), 0);
    assert!(sink.writes.is_empty());
}

#[test]
fn failed_table_keeps_its_rows() {
    let mut acc = BatchAccumulator::new(&tables(), 0);
    let mut sink = RecordingSink {
        reject: Some("players"),
        ..RecordingSink::default()
    };

    acc.push("frames", frame(1)).unwrap();
    acc.push("players", player(1, 7)).unwrap();
    acc.push("players", player(1, 8)).unwrap();
    let err = acc.flush(FlushReason::BatchThreshold, &mut sink).unwrap_err();

    assert!(matches!(
        err,
        LoadError::PermanentWrite { ref table, rows: 2, .. } if table == "players"
    ));
    assert_eq!(acc.pending_for("frames"), 0);
    assert_eq!(acc.pending_for("players"), 2);

    sink.reject = None;
    acc.flush(FlushReason::BatchThreshold, &mut sink).unwrap();
    assert_eq!(sink.rows_for("players"), 2);
    assert_eq!(acc.pending(), 0);
}
