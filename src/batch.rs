use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info};

use crate::dedup::dedupe_last_wins;
use crate::error::{LoadError, Result};
use crate::row::{DedupScope, Row, TableSpec};
use crate::writer::RowSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    BatchThreshold,
    EndOfUnit,
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushReason::BatchThreshold => f.write_str("batch_threshold"),
            FlushReason::EndOfUnit => f.write_str("end_of_unit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableFlush {
    pub table: &'static str,
    pub raw: usize,
    pub unique: usize,
    /// First unique row of the flush, kept for diagnostics.
    pub sample: Option<Row>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlushStats {
    pub flush_no: usize,
    pub reason: FlushReason,
    pub tables: Vec<TableFlush>,
}

impl FlushStats {
    pub fn unique_rows(&self) -> usize {
        self.tables.iter().map(|t| t.unique).sum()
    }
}

/// Per-table row buffers. Batch-scoped tables are deduped and written as soon
/// as any of them reaches its threshold; unit-scoped tables are held until
/// [`BatchAccumulator::finish_unit`].
pub struct BatchAccumulator {
    tables: Vec<TableSpec>,
    buffers: Vec<Vec<Row>>,
    print_every: usize,
    flushes: usize,
    written: BTreeMap<&'static str, usize>,
}

impl BatchAccumulator {
    /// `print_every` of 0 silences per-flush logging.
    pub fn new(tables: &[TableSpec], print_every: usize) -> Self {
        Self {
            tables: tables.to_vec(),
            buffers: vec![Vec::new(); tables.len()],
            print_every,
            flushes: 0,
            written: BTreeMap::new(),
        }
    }

    fn index_of(&self, table: &str) -> Result<usize> {
        self.tables
            .iter()
            .position(|t| t.name == table)
            .ok_or_else(|| LoadError::Config(format!("row for unplanned table {table}")))
    }

    /// Buffers a row without checking thresholds.
    pub fn push(&mut self, table: &str, row: Row) -> Result<()> {
        let idx = self.index_of(table)?;
        self.buffers[idx].push(row);
        Ok(())
    }

    pub fn append(
        &mut self,
        table: &str,
        row: Row,
        sink: &mut dyn RowSink,
    ) -> Result<Option<FlushStats>> {
        self.push(table, row)?;
        self.flush_if_full(sink)
    }

    /// Buffers every row one record produced, then checks thresholds once so a
    /// record's rows land in the same flush.
    pub fn append_record(
        &mut self,
        rows: Vec<(&'static str, Row)>,
        sink: &mut dyn RowSink,
    ) -> Result<Option<FlushStats>> {
        for (table, row) in rows {
            self.push(table, row)?;
        }
        self.flush_if_full(sink)
    }

    fn flush_if_full(&mut self, sink: &mut dyn RowSink) -> Result<Option<FlushStats>> {
        if self.threshold_reached() {
            self.flush(FlushReason::BatchThreshold, sink)
        } else {
            Ok(None)
        }
    }

    pub fn threshold_reached(&self) -> bool {
        self.tables.iter().zip(&self.buffers).any(|(spec, buf)| {
            spec.dedup_scope == DedupScope::Batch && buf.len() >= spec.batch_threshold
        })
    }

    /// Dedupes and writes every batch-scoped buffer. A failed table keeps its
    /// (deduped) rows and the error is returned straight away.
    pub fn flush(
        &mut self,
        reason: FlushReason,
        sink: &mut dyn RowSink,
    ) -> Result<Option<FlushStats>> {
        let mut tables = Vec::new();
        for idx in 0..self.tables.len() {
            let batch_scoped = self.tables[idx].dedup_scope == DedupScope::Batch;
            if !batch_scoped || self.buffers[idx].is_empty() {
                continue;
            }
            tables.push(self.write_buffer(idx, None, sink)?);
        }
        Ok(self.record_flush(reason, tables))
    }

    /// End of a source unit: flushes batch-scoped tables and writes unit-scoped
    /// tables in chunks of their threshold.
    pub fn finish_unit(&mut self, sink: &mut dyn RowSink) -> Result<Option<FlushStats>> {
        let mut tables = Vec::new();
        for idx in 0..self.tables.len() {
            if self.buffers[idx].is_empty() {
                continue;
            }
            let chunk = match self.tables[idx].dedup_scope {
                DedupScope::Batch => None,
                DedupScope::Unit => Some(self.tables[idx].batch_threshold.max(1)),
            };
            tables.push(self.write_buffer(idx, chunk, sink)?);
        }
        Ok(self.record_flush(FlushReason::EndOfUnit, tables))
    }

    fn write_buffer(
        &mut self,
        idx: usize,
        chunk: Option<usize>,
        sink: &mut dyn RowSink,
    ) -> Result<TableFlush> {
        let spec = &self.tables[idx];
        let raw_rows = std::mem::take(&mut self.buffers[idx]);
        let raw = raw_rows.len();
        let unique = dedupe_last_wins(raw_rows, spec.key);

        let chunk = chunk.unwrap_or(unique.len().max(1));
        let failed = unique.chunks(chunk).find_map(|rows| sink.write(spec, rows).err());
        if let Some(err) = failed {
            self.buffers[idx] = unique;
            return Err(err);
        }

        *self.written.entry(spec.name).or_default() += unique.len();
        let sample = unique.first().cloned();
        if let Some(row) = &sample {
            debug!(
                table = spec.name,
                sample = %serde_json::to_string(row).unwrap_or_default(),
                "first unique row"
            );
        }
        Ok(TableFlush {
            table: spec.name,
            raw,
            unique: unique.len(),
            sample,
        })
    }

    fn record_flush(&mut self, reason: FlushReason, tables: Vec<TableFlush>) -> Option<FlushStats> {
        if tables.is_empty() {
            return None;
        }
        self.flushes += 1;
        let stats = FlushStats {
            flush_no: self.flushes,
            reason,
            tables,
        };
        if self.print_every > 0 && stats.flush_no % self.print_every == 0 {
            let detail = stats
                .tables
                .iter()
                .map(|t| format!("{} {}/{}", t.table, t.unique, t.raw))
                .collect::<Vec<_>>()
                .join(", ");
            info!(flush = stats.flush_no, reason = %reason, "flushed unique/raw: {detail}");
        }
        Some(stats)
    }

    /// Drops every pending row, e.g. after a parse error ends the unit.
    pub fn discard(&mut self) -> usize {
        self.buffers.iter_mut().map(|buf| std::mem::take(buf).len()).sum()
    }

    pub fn pending(&self) -> usize {
        self.buffers.iter().map(Vec::len).sum()
    }

    pub fn pending_for(&self, table: &str) -> usize {
        self.index_of(table).map(|idx| self.buffers[idx].len()).unwrap_or(0)
    }

    pub fn flush_count(&self) -> usize {
        self.flushes
    }

    /// Unique rows written per table since the last call.
    pub fn take_written(&mut self) -> BTreeMap<&'static str, usize> {
        std::mem::take(&mut self.written)
    }
}
