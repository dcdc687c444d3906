//! Drives source units through downsampling, row building, batching and
//! writing, one unit at a time.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::batch::BatchAccumulator;
use crate::downsample::Downsampler;
use crate::error::Result;
use crate::source::SourceUnit;
use crate::tables::LoadPlan;
use crate::verify::{VerifyOutcome, verify_unit};
use crate::writer::RowSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseErrorPolicy {
    /// Drop the unit's pending rows, record the error, move on.
    #[default]
    SkipUnit,
    AbortRun,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineOptions {
    pub min_dt_ms: f64,
    pub dry_run: bool,
    pub verify: bool,
    pub print_every_flush: usize,
    pub parse_errors: ParseErrorPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            min_dt_ms: 100.0,
            dry_run: false,
            verify: false,
            print_every_flush: 1,
            parse_errors: ParseErrorPolicy::SkipUnit,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitSummary {
    pub unit: String,
    pub partition_id: i64,
    pub total_records: usize,
    pub kept_records: usize,
    pub rows_built: BTreeMap<&'static str, usize>,
    pub rows_written: BTreeMap<&'static str, usize>,
    pub verification: Vec<VerifyOutcome>,
    pub error: Option<String>,
}

impl UnitSummary {
    fn new(unit: &SourceUnit) -> Self {
        Self {
            unit: unit.name().to_string(),
            partition_id: unit.partition_id,
            ..Self::default()
        }
    }

    pub fn verified(&self) -> bool {
        self.verification.iter().all(VerifyOutcome::matched)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub started_at: String,
    pub finished_at: String,
    pub units_total: usize,
    pub units_succeeded: usize,
    pub units_failed: usize,
    pub rows_written: BTreeMap<&'static str, usize>,
    pub flushes: usize,
    pub errors: Vec<String>,
    pub units: Vec<UnitSummary>,
}

impl RunSummary {
    pub fn verify_mismatches(&self) -> usize {
        self.units
            .iter()
            .flat_map(|u| &u.verification)
            .filter(|v| !v.matched())
            .count()
    }
}

pub struct Pipeline<'a> {
    plan: &'a LoadPlan,
    options: PipelineOptions,
}

impl<'a> Pipeline<'a> {
    pub fn new(plan: &'a LoadPlan, options: PipelineOptions) -> Self {
        Self { plan, options }
    }

    /// Processes `units` in order. Write failures abort the run; parse and read
    /// failures follow the configured [`ParseErrorPolicy`].
    pub fn run(&self, units: &[SourceUnit], sink: &mut dyn RowSink) -> Result<RunSummary> {
        let mut summary = RunSummary {
            started_at: Utc::now().to_rfc3339(),
            units_total: units.len(),
            ..RunSummary::default()
        };
        let mut acc = BatchAccumulator::new(&self.plan.tables, self.options.print_every_flush);
        let mut downsampler = self
            .plan
            .downsample
            .then(|| Downsampler::new(self.options.min_dt_ms));

        for (idx, unit) in units.iter().enumerate() {
            info!(
                unit = unit.name(),
                partition = unit.partition_id,
                "[{}/{}] loading",
                idx + 1,
                units.len()
            );
            match self.process_unit(unit, &mut acc, downsampler.as_mut(), sink) {
                Ok(unit_summary) => {
                    for (table, rows) in &unit_summary.rows_written {
                        *summary.rows_written.entry(*table).or_default() += *rows;
                    }
                    summary.units_succeeded += 1;
                    summary.units.push(unit_summary);
                }
                Err(err)
                    if err.is_unit_scoped()
                        && self.options.parse_errors == ParseErrorPolicy::SkipUnit =>
                {
                    let dropped = acc.discard();
                    for (table, rows) in acc.take_written() {
                        *summary.rows_written.entry(table).or_default() += rows;
                    }
                    warn!(
                        unit = unit.name(),
                        partition = unit.partition_id,
                        dropped_rows = dropped,
                        error = %err,
                        "skipping unit"
                    );
                    summary.units_failed += 1;
                    summary.errors.push(format!("{}: {err}", unit.name()));
                    let mut failed = UnitSummary::new(unit);
                    failed.error = Some(err.to_string());
                    summary.units.push(failed);
                }
                Err(err) => return Err(err),
            }
        }

        summary.flushes = acc.flush_count();
        summary.finished_at = Utc::now().to_rfc3339();
        Ok(summary)
    }

    fn process_unit(
        &self,
        unit: &SourceUnit,
        acc: &mut BatchAccumulator,
        mut downsampler: Option<&mut Downsampler>,
        sink: &mut dyn RowSink,
    ) -> Result<UnitSummary> {
        let mut summary = UnitSummary::new(unit);
        if let Some(ds) = downsampler.as_deref_mut() {
            ds.reset();
        }

        for record in unit.records()? {
            let record = record?;
            summary.total_records += 1;
            if let Some(ds) = downsampler.as_deref_mut()
                && !ds.keep(&record)
            {
                continue;
            }
            summary.kept_records += 1;

            let mut rows = Vec::new();
            for builder in &self.plan.builders {
                let built = builder.build(&record, unit.partition_id);
                if built.is_empty() {
                    continue;
                }
                *summary.rows_built.entry(builder.table()).or_default() += built.len();
                rows.extend(built.into_iter().map(|row| (builder.table(), row)));
            }
            if let Some(stats) = acc.append_record(rows, sink)? {
                debug!(flush = stats.flush_no, rows = stats.unique_rows(), "threshold flush");
            }
        }

        acc.finish_unit(sink)?;
        summary.rows_written = acc.take_written();

        if self.options.verify && !self.options.dry_run {
            summary.verification = verify_unit(
                sink,
                &self.plan.tables,
                unit.partition_id,
                &summary.rows_written,
            );
        }

        info!(
            unit = unit.name(),
            partition = unit.partition_id,
            total = summary.total_records,
            kept = summary.kept_records,
            built = ?summary.rows_built,
            written = ?summary.rows_written,
            "unit done"
        );
        Ok(summary)
    }
}
