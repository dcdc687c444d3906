use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::row::TableSpec;
use crate::writer::RowSink;

/// Read-after-write check for one table and partition. Mismatches are data,
/// not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub table: &'static str,
    pub partition_id: i64,
    pub expected: usize,
    pub actual: Option<u64>,
    pub error: Option<String>,
}

impl VerifyOutcome {
    pub fn matched(&self) -> bool {
        self.actual == Some(self.expected as u64)
    }
}

/// Counts stored rows for `partition_id` in every partitioned table and compares
/// them with what the unit wrote. Tables the sink cannot count are skipped.
pub fn verify_unit(
    sink: &mut dyn RowSink,
    tables: &[TableSpec],
    partition_id: i64,
    expected: &BTreeMap<&'static str, usize>,
) -> Vec<VerifyOutcome> {
    let mut outcomes = Vec::new();
    for table in tables.iter().filter(|t| t.partition_column.is_some()) {
        let Some(result) = sink.count(table, partition_id) else {
            continue;
        };
        let expected = expected.get(table.name).copied().unwrap_or(0);
        let outcome = match result {
            Ok(actual) => VerifyOutcome {
                table: table.name,
                partition_id,
                expected,
                actual: Some(actual),
                error: None,
            },
            Err(err) => VerifyOutcome {
                table: table.name,
                partition_id,
                expected,
                actual: None,
                error: Some(err.to_string()),
            },
        };

        match (&outcome.actual, &outcome.error) {
            (_, Some(err)) => warn!(
                table = table.name,
                partition = partition_id,
                error = %err,
                "verify: count failed"
            ),
            (Some(actual), None) if outcome.matched() => {
                info!(table = table.name, partition = partition_id, rows = actual, "verify: ok")
            }
            (actual, None) => warn!(
                table = table.name,
                partition = partition_id,
                expected,
                actual = ?actual,
                "verify: count mismatch"
            ),
        }
        outcomes.push(outcome);
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::row::Row;
    use crate::store::StoreError;

    struct FixedCounts;

    impl RowSink for FixedCounts {
        fn write(&mut self, _table: &TableSpec, _rows: &[Row]) -> Result<()> {
            Ok(())
        }

        fn count(
            &mut self,
            table: &TableSpec,
            _partition_id: i64,
        ) -> Option<std::result::Result<u64, StoreError>> {
            match table.name {
                "frames" => Some(Ok(4)),
                "balls" => Some(Err(StoreError::new("http 500: boom"))),
                _ => Some(Ok(1)),
            }
        }
    }

    #[test]
    fn mismatches_and_failures_are_reported_not_raised() {
        let tables = [
            TableSpec::new("frames", &["game_id", "frame_num"]).partitioned_by("game_id"),
            TableSpec::new("balls", &["game_id", "frame_num"]).partitioned_by("game_id"),
            TableSpec::new("players", &["id"]),
        ];
        let expected = BTreeMap::from([("frames", 4usize), ("balls", 2usize)]);
        let outcomes = verify_unit(&mut FixedCounts, &tables, 3812, &expected);
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].matched());
        assert!(!outcomes[1].matched());
        assert!(outcomes[1].error.as_deref().unwrap().contains("500"));
    }
}
