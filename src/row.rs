use serde::Serialize;
use serde_json::{Map, Value};

/// One output row: column name to nullable JSON value.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Row(Map<String, Value>);

impl Row {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.0.insert(column.to_string(), value.into());
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.0.insert(column.to_string(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Values of `key` columns in order. Missing columns read as JSON null.
    pub fn key_of(&self, key: &[&str]) -> RowKey {
        RowKey(
            key.iter()
                .map(|col| self.0.get(*col).map(Value::to_string).unwrap_or_else(|| "null".into()))
                .collect(),
        )
    }
}

impl From<Map<String, Value>> for Row {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Hashable composite key value: canonical JSON text of each key column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey(Vec<String>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupScope {
    /// Dedupe and write at every flush. Memory stays bounded by the threshold.
    #[default]
    Batch,
    /// Hold the whole source unit, dedupe once, write in threshold-sized chunks.
    Unit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub key: &'static [&'static str],
    pub partition_column: Option<&'static str>,
    pub batch_threshold: usize,
    pub dedup_scope: DedupScope,
}

impl TableSpec {
    pub const fn new(name: &'static str, key: &'static [&'static str]) -> Self {
        Self {
            name,
            key,
            partition_column: None,
            batch_threshold: 500,
            dedup_scope: DedupScope::Batch,
        }
    }

    pub const fn partitioned_by(mut self, column: &'static str) -> Self {
        self.partition_column = Some(column);
        self
    }

    pub const fn threshold(mut self, rows: usize) -> Self {
        self.batch_threshold = rows;
        self
    }

    pub const fn scope(mut self, scope: DedupScope) -> Self {
        self.dedup_scope = scope;
        self
    }

    pub fn key_of(&self, row: &Row) -> RowKey {
        row.key_of(self.key)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn key_distinguishes_types_and_missing_columns() {
        let a = Row::new().with("id", 1).with("side", "home");
        let b = Row::new().with("id", "1").with("side", "home");
        let c = Row::new().with("side", "home");
        let key = ["id", "side"];
        assert_ne!(a.key_of(&key), b.key_of(&key));
        let explicit_null = Row::new().with("id", json!(null)).with("side", "home");
        assert_eq!(c.key_of(&key), explicit_null.key_of(&key));
    }
}
