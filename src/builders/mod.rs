//! Record-to-row transforms, one per destination table.
//!
//! Builders never fail: a missing optional field becomes null, and a record
//! missing the field that identifies it produces no rows at all.

use serde_json::Value;

use crate::row::Row;

mod entities;
mod events;
mod tracking;

pub use entities::{MatchMetadataBuilder, RosterBuilder, RosterPlayerBuilder};
pub use events::{
    GameEventBuilder, PassBuilder, PossessionEventBuilder, ShotBuilder, TimelineBuilder,
};
pub use tracking::{BallPositionBuilder, FrameBuilder, PlayerPositionBuilder, Side};

pub trait RowBuilder {
    /// Destination table every row from this builder goes to.
    fn table(&self) -> &'static str;

    fn build(&self, record: &Value, partition_id: i64) -> Vec<Row>;
}

/// Objects in `value`, accepting either an array of objects or a single object.
/// Anything else yields nothing.
fn objects(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().filter(|v| v.is_object()).collect(),
        Some(obj @ Value::Object(_)) => vec![obj],
        _ => Vec::new(),
    }
}

/// Indexed variant of [`objects`]: non-object entries keep their slot so
/// indices match the source array.
fn indexed_objects(value: Option<&Value>) -> Vec<(usize, &Value)> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_object())
            .collect(),
        Some(obj @ Value::Object(_)) => vec![(0, obj)],
        _ => Vec::new(),
    }
}

/// Nested object at `key`, or null so every lookup under it misses.
fn section<'a>(record: &'a Value, key: &str) -> &'a Value {
    static EMPTY: Value = Value::Null;
    match record.get(key) {
        Some(v @ Value::Object(_)) => v,
        _ => &EMPTY,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn objects_normalizes_shapes() {
        assert_eq!(objects(Some(&json!({"x": 1}))).len(), 1);
        assert_eq!(objects(Some(&json!([{"x": 1}, "junk", {"x": 2}]))).len(), 2);
        assert!(objects(Some(&json!("junk"))).is_empty());
        assert!(objects(None).is_empty());
    }

    #[test]
    fn indexed_objects_keep_source_positions() {
        let value = json!(["junk", {"x": 1}]);
        let idx = indexed_objects(Some(&value))
            .into_iter()
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        assert_eq!(idx, vec![1]);
    }
}
