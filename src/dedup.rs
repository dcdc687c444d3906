use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::row::{Row, RowKey};

/// Reduces `rows` to one row per composite key. The row appended last wins;
/// the surviving row takes the slot where its key was first seen.
pub fn dedupe_last_wins(rows: Vec<Row>, key: &[&str]) -> Vec<Row> {
    let mut slots: HashMap<RowKey, usize> = HashMap::with_capacity(rows.len());
    let mut out: Vec<Row> = Vec::with_capacity(rows.len());
    for row in rows {
        match slots.entry(row.key_of(key)) {
            Entry::Occupied(slot) => out[*slot.get()] = row,
            Entry::Vacant(slot) => {
                slot.insert(out.len());
                out.push(row);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(frame_num: i64, period: i64) -> Row {
        Row::new()
            .with("game_id", 3812)
            .with("frame_num", frame_num)
            .with("period", period)
    }

    #[test]
    fn later_row_replaces_earlier_with_same_key() {
        let rows = vec![frame(1, 1), frame(2, 1), frame(1, 2)];
        let out = dedupe_last_wins(rows, &["game_id", "frame_num"]);
        assert_eq!(out, vec![frame(1, 2), frame(2, 1)]);
    }

    #[test]
    fn distinct_keys_pass_through_in_order() {
        let rows = vec![frame(3, 1), frame(1, 1), frame(2, 1)];
        let out = dedupe_last_wins(rows.clone(), &["game_id", "frame_num"]);
        assert_eq!(out, rows);
    }

    #[test]
    fn empty_input_is_empty() {
        assert!(dedupe_last_wins(Vec::new(), &["id"]).is_empty());
    }
}
