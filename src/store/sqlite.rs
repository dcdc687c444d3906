use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params, params_from_iter};
use serde_json::Value;

use super::{Store, StoreError, UpsertResponse, quote_ident};
use crate::row::{Row, TableSpec};

const BUSY_TIMEOUT_SECS: u64 = 5;

/// Local SQLite destination. Tables are created on first write with the
/// composite key as primary key; payload columns are added as they appear.
pub struct SqliteStore {
    conn: Connection,
    columns: HashMap<String, HashSet<String>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|err| {
                StoreError::new(format!("create sqlite dir {}: {err}", parent.display()))
            })?;
        }
        let conn = Connection::open(path).map_err(|err| {
            StoreError::new(format!("open sqlite db {}: {err}", path.display()))
        })?;
        conn.busy_timeout(Duration::from_secs(BUSY_TIMEOUT_SECS))?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Ok(Self {
            conn,
            columns: HashMap::new(),
        })
    }

    fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let found = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(found > 0)
    }

    fn ensure_table(
        &mut self,
        table: &TableSpec,
        wanted: &BTreeSet<&str>,
    ) -> Result<(), StoreError> {
        if !self.columns.contains_key(table.name) {
            let keys = table.key.iter().map(|k| quote_ident(k)).collect::<Vec<_>>();
            self.conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} ({}, PRIMARY KEY ({}));",
                quote_ident(table.name),
                keys.join(", "),
                keys.join(", ")
            ))?;
            let existing = self.existing_columns(table.name)?;
            self.columns.insert(table.name.to_string(), existing);
        }

        let known = self.columns.entry(table.name.to_string()).or_default();
        for column in wanted {
            if known.contains(*column) {
                continue;
            }
            self.conn.execute_batch(&format!(
                "ALTER TABLE {} ADD COLUMN {};",
                quote_ident(table.name),
                quote_ident(column)
            ))?;
            known.insert(column.to_string());
        }
        Ok(())
    }

    fn existing_columns(&self, table: &str) -> Result<HashSet<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
        let mut out = HashSet::new();
        for name in names {
            out.insert(name?);
        }
        Ok(out)
    }
}

impl Store for SqliteStore {
    fn upsert(&mut self, table: &TableSpec, rows: &[Row]) -> Result<UpsertResponse, StoreError> {
        if rows.is_empty() {
            return Ok(UpsertResponse::default());
        }

        let mut payload: BTreeSet<&str> = BTreeSet::new();
        for row in rows {
            payload.extend(row.columns().filter(|c| !table.key.iter().any(|k| k == c)));
        }
        let mut wanted: BTreeSet<&str> = payload.clone();
        wanted.extend(table.key.iter().copied());
        self.ensure_table(table, &wanted)?;

        let columns = table
            .key
            .iter()
            .copied()
            .chain(payload.iter().copied())
            .collect::<Vec<_>>();
        let sql = upsert_sql(table, &columns, &payload);

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                let values = columns
                    .iter()
                    .map(|c| row.get(c).map(to_sql_value).unwrap_or(SqlValue::Null));
                stmt.execute(params_from_iter(values))?;
            }
        }
        tx.commit()?;
        Ok(UpsertResponse {
            reported_rows: Some(rows.len()),
        })
    }

    fn count(&mut self, table: &str, column: &str, value: i64) -> Result<u64, StoreError> {
        if !self.table_exists(table)? {
            return Ok(0);
        }
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1",
            quote_ident(table),
            quote_ident(column)
        );
        let n = self.conn.query_row(&sql, params![value], |row| row.get::<_, i64>(0))?;
        Ok(u64::try_from(n).unwrap_or_default())
    }
}

fn upsert_sql(table: &TableSpec, columns: &[&str], payload: &BTreeSet<&str>) -> String {
    let names = columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>();
    let slots = (1..=columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>();
    let keys = table.key.iter().map(|k| quote_ident(k)).collect::<Vec<_>>();
    let action = if payload.is_empty() {
        "DO NOTHING".to_string()
    } else {
        let sets = payload
            .iter()
            .map(|c| format!("{0} = excluded.{0}", quote_ident(c)))
            .collect::<Vec<_>>();
        format!("DO UPDATE SET {}", sets.join(", "))
    };
    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) {}",
        quote_ident(table.name),
        names.join(", "),
        slots.join(", "),
        keys.join(", "),
        action
    )
}

fn to_sql_value(v: &Value) -> SqlValue {
    match v {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn upsert_sql_updates_payload_only() {
        let spec = TableSpec::new("frames", &["game_id", "frame_num"]);
        let payload = BTreeSet::from(["period"]);
        let sql = upsert_sql(&spec, &["game_id", "frame_num", "period"], &payload);
        assert!(sql.contains(
            "ON CONFLICT(\"game_id\", \"frame_num\") DO UPDATE SET \"period\" = excluded.\"period\""
        ));
        let key_only = upsert_sql(&spec, &["game_id", "frame_num"], &BTreeSet::new());
        assert!(key_only.ends_with("DO NOTHING"));
    }

    #[test]
    fn json_values_map_to_sqlite_types() {
        assert_eq!(to_sql_value(&json!(true)), SqlValue::Integer(1));
        assert_eq!(to_sql_value(&json!(2.5)), SqlValue::Real(2.5));
        assert_eq!(to_sql_value(&json!({"a": 1})), SqlValue::Text("{\"a\":1}".into()));
    }
}
