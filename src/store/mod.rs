//! Destination stores and the replaceable connection around them.

use std::fmt;

use crate::error::{LoadError, Result};
use crate::row::{Row, TableSpec};

pub mod rest;
pub mod sqlite;

pub use rest::RestStore;
pub use sqlite::SqliteStore;

/// A store failure as text. Retry classification works on this text only, so
/// stores should keep transport details (status codes, timeout kinds) in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::new(err.to_string())
    }
}

/// What the store said about a write. The row count is informational only:
/// some stores report nothing even when the write landed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertResponse {
    pub reported_rows: Option<usize>,
}

pub trait Store {
    /// Insert-or-update `rows` keyed by `table.key`.
    fn upsert(
        &mut self,
        table: &TableSpec,
        rows: &[Row],
    ) -> std::result::Result<UpsertResponse, StoreError>;

    /// Number of stored rows in `table` whose `column` equals `value`.
    fn count(
        &mut self,
        table: &str,
        column: &str,
        value: i64,
    ) -> std::result::Result<u64, StoreError>;
}

pub type StoreFactory = Box<dyn Fn() -> std::result::Result<Box<dyn Store>, StoreError>>;

/// Owns the live store connection and knows how to build a fresh one.
pub struct ConnectionHolder {
    store: Box<dyn Store>,
    factory: StoreFactory,
    replacements: u32,
}

impl ConnectionHolder {
    pub fn connect(factory: StoreFactory) -> Result<Self> {
        let store = factory().map_err(|err| LoadError::Store(format!("connect: {err}")))?;
        Ok(Self {
            store,
            factory,
            replacements: 0,
        })
    }

    pub fn store(&mut self) -> &mut dyn Store {
        self.store.as_mut()
    }

    /// Drops the current connection and builds a new one from scratch.
    pub fn replace(&mut self) -> Result<()> {
        let fresh = (self.factory)().map_err(|err| LoadError::Store(format!("reconnect: {err}")))?;
        self.store = fresh;
        self.replacements += 1;
        Ok(())
    }

    pub fn replacements(&self) -> u32 {
        self.replacements
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    struct NullStore;

    impl Store for NullStore {
        fn upsert(
            &mut self,
            _table: &TableSpec,
            _rows: &[Row],
        ) -> std::result::Result<UpsertResponse, StoreError> {
            Ok(UpsertResponse::default())
        }

        fn count(
            &mut self,
            _table: &str,
            _column: &str,
            _value: i64,
        ) -> std::result::Result<u64, StoreError> {
            Ok(0)
        }
    }

    #[test]
    fn replace_builds_a_new_store() {
        let built = Rc::new(Cell::new(0));
        let counter = built.clone();
        let factory: StoreFactory = Box::new(move || {
            counter.set(counter.get() + 1);
            Ok(Box::new(NullStore) as Box<dyn Store>)
        });
        let mut holder = ConnectionHolder::connect(factory).unwrap();
        holder.replace().unwrap();
        holder.replace().unwrap();
        assert_eq!(built.get(), 3);
        assert_eq!(holder.replacements(), 2);
    }

    #[test]
    fn quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
