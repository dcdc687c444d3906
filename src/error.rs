use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LoadError>;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error in {path} line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error(
        "transient write failure on {table} ({rows} rows) after {attempts} attempts: {message}"
    )]
    TransientWrite {
        table: String,
        rows: usize,
        attempts: u32,
        message: String,
    },

    #[error("permanent write failure on {table} ({rows} rows) at attempt {attempt}: {message}")]
    PermanentWrite {
        table: String,
        rows: usize,
        attempt: u32,
        message: String,
    },

    #[error("store error: {0}")]
    Store(String),
}

impl LoadError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LoadError::Io {
            path: path.into(),
            source,
        }
    }

    /// Errors that only invalidate the current source unit.
    pub fn is_unit_scoped(&self) -> bool {
        matches!(self, LoadError::Parse { .. } | LoadError::Io { .. })
    }
}
