use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use serde_json::Value;
use tracing::warn;

use crate::error::{LoadError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    JsonLines,
    JsonArray,
}

impl SourceKind {
    pub fn from_path(path: &Path) -> Self {
        let name = file_name(path).to_ascii_lowercase();
        if name.contains(".jsonl") || name.contains(".ndjson") {
            SourceKind::JsonLines
        } else {
            SourceKind::JsonArray
        }
    }
}

/// One input file scoped to one match/game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub path: PathBuf,
    pub partition_id: i64,
    pub kind: SourceKind,
}

impl SourceUnit {
    pub fn from_path(path: PathBuf) -> Option<Self> {
        let partition_id = partition_id_from_path(&path)?;
        let kind = SourceKind::from_path(&path);
        Some(Self {
            path,
            partition_id,
            kind,
        })
    }

    pub fn name(&self) -> &str {
        file_name(&self.path)
    }

    pub fn records(&self) -> Result<Records> {
        match self.kind {
            SourceKind::JsonLines => Ok(Records::Lines(JsonLines::open(&self.path)?)),
            SourceKind::JsonArray => Ok(Records::Array(read_json_array(&self.path)?.into_iter())),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UnitFilter {
    pub only_partition: Option<i64>,
    pub max_units: Option<usize>,
}

/// Expands `pattern`, sorts the matches, and keeps the files a partition id can
/// be inferred for.
pub fn discover_units(pattern: &str, filter: &UnitFilter) -> Result<Vec<SourceUnit>> {
    let paths = glob::glob(pattern)
        .map_err(|err| LoadError::Config(format!("invalid input pattern {pattern:?}: {err}")))?;

    let mut files = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "unreadable path while expanding input pattern"),
        }
    }
    files.sort();

    let mut units = Vec::with_capacity(files.len());
    for path in files {
        let Some(unit) = SourceUnit::from_path(path.clone()) else {
            warn!(path = %path.display(), "skipping file: cannot infer partition id from name");
            continue;
        };
        if let Some(only) = filter.only_partition
            && unit.partition_id != only
        {
            continue;
        }
        units.push(unit);
    }
    if let Some(max) = filter.max_units {
        units.truncate(max);
    }
    Ok(units)
}

/// `3812.jsonl.bz2` -> 3812, falling back to the first run of 3+ digits
/// (`roster_3812.json` -> 3812).
pub fn partition_id_from_path(path: &Path) -> Option<i64> {
    let name = file_name(path);
    if let Some(stem) = name.split('.').next()
        && let Ok(id) = stem.trim().parse::<i64>()
    {
        return Some(id);
    }
    name.split(|ch: char| !ch.is_ascii_digit())
        .find(|run| run.len() >= 3)
        .and_then(|run| run.parse::<i64>().ok())
}

pub enum Records {
    Lines(JsonLines),
    Array(std::vec::IntoIter<Value>),
}

impl Iterator for Records {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Records::Lines(lines) => lines.next(),
            Records::Array(items) => items.next().map(Ok),
        }
    }
}

/// Lazily decodes one JSON object per line. The file handle lives inside the
/// reader and is released when the iterator is dropped.
pub struct JsonLines {
    path: PathBuf,
    reader: Box<dyn BufRead>,
    line: usize,
    buf: String,
    failed: bool,
}

impl JsonLines {
    pub fn open(path: &Path) -> Result<Self> {
        let reader = open_decompressed(path)?;
        Ok(Self::from_reader(path, reader))
    }

    pub fn from_reader(path: &Path, reader: Box<dyn BufRead>) -> Self {
        Self {
            path: path.to_path_buf(),
            reader,
            line: 0,
            buf: String::new(),
            failed: false,
        }
    }
}

impl Iterator for JsonLines {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(err) => {
                    self.failed = true;
                    return Some(Err(LoadError::io(&self.path, err)));
                }
            }
            self.line += 1;
            let trimmed = self.buf.trim();
            if trimmed.is_empty() {
                continue;
            }
            return match serde_json::from_str::<Value>(trimmed) {
                Ok(value) => Some(Ok(value)),
                Err(err) => {
                    self.failed = true;
                    Some(Err(LoadError::Parse {
                        path: self.path.clone(),
                        line: self.line,
                        message: err.to_string(),
                    }))
                }
            };
        }
    }
}

/// Reads an array source whole. A bare object is treated as a one-item array.
pub fn read_json_array(path: &Path) -> Result<Vec<Value>> {
    let mut raw = String::new();
    open_decompressed(path)?
        .read_to_string(&mut raw)
        .map_err(|err| LoadError::io(path, err))?;
    let value = serde_json::from_str::<Value>(raw.trim()).map_err(|err| LoadError::Parse {
        path: path.to_path_buf(),
        line: err.line(),
        message: err.to_string(),
    })?;
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(_) => Ok(vec![value]),
        Value::Null => Ok(Vec::new()),
        other => Err(LoadError::Parse {
            path: path.to_path_buf(),
            line: 1,
            message: format!("expected array or object, got {}", json_type(&other)),
        }),
    }
}

fn open_decompressed(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|err| LoadError::io(path, err))?;
    let name = file_name(path).to_ascii_lowercase();
    let reader: Box<dyn BufRead> = if name.ends_with(".bz2") {
        Box::new(BufReader::new(MultiBzDecoder::new(file)))
    } else if name.ends_with(".gz") {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(reader)
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|s| s.to_str()).unwrap_or_default()
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_from_numeric_stem() {
        assert_eq!(partition_id_from_path(Path::new("data/3812.jsonl.bz2")), Some(3812));
        assert_eq!(partition_id_from_path(Path::new("10517.json")), Some(10517));
    }

    #[test]
    fn partition_from_embedded_digits() {
        assert_eq!(partition_id_from_path(Path::new("roster_3812.json")), Some(3812));
        assert_eq!(partition_id_from_path(Path::new("v2_roster_3812.json")), Some(3812));
        assert_eq!(partition_id_from_path(Path::new("roster.json")), None);
        assert_eq!(partition_id_from_path(Path::new("game_12.json")), None);
    }

    #[test]
    fn kind_follows_name() {
        assert_eq!(SourceKind::from_path(Path::new("1.jsonl.bz2")), SourceKind::JsonLines);
        assert_eq!(SourceKind::from_path(Path::new("1.ndjson")), SourceKind::JsonLines);
        assert_eq!(SourceKind::from_path(Path::new("1.json")), SourceKind::JsonArray);
    }
}
