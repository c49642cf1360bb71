//! Append-only JSON Lines record log.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_jsonlines::JsonLinesWriter;
use tracing::debug;

use dap_common::Result;

use crate::models::OutputRecord;

/// Local mirror of every record accepted for writing, one JSON object per
/// line. The file is truncated when the log is opened, so each run starts
/// from an empty log.
pub struct RecordLog {
    path: PathBuf,
    writer: Mutex<JsonLinesWriter<BufWriter<File>>>,
}

impl RecordLog {
    /// Opens (and truncates) the log file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        debug!(path = %path.display(), "Opened record log");
        Ok(Self {
            writer: Mutex::new(JsonLinesWriter::new(BufWriter::new(file))),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends each record as one line and flushes.
    ///
    /// Workers contend on a short-lived lock, so lines from different
    /// batches may interleave but each line stays whole.
    pub fn append(&self, records: &[OutputRecord]) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for record in records {
            writer.write(record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn record(value: Value) -> OutputRecord {
        match value {
            Value::Object(map) => OutputRecord { fields: map },
            other => panic!("expected an object, got {other}"),
        }
    }

    fn read_lines(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_append_writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let log = RecordLog::create(dir.path().join("results.jsonl")).unwrap();

        log.append(&[record(json!({"编号": 1})), record(json!({"编号": 2}))])
            .unwrap();
        log.append(&[record(json!({"编号": 3}))]).unwrap();

        let lines = read_lines(log.path());
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], json!({"编号": 1}));
        assert_eq!(lines[2], json!({"编号": 3}));
    }

    #[test]
    fn test_create_truncates_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");

        let log = RecordLog::create(&path).unwrap();
        log.append(&[record(json!({"编号": 1}))]).unwrap();
        drop(log);

        let log = RecordLog::create(&path).unwrap();
        log.append(&[record(json!({"编号": 9}))]).unwrap();

        let lines = read_lines(&path);
        assert_eq!(lines, vec![json!({"编号": 9})]);
    }

    #[test]
    fn test_empty_append_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let log = RecordLog::create(dir.path().join("results.jsonl")).unwrap();
        log.append(&[]).unwrap();
        assert_eq!(std::fs::read_to_string(log.path()).unwrap(), "");
    }
}
