use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;

/// Column order of the summary file, one row per summary message received.
pub const SUMMARY_COLUMNS: &[&str] = &[
    "Time", "TS", "NS", "Pi", "Po", "B1", "B2", "E1", "E2", "P1i", "P2i", "P3i", "P1o", "P2o",
    "P3o", "I1", "I2", "I3", "U1", "U2", "U3",
];

/// Column order of the per-second aggregate file: the summary columns minus
/// the sequence counters, plus the trailing count of merged measurements.
pub const AGGREGATE_COLUMNS: &[&str] = &[
    "Time", "Pi", "Po", "B1", "B2", "E1", "E2", "P1i", "P2i", "P3i", "P1o", "P2o", "P3o", "I1",
    "I2", "I3", "U1", "U2", "U3", "count",
];

/// Append-only CSV writer with a fixed column list. The header is written on
/// the first append into an empty file only; reopening a non-empty file after
/// a restart keeps appending rows without a second header.
pub struct RecordWriter {
    path: PathBuf,
    columns: &'static [&'static str],
    writer: csv::Writer<fs::File>,
    needs_header: bool,
}

impl RecordWriter {
    pub fn open(path: impl Into<PathBuf>, columns: &'static [&'static str]) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let needs_header = file
            .metadata()
            .with_context(|| format!("failed to stat {}", path.display()))?
            .len()
            == 0;

        Ok(Self {
            path,
            columns,
            writer: csv::Writer::from_writer(file),
            needs_header,
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Writes one row in column order; columns missing from `record` render
    /// as empty cells, fields not in the column list are ignored. A failure
    /// leaves the header owed if it was never written, so the next append
    /// retries it.
    pub fn append(&mut self, record: &Map<String, Value>) -> Result<()> {
        if self.needs_header {
            self.writer
                .write_record(self.columns)
                .with_context(|| format!("failed to write header to {}", self.path.display()))?;
            self.needs_header = false;
        }
        let row: Vec<String> = self
            .columns
            .iter()
            .map(|column| record.get(*column).map(render_cell).unwrap_or_default())
            .collect();
        self.writer
            .write_record(&row)
            .with_context(|| format!("failed to write row to {}", self.path.display()))?;
        self.writer
            .flush()
            .with_context(|| format!("failed to flush {}", self.path.display()))?;
        Ok(())
    }
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    fn read_lines(path: &std::path::Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| line.to_string())
            .collect()
    }

    #[test]
    fn writes_header_exactly_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("aggregate.csv");
        let mut writer = RecordWriter::open(&path, AGGREGATE_COLUMNS).unwrap();

        writer
            .append(&record(&[
                ("Time", Value::from("2024-06-01 10:00:00")),
                ("Pi", Value::from(1.0)),
            ]))
            .unwrap();
        writer
            .append(&record(&[
                ("Time", Value::from("2024-06-01 10:00:01")),
                ("Pi", Value::from(2.0)),
            ]))
            .unwrap();

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], AGGREGATE_COLUMNS.join(","));
        assert!(lines[1].starts_with("2024-06-01 10:00:00,1.0,"));
    }

    #[test]
    fn reopen_against_nonempty_file_skips_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("summary.csv");

        {
            let mut writer = RecordWriter::open(&path, SUMMARY_COLUMNS).unwrap();
            writer
                .append(&record(&[("Time", Value::from("2024-06-01T10:00:00"))]))
                .unwrap();
        }
        {
            let mut writer = RecordWriter::open(&path, SUMMARY_COLUMNS).unwrap();
            writer
                .append(&record(&[("Time", Value::from("2024-06-01T10:05:00"))]))
                .unwrap();
        }

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], SUMMARY_COLUMNS.join(","));
        assert!(!lines[2].contains("Time"));
    }

    #[test]
    fn missing_columns_render_empty_and_extras_are_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("aggregate.csv");
        let mut writer = RecordWriter::open(&path, AGGREGATE_COLUMNS).unwrap();

        writer
            .append(&record(&[
                ("Time", Value::from("2024-06-01 10:00:00")),
                ("count", Value::from(2u64)),
                ("NotAColumn", Value::from(99)),
            ]))
            .unwrap();

        let lines = read_lines(&path);
        let cells: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(cells.len(), AGGREGATE_COLUMNS.len());
        assert_eq!(cells[0], "2024-06-01 10:00:00");
        // Every field column between Time and count is empty.
        assert!(cells[1..cells.len() - 1].iter().all(|cell| cell.is_empty()));
        assert_eq!(*cells.last().unwrap(), "2");
        assert!(!lines[1].contains("99"));
    }

    #[test]
    fn creates_missing_output_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/out/aggregate.csv");
        let mut writer = RecordWriter::open(&path, AGGREGATE_COLUMNS).unwrap();
        writer
            .append(&record(&[("Time", Value::from("2024-06-01 10:00:00"))]))
            .unwrap();
        assert!(path.exists());
    }
}
