//! Record output writers
//!
//! Records are written either as JSON lines (one tagged record per line,
//! lossless) or as a flat CSV table. Files are rendered in memory and then
//! written atomically.

use crate::ActivityRecord;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub mod csv;

pub use self::csv::CsvRecordWriter;

/// Output writer errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV write error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Output file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// One JSON document per line
    #[default]
    Json,
    /// Comma-separated table with a header row
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Csv => f.write_str("csv"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" | "jsonl" | "ndjson" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Invalid output format: {s}. Valid options: json, csv")),
        }
    }
}

/// Sink for activity records
pub trait RecordWriter {
    /// Write a single record
    fn write_record(&mut self, record: &ActivityRecord) -> OutputResult<()>;

    /// Write multiple records at once
    fn write_records(&mut self, records: &[ActivityRecord]) -> OutputResult<()> {
        for record in records {
            self.write_record(record)?;
        }
        Ok(())
    }

    /// Flush buffered output
    fn finish(&mut self) -> OutputResult<()>;
}

/// JSON lines writer
pub struct JsonLinesWriter<W: Write> {
    writer: W,
    records_written: u64,
}

impl<W: Write> JsonLinesWriter<W> {
    /// Wrap `writer`
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            records_written: 0,
        }
    }

    /// Records written so far
    pub fn records_written(&self) -> u64 {
        self.records_written
    }
}

impl<W: Write> RecordWriter for JsonLinesWriter<W> {
    fn write_record(&mut self, record: &ActivityRecord) -> OutputResult<()> {
        serde_json::to_writer(&mut self.writer, record)
            .map_err(|e| OutputError::SerializationError(e.to_string()))?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| OutputError::IoError(e.to_string()))?;
        self.records_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> OutputResult<()> {
        self.writer
            .flush()
            .map_err(|e| OutputError::IoError(format!("Failed to flush output: {e}")))
    }
}

/// Write `records` to `writer` in `format`
pub fn write_records<W: Write>(
    records: &[ActivityRecord],
    format: OutputFormat,
    writer: W,
) -> OutputResult<()> {
    match format {
        OutputFormat::Json => {
            let mut out = JsonLinesWriter::new(writer);
            out.write_records(records)?;
            out.finish()
        }
        OutputFormat::Csv => {
            let mut out = CsvRecordWriter::new(writer);
            out.write_records(records)?;
            out.finish()
        }
    }
}

/// Write `records` to the file at `path`, atomically replacing it
pub fn write_records_to_path(
    records: &[ActivityRecord],
    format: OutputFormat,
    path: &Path,
) -> OutputResult<()> {
    let mut buffer = Vec::new();
    write_records(records, format, &mut buffer)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| OutputError::IoError(format!("Failed to create directory: {e}")))?;
    }
    write_atomic(path, &buffer)
        .map_err(|e| OutputError::IoError(format!("Failed to write {}: {e}", path.display())))?;

    info!(
        path = %path.display(),
        records = records.len(),
        format = %format,
        "Wrote output file"
    );
    Ok(())
}

/// Atomically replace `path` with `bytes`
///
/// Writes a temporary file in the same directory, flushes and syncs it, then
/// renames it into place and syncs the directory.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)?;
    temp_file.write_all(bytes)?;
    temp_file.flush()?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(path).map_err(|e| e.error)?;

    if let Ok(dir) = std::fs::File::open(parent_dir) {
        let _ = dir.sync_all();
    }
    Ok(())
}
