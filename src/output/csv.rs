//! CSV output writer
//!
//! Every record kind is flattened to the same six columns so a mixed record
//! set still forms one table.

use crate::dedup::IdentityExtractor;
use crate::ActivityRecord;
use csv::Writer;
use serde::Serialize;
use std::io::Write;

use super::{OutputError, OutputResult, RecordWriter};

/// One CSV row
#[derive(Debug, Serialize)]
struct ActivityRow<'a> {
    kind: &'static str,
    identity: String,
    occurred_at: String,
    repository: &'a str,
    summary: &'a str,
    url: &'a str,
}

impl<'a> From<&'a ActivityRecord> for ActivityRow<'a> {
    fn from(record: &'a ActivityRecord) -> Self {
        Self {
            kind: record.kind().as_str(),
            identity: record
                .identity()
                .map(|key| key.value)
                .unwrap_or_default(),
            occurred_at: record
                .occurred_at()
                .map(|at| at.to_rfc3339())
                .unwrap_or_default(),
            repository: record.repository().unwrap_or(""),
            summary: record.summary(),
            url: record.url().unwrap_or(""),
        }
    }
}

/// CSV writer for activity records
pub struct CsvRecordWriter<W: Write> {
    writer: Writer<W>,
    records_written: u64,
}

impl<W: Write> CsvRecordWriter<W> {
    /// Wrap `writer`; the header row is written with the first record
    pub fn new(writer: W) -> Self {
        Self {
            writer: Writer::from_writer(writer),
            records_written: 0,
        }
    }

    /// Records written so far
    pub fn records_written(&self) -> u64 {
        self.records_written
    }
}

impl<W: Write> RecordWriter for CsvRecordWriter<W> {
    fn write_record(&mut self, record: &ActivityRecord) -> OutputResult<()> {
        self.writer
            .serialize(ActivityRow::from(record))
            .map_err(|e| OutputError::CsvError(format!("Failed to write record: {e}")))?;
        self.records_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> OutputResult<()> {
        self.writer
            .flush()
            .map_err(|e| OutputError::IoError(format!("Failed to flush CSV: {e}")))
    }
}
