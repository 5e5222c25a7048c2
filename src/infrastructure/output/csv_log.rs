use anyhow::Result;
use csv::Writer;
use std::fs::File;
use std::path::Path;

use crate::domain::entities::record::LogRecord;

/// Writes an aggregated task log to a CSV file
pub struct CsvLogWriter;

impl CsvLogWriter {
    /// Creates a new CsvLogWriter
    ///
    /// # Returns
    ///
    /// A new CsvLogWriter
    pub fn new() -> Self {
        Self
    }

    /// Writes the records as CSV, one row per record after a header
    ///
    /// # Arguments
    ///
    /// * `records` - The log records to write
    /// * `path` - Destination file path
    ///
    /// # Returns
    ///
    /// `Ok` when the file was written and flushed
    pub fn write<P: AsRef<Path>>(&self, records: &[LogRecord], path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut wtr = Writer::from_writer(file);

        wtr.write_record(["task_name", "action", "asctime", "exc_text"])?;
        for record in records {
            wtr.write_record([
                record.task_name.clone(),
                record.action.to_string(),
                record.asctime.to_rfc3339(),
                record.exc_text.clone().unwrap_or_default(),
            ])?;
        }

        wtr.flush()?;
        Ok(())
    }
}

impl Default for CsvLogWriter {
    fn default() -> Self {
        Self::new()
    }
}
