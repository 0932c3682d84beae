//! Plain attribute tables (no geometry) as CSV

use crate::error::Result;
use std::io::Write;
use std::path::Path;

/// Write a header and rows of pre-formatted cells to a CSV file
pub fn write_table<P: AsRef<Path>>(path: P, header: &[String], rows: &[Vec<String>]) -> Result<()> {
    let file = std::fs::File::create(path.as_ref())?;
    write_table_to(file, header, rows)?;
    tracing::debug!("Wrote {} rows to {}", rows.len(), path.as_ref().display());
    Ok(())
}

/// Write a header and rows of pre-formatted cells as CSV into any writer
pub fn write_table_to<W: Write>(writer: W, header: &[String], rows: &[Vec<String>]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(header)?;
    for row in rows {
        csv.write_record(row)?;
    }
    csv.flush()?;
    Ok(())
}
