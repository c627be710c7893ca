//! CSV export of output tables.
//!
//! Every table is written to `<output_dir>/<table>.csv` with a header row.
//! Nulls become empty fields and timestamps use the crate-wide
//! [`TIMESTAMP_FORMAT`](crate::models::TIMESTAMP_FORMAT).

use std::fs::{create_dir_all, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use csv::Writer;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::Table;
use crate::repository::TableSink;
use crate::validation::InputValidator;

/// Writes each table to its own CSV file
#[derive(Debug, Clone)]
pub struct CsvTableWriter {
    output_dir: PathBuf,
    written: Vec<PathBuf>,
}

impl CsvTableWriter {
    /// Writer rooted at `output_dir`; the directory is created on first write
    pub fn new(output_dir: &Path) -> Result<Self> {
        InputValidator::validate_output_dir(output_dir)?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            written: Vec::new(),
        })
    }

    /// File a table is written to
    #[must_use]
    pub fn path_for(&self, table: &str) -> PathBuf {
        self.output_dir.join(format!("{table}.csv"))
    }

    /// Files written so far
    #[must_use]
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl TableSink for CsvTableWriter {
    fn write_tables(&mut self, tables: &[Table]) -> Result<()> {
        create_dir_all(&self.output_dir)?;
        for table in tables {
            let path = self.path_for(&table.name);
            write_table_csv(table, &path)?;
            debug!(table = %table.name, rows = table.len(), path = %path.display(), "Wrote table");
            self.written.push(path);
        }
        info!(tables = tables.len(), dir = %self.output_dir.display(), "Exported tables to CSV");
        Ok(())
    }
}

/// Write one table to a CSV file, header first.
///
/// # Errors
///
/// Returns an error if file creation or writing fails.
pub fn write_table_csv(table: &Table, file_path: &Path) -> Result<()> {
    let file = File::create(file_path)?;
    let mut writer = Writer::from_writer(BufWriter::new(file));

    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(ToString::to_string))?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;
    use tempfile::TempDir;

    #[test]
    fn test_write_table_csv() {
        let temp_dir = TempDir::new().expect("temp dir");
        let path = temp_dir.path().join("artists.csv");
        let mut table = Table::new("artists", vec!["id".to_string(), "name".to_string()]);
        table.rows.push(vec![Value::Integer(1), Value::from("Adele")]);
        table.rows.push(vec![Value::Integer(2), Value::Null]);

        write_table_csv(&table, &path).expect("write");
        let content = std::fs::read_to_string(&path).expect("read");
        assert_eq!(content, "id,name\n1,Adele\n2,\n");
    }

    #[test]
    fn test_writer_creates_directory() {
        let temp_dir = TempDir::new().expect("temp dir");
        let out = temp_dir.path().join("nested").join("out");
        let mut writer = CsvTableWriter::new(&out).expect("writer");
        let table = Table::new("playlists", vec!["id".to_string()]);
        writer.write_tables(&[table]).expect("write");
        assert!(out.join("playlists.csv").exists());
        assert_eq!(writer.written().len(), 1);
    }
}
