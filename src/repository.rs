//! Collaborator seams around the pipeline core.
//!
//! The core never touches files or databases itself. Output tables go to a
//! [`TableSink`]; rows recorded by earlier runs come from a [`TableHistory`].

use crate::error::Result;
use crate::models::{DimensionRow, LogRow, Table};
use crate::schema::{DimensionDefinition, LogTableDefinition};

/// Destination for the tables produced by one run
#[cfg_attr(test, mockall::automock)]
pub trait TableSink {
    /// Append every table of a run.
    ///
    /// Sinks that support it write all tables or none.
    fn write_tables(&mut self, tables: &[Table]) -> Result<()>;
}

/// Rows persisted by earlier runs
#[cfg_attr(test, mockall::automock)]
pub trait TableHistory {
    /// Every recorded mapping of a dimension table
    fn dimension_rows(&self, definition: &DimensionDefinition) -> Result<Vec<DimensionRow>>;

    /// Every recorded row of a log table
    fn log_rows(&self, definition: &LogTableDefinition) -> Result<Vec<LogRow>>;
}

/// History of a store that has never been written to
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

impl TableHistory for NoHistory {
    fn dimension_rows(&self, _definition: &DimensionDefinition) -> Result<Vec<DimensionRow>> {
        Ok(Vec::new())
    }

    fn log_rows(&self, _definition: &LogTableDefinition) -> Result<Vec<LogRow>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_history_is_empty() {
        let dimension = DimensionDefinition::new("artists", "artist_name", "name");
        let log = LogTableDefinition::new("plays", &["playlist_id"], &["plays"]);
        assert!(NoHistory.dimension_rows(&dimension).expect("read").is_empty());
        assert!(NoHistory.log_rows(&log).expect("read").is_empty());
    }

    #[test]
    fn test_mocked_sink_receives_tables() {
        let mut sink = MockTableSink::new();
        sink.expect_write_tables()
            .withf(|tables| tables.len() == 1 && tables[0].name == "artists")
            .times(1)
            .returning(|_| Ok(()));
        let table = Table::new("artists", vec!["id".to_string(), "name".to_string()]);
        assert!(sink.write_tables(&[table]).is_ok());
    }
}
