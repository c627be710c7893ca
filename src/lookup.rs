//! Track to ISRC lookup loader.
//!
//! Reads a track export CSV and keeps the `track`, `artist` and `isrc`
//! columns as an `isrc_lookup` table for the relational store.

use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::models::{Table, Value};
use crate::schema::isrc_lookup;
use crate::validation::InputValidator;

/// Load the lookup table from a CSV file
pub fn load_isrc_csv(path: &Path) -> Result<Table> {
    InputValidator::validate_source_path(path)?;
    let file = std::fs::File::open(path)?;
    let table = read_isrc(file)?;
    info!(path = %path.display(), rows = table.len(), "Loaded ISRC lookup rows");
    Ok(table)
}

/// Read the lookup columns from any CSV reader.
///
/// Other columns are ignored; empty fields become nulls.
pub fn read_isrc<R: Read>(reader: R) -> Result<Table> {
    let mut reader = ReaderBuilder::new().from_reader(reader);
    let headers = reader.headers()?.clone();
    let wanted = [isrc_lookup::TRACK, isrc_lookup::ARTIST, isrc_lookup::ISRC];
    let indices = wanted
        .iter()
        .map(|column| {
            headers
                .iter()
                .position(|header| header.trim() == *column)
                .ok_or_else(|| PipelineError::MalformedInput(format!("ISRC file has no {column} column")))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut table = Table::new(isrc_lookup::TABLE, wanted.iter().map(ToString::to_string).collect());
    for record in reader.records() {
        let record = record?;
        let row = indices
            .iter()
            .map(|&index| match record.get(index) {
                Some(field) if !field.is_empty() => Value::from(field),
                _ => Value::Null,
            })
            .collect();
        table.rows.push(row);
    }
    Ok(table)
}
