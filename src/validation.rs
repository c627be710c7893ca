//! Definition and input validation.
//!
//! Table and column names end up interpolated into SQL, so every identifier a
//! definition carries is checked before a run starts.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{PipelineError, Result};
use crate::ingestors::IngestorDefinition;
use crate::schema::{LogTableDefinition, INGEST_TIMESTAMP};

#[allow(clippy::expect_used)]
fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("identifier pattern compiles"))
}

/// Validation utilities for definitions and input locations
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate a table or column name that will be interpolated into SQL
    pub fn validate_identifier(name: &str) -> Result<()> {
        if identifier_pattern().is_match(name) {
            Ok(())
        } else {
            Err(PipelineError::InvalidDefinition(format!("invalid identifier: {name:?}")))
        }
    }

    /// Validate an ingestor definition before any row is read
    pub fn validate_ingestor(definition: &IngestorDefinition) -> Result<()> {
        Self::validate_identifier(&definition.timestamp_column)?;

        let mut tables = BTreeSet::new();
        for dimension in &definition.dimensions {
            Self::validate_identifier(&dimension.table)?;
            Self::validate_identifier(&dimension.source_column)?;
            Self::validate_identifier(&dimension.natural_key_column)?;
            if !tables.insert(dimension.table.as_str()) {
                return Err(PipelineError::InvalidDefinition(format!("duplicate table {}", dimension.table)));
            }
        }

        for join in &definition.enrichment.joins {
            if !definition.dimensions.iter().any(|d| d.table == join.registry) {
                return Err(PipelineError::MissingRegistry(join.registry.clone()));
            }
            Self::validate_identifier(&join.source_column)?;
        }

        let mut outputs = BTreeSet::new();
        for column in definition.enrichment.output_columns() {
            Self::validate_identifier(column)?;
            if !outputs.insert(column) {
                return Err(PipelineError::InvalidDefinition(format!("column {column} is produced twice")));
            }
        }

        for log in &definition.logs {
            if !tables.insert(log.table.as_str()) {
                return Err(PipelineError::InvalidDefinition(format!("duplicate table {}", log.table)));
            }
            Self::validate_log(log, &outputs)?;
        }

        Ok(())
    }

    /// Validate one log definition against the columns enriched rows carry
    pub fn validate_log(log: &LogTableDefinition, available: &BTreeSet<&str>) -> Result<()> {
        Self::validate_identifier(&log.table)?;
        if log.key_columns.is_empty() {
            return Err(PipelineError::InvalidDefinition(format!("{} has no key columns", log.table)));
        }
        if log.tracked_columns.is_empty() {
            return Err(PipelineError::InvalidDefinition(format!("{} tracks no columns", log.table)));
        }

        let mut seen = BTreeSet::new();
        for column in log.key_columns.iter().chain(&log.tracked_columns) {
            if column == INGEST_TIMESTAMP || !seen.insert(column.as_str()) {
                return Err(PipelineError::InvalidDefinition(format!(
                    "{} lists column {column} more than once",
                    log.table
                )));
            }
            if !available.contains(column.as_str()) {
                return Err(PipelineError::UnknownColumn {
                    table: log.table.clone(),
                    column: column.clone(),
                });
            }
        }

        for stored in log.storage_aliases.values() {
            Self::validate_identifier(stored)?;
        }
        Ok(())
    }

    /// Validate that the raw input location exists and is a file
    pub fn validate_source_path(path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() || !path.is_file() {
            return Err(PipelineError::SourceUnavailable(path.display().to_string()));
        }
        Ok(())
    }

    /// Validate that an output location is usable as a directory
    pub fn validate_output_dir(path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(PipelineError::InvalidConfig("output directory cannot be empty".to_string()));
        }
        if path.exists() && !path.is_dir() {
            return Err(PipelineError::InvalidConfig(format!(
                "output_directory {} is not a valid path",
                path.display()
            )));
        }
        Ok(())
    }
}
