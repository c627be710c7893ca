//! Raw snapshot readers.
//!
//! A source hands the pipeline the full, ordered sequence of raw rows of one
//! snapshot. The JSON reader accepts an array of flat records, the shape the
//! playlist crawler exports.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::models::{RawRow, Value};
use crate::validation::InputValidator;

/// Anything that can produce the raw rows of one snapshot
#[cfg_attr(test, mockall::automock)]
pub trait RowSource {
    /// Read every row, in source order
    fn read_rows(&self) -> Result<Vec<RawRow>>;
}

/// Reads a JSON file holding an array of flat records
#[derive(Debug, Clone)]
pub struct JsonRecordsSource {
    path: PathBuf,
    timestamp_column: String,
}

impl JsonRecordsSource {
    /// Reader for `path`, parsing `timestamp_column` as the observation time
    #[must_use]
    pub fn new(path: &Path, timestamp_column: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            timestamp_column: timestamp_column.to_string(),
        }
    }
}

impl RowSource for JsonRecordsSource {
    fn read_rows(&self) -> Result<Vec<RawRow>> {
        InputValidator::validate_source_path(&self.path)?;
        let file = File::open(&self.path).map_err(|_| PipelineError::SourceUnavailable(self.path.display().to_string()))?;
        let document: JsonValue = serde_json::from_reader(BufReader::new(file))?;
        let rows = records_to_rows(&document, &self.timestamp_column)?;
        info!(path = %self.path.display(), rows = rows.len(), "Loaded raw rows");
        Ok(rows)
    }
}

/// Convert a JSON array of records into raw rows
pub fn records_to_rows(document: &JsonValue, timestamp_column: &str) -> Result<Vec<RawRow>> {
    let JsonValue::Array(records) = document else {
        return Err(PipelineError::MalformedInput("expected a JSON array of records".to_string()));
    };

    let mut rows = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let JsonValue::Object(fields) = record else {
            return Err(PipelineError::MalformedInput(format!("record {index} is not an object")));
        };
        let mut row = RawRow::default();
        for (name, raw) in fields {
            let value = if name == timestamp_column {
                let observed_at = parse_json_timestamp(raw)?;
                row.observed_at = observed_at;
                Value::from(observed_at)
            } else {
                json_to_value(raw)
            };
            row.attributes.insert(name.clone(), value);
        }
        if row.observed_at.is_none() {
            debug!(record = index, "Record has no observation timestamp");
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Map a JSON scalar onto a `Value`; nested values keep their JSON text
#[must_use]
pub fn json_to_value(raw: &JsonValue) -> Value {
    match raw {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Integer(i64::from(*b)),
        JsonValue::Number(n) => n
            .as_i64()
            .map(Value::Integer)
            .or_else(|| n.as_f64().map(Value::Float))
            .unwrap_or(Value::Null),
        JsonValue::String(s) => Value::Text(s.clone()),
        JsonValue::Array(_) | JsonValue::Object(_) => Value::Text(raw.to_string()),
    }
}

fn parse_json_timestamp(raw: &JsonValue) -> Result<Option<NaiveDateTime>> {
    match raw {
        JsonValue::Null => Ok(None),
        JsonValue::String(s) => parse_timestamp(s).map(Some),
        JsonValue::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| Some(dt.naive_utc()))
            .ok_or_else(|| PipelineError::InvalidTimestamp(n.to_string())),
        other => Err(PipelineError::InvalidTimestamp(other.to_string())),
    }
}

/// Parse an ISO-8601 style timestamp.
///
/// Accepts `T` or space separated date-times with optional fractional seconds,
/// RFC 3339 with an offset (normalized to UTC) and bare dates (midnight).
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(ts);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN))
        .map_err(|_| PipelineError::InvalidTimestamp(s.to_string()))
}
