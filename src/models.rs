//! Data models for raw observations, enriched rows and output tables
//!
//! This module contains the value types that flow through the pipeline:
//! raw rows as read from a snapshot, enriched rows keyed by surrogate IDs,
//! and the rows of the dimension and log tables handed to the writers.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Rendering used for timestamps in every output table
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

static NULL_VALUE: Value = Value::Null;

/// A single attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value
    Null,
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// Text value
    Text(String),
    /// Date/time value
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Whether this value is null
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Null-aware inequality.
    ///
    /// Two nulls are the same, a null and a non-null are different, and
    /// non-null values compare by content. Integers and floats compare
    /// numerically; any other pair of differing kinds is different.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn is_distinct_from(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => false,
            (Self::Null, _) | (_, Self::Null) => true,
            (Self::Integer(a), Self::Integer(b)) => a != b,
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b) != Ordering::Equal,
            (Self::Integer(a), Self::Float(b)) | (Self::Float(b), Self::Integer(a)) => {
                (*a as f64).total_cmp(b) != Ordering::Equal
            },
            (Self::Text(a), Self::Text(b)) => a != b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a != b,
            _ => true,
        }
    }

    /// Convert to a key component.
    ///
    /// Returns `Ok(None)` for null. Floats are rejected because they have no
    /// reliable equality.
    pub fn to_key_part(&self, column: &str) -> Result<Option<KeyPart>> {
        match self {
            Self::Null => Ok(None),
            Self::Integer(i) => Ok(Some(KeyPart::Integer(*i))),
            Self::Text(s) => Ok(Some(KeyPart::Text(s.clone()))),
            Self::Timestamp(ts) => Ok(Some(KeyPart::Timestamp(*ts))),
            Self::Float(f) => Err(PipelineError::UnkeyableValue {
                column: column.to_string(),
                value: f.to_string(),
            }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
            Self::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Self::Timestamp(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// A non-null, totally ordered key component
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyPart {
    /// Integer key
    Integer(i64),
    /// Text key
    Text(String),
    /// Date/time key
    Timestamp(NaiveDateTime),
}

impl KeyPart {
    /// Widen back into a `Value`
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Integer(i) => Value::Integer(*i),
            Self::Text(s) => Value::Text(s.clone()),
            Self::Timestamp(ts) => Value::Timestamp(*ts),
        }
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
            Self::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
        }
    }
}

/// Composite entity key, one part per key attribute
pub type EntityKey = Vec<KeyPart>;

/// Named attribute values of a row
pub type Attributes = BTreeMap<String, Value>;

/// One observation of the source at one instant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    /// Observed attributes, including source-native keys
    pub attributes: Attributes,
    /// Observation timestamp (optional, unparseable rows never get this far)
    pub observed_at: Option<NaiveDateTime>,
}

impl RawRow {
    /// Create an empty row observed at `observed_at`
    #[must_use]
    pub fn new(observed_at: Option<NaiveDateTime>) -> Self {
        Self {
            attributes: Attributes::new(),
            observed_at,
        }
    }

    /// Builder-style attribute setter
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Attribute lookup that distinguishes a missing attribute from a null one
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Attribute lookup where a missing attribute reads as null
    #[must_use]
    pub fn value(&self, name: &str) -> &Value {
        self.attributes.get(name).unwrap_or(&NULL_VALUE)
    }
}

/// A raw row with source-native keys replaced by surrogate IDs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRow {
    /// Surrogate IDs and projected attributes; an absent optional ID is null
    pub attributes: Attributes,
    /// Observation timestamp carried over from the raw row
    pub observed_at: Option<NaiveDateTime>,
}

impl EnrichedRow {
    /// Attribute lookup where a missing attribute reads as null
    #[must_use]
    pub fn value(&self, name: &str) -> &Value {
        self.attributes.get(name).unwrap_or(&NULL_VALUE)
    }

    /// Surrogate ID stored under `name`, if present
    #[must_use]
    pub fn surrogate_id(&self, name: &str) -> Option<i64> {
        match self.attributes.get(name) {
            Some(Value::Integer(id)) => Some(*id),
            _ => None,
        }
    }
}

/// One row of a dimension table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionRow {
    /// Surrogate ID
    pub id: i64,
    /// Constant source label for single-source entities
    pub source: Option<String>,
    /// Source-native or natural key
    pub natural_key: KeyPart,
}

/// One row of a change log table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRow {
    /// Entity key values, in definition order
    pub key: EntityKey,
    /// Timestamp of the enriched row this version was taken from
    pub ingest_timestamp: NaiveDateTime,
    /// Tracked attribute values, in definition order
    pub tracked: Vec<Value>,
}

/// A named, ordered table ready for a writer
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Column names
    pub columns: Vec<String>,
    /// Columns whose combined values are unique per row
    pub primary_key: Vec<String>,
    /// Rows, each with one value per column
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table
    #[must_use]
    pub fn new(name: &str, columns: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            columns,
            primary_key: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Declare the primary key columns
    #[must_use]
    pub fn with_primary_key(mut self, columns: Vec<String>) -> Self {
        self.primary_key = columns;
        self
    }

    /// Copy of this table with columns renamed through `rename`
    #[must_use]
    pub fn renamed<F>(&self, rename: F) -> Self
    where
        F: Fn(&str) -> String,
    {
        Self {
            name: self.name.clone(),
            columns: self.columns.iter().map(|c| rename(c)).collect(),
            primary_key: self.primary_key.iter().map(|c| rename(c)).collect(),
            rows: self.rows.clone(),
        }
    }

    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by name
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column, top to bottom
    #[must_use]
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_aware_inequality() {
        assert!(!Value::Null.is_distinct_from(&Value::Null));
        assert!(Value::Null.is_distinct_from(&Value::Integer(0)));
        assert!(Value::Text(String::new()).is_distinct_from(&Value::Null));
        assert!(!Value::Integer(2).is_distinct_from(&Value::Float(2.0)));
        assert!(Value::Integer(2).is_distinct_from(&Value::Text("2".into())));
        assert!(!Value::Float(f64::NAN).is_distinct_from(&Value::Float(f64::NAN)));
    }

    #[test]
    fn test_float_is_not_a_key() {
        assert!(Value::Float(1.5).to_key_part("position").is_err());
        assert_eq!(Value::Null.to_key_part("position").ok(), Some(None));
    }

    #[test]
    fn test_missing_attribute_reads_as_null() {
        let row = RawRow::new(None).with("a", 1_i64);
        assert!(row.get("b").is_none());
        assert!(row.value("b").is_null());
    }
}
