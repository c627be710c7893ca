//! Table schema definitions
//!
//! Constants for table and column names, and the declarative definitions that
//! drive the identifier registries and the change-log builders. A log table is
//! described once here and handled by one generic builder.

use std::collections::BTreeMap;

use crate::models::{DimensionRow, LogRow, Table, Value};

/// Column holding the interval's representative timestamp in every log table
pub const INGEST_TIMESTAMP: &str = "ingest_timestamp";
/// Surrogate ID column of every dimension table
pub const DIMENSION_ID: &str = "id";
/// Source label column of sourced dimension tables
pub const DIMENSION_SOURCE: &str = "source";
/// Natural key column of sourced dimension tables
pub const DIMENSION_SOURCE_ID: &str = "source_id";

/// Playlists dimension
pub mod playlists {
    /// Table name
    pub const TABLE: &str = "playlists";
}

/// Users (channels) dimension
pub mod users {
    /// Table name
    pub const TABLE: &str = "users";
}

/// Media items (videos) dimension
pub mod media_items {
    /// Table name
    pub const TABLE: &str = "media_items";
}

/// Artists dimension, keyed by name across sources
pub mod artists {
    /// Table name
    pub const TABLE: &str = "artists";
    /// Natural key column
    pub const NAME: &str = "name";
}

/// Playlist metadata change log
pub mod playlist_metadata_log {
    /// Table name
    pub const TABLE: &str = "playlist_metadata_log";
}

/// Playlist play count change log
pub mod playlist_plays_log {
    /// Table name
    pub const TABLE: &str = "playlist_plays_log";
}

/// Playlist position change log
pub mod playlist_positions_log {
    /// Table name
    pub const TABLE: &str = "playlist_positions_log";
}

/// Media item metadata change log
pub mod media_item_metadata_log {
    /// Table name
    pub const TABLE: &str = "media_item_metadata_log";
}

/// Track to ISRC lookup
pub mod isrc_lookup {
    /// Table name
    pub const TABLE: &str = "isrc_lookup";
    /// Track title column
    pub const TRACK: &str = "track";
    /// Artist name column
    pub const ARTIST: &str = "artist";
    /// ISRC code column
    pub const ISRC: &str = "isrc";
}

/// Declarative description of a dimension table and the registry behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionDefinition {
    /// Table name, also the registry name joins refer to
    pub table: String,
    /// Raw row attribute holding the source key
    pub source_column: String,
    /// Output column holding the source key
    pub natural_key_column: String,
    /// Constant source label, for entities sourced from a single system
    pub source: Option<String>,
}

impl DimensionDefinition {
    /// Unsourced dimension keyed by `source_column`
    #[must_use]
    pub fn new(table: &str, source_column: &str, natural_key_column: &str) -> Self {
        Self {
            table: table.to_string(),
            source_column: source_column.to_string(),
            natural_key_column: natural_key_column.to_string(),
            source: None,
        }
    }

    /// Tag every mapping with a constant source label
    #[must_use]
    pub fn sourced_from(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    /// Output columns in order
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        let mut columns = vec![DIMENSION_ID.to_string()];
        if self.source.is_some() {
            columns.push(DIMENSION_SOURCE.to_string());
        }
        columns.push(self.natural_key_column.clone());
        columns
    }

    /// Render dimension rows as a table
    #[must_use]
    pub fn to_table(&self, rows: &[DimensionRow]) -> Table {
        let mut table = Table::new(&self.table, self.columns()).with_primary_key(vec![DIMENSION_ID.to_string()]);
        for row in rows {
            let mut values = vec![Value::Integer(row.id)];
            if self.source.is_some() {
                values.push(Value::from(row.source.clone()));
            }
            values.push(row.natural_key.to_value());
            table.rows.push(values);
        }
        table
    }
}

/// Declarative description of one slowly changing dimension log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTableDefinition {
    /// Table name
    pub table: String,
    /// Attributes forming the entity key
    pub key_columns: Vec<String>,
    /// Attributes whose changes are recorded
    pub tracked_columns: Vec<String>,
    /// Columns stored under a different name in the relational store
    pub storage_aliases: BTreeMap<String, String>,
}

impl LogTableDefinition {
    /// Define a log keyed by `key_columns` tracking `tracked_columns`
    #[must_use]
    pub fn new(table: &str, key_columns: &[&str], tracked_columns: &[&str]) -> Self {
        Self {
            table: table.to_string(),
            key_columns: key_columns.iter().map(ToString::to_string).collect(),
            tracked_columns: tracked_columns.iter().map(ToString::to_string).collect(),
            storage_aliases: BTreeMap::new(),
        }
    }

    /// Store `column` as `stored` in the relational store
    #[must_use]
    pub fn with_storage_alias(mut self, column: &str, stored: &str) -> Self {
        self.storage_aliases.insert(column.to_string(), stored.to_string());
        self
    }

    /// Output columns: key columns, `ingest_timestamp`, tracked columns
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        self.key_columns
            .iter()
            .cloned()
            .chain(std::iter::once(INGEST_TIMESTAMP.to_string()))
            .chain(self.tracked_columns.iter().cloned())
            .collect()
    }

    /// Name of `column` in the relational store
    #[must_use]
    pub fn storage_column<'a>(&'a self, column: &'a str) -> &'a str {
        self.storage_aliases.get(column).map_or(column, String::as_str)
    }

    /// Rename a table's columns to their relational store names
    #[must_use]
    pub fn to_storage(&self, table: &Table) -> Table {
        table.renamed(|column| self.storage_column(column).to_string())
    }

    /// Render log rows as a table
    #[must_use]
    pub fn to_table(&self, rows: &[LogRow]) -> Table {
        let primary_key = self
            .key_columns
            .iter()
            .cloned()
            .chain(std::iter::once(INGEST_TIMESTAMP.to_string()))
            .collect();
        let mut table = Table::new(&self.table, self.columns()).with_primary_key(primary_key);
        for row in rows {
            let values = row
                .key
                .iter()
                .map(crate::models::KeyPart::to_value)
                .chain(std::iter::once(Value::Timestamp(row.ingest_timestamp)))
                .chain(row.tracked.iter().cloned())
                .collect();
            table.rows.push(values);
        }
        table
    }
}
