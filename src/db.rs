use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params, params_from_iter, Connection, ToSql};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::models::{DimensionRow, LogRow, Table, Value, TIMESTAMP_FORMAT};
use crate::repository::{TableHistory, TableSink};
use crate::schema::{DimensionDefinition, LogTableDefinition, DIMENSION_ID, DIMENSION_SOURCE, INGEST_TIMESTAMP};
use crate::source::parse_timestamp;
use crate::validation::InputValidator;

const TIMESTAMP_TYPE: &str = "TIMESTAMP";

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Self::Integer(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i)),
            Self::Float(f) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*f)),
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Self::Timestamp(ts) => ToSqlOutput::Owned(rusqlite::types::Value::Text(ts.format(TIMESTAMP_FORMAT).to_string())),
        })
    }
}

/// Convert a stored value back, parsing text held in timestamp columns
fn value_from_sql(value: ValueRef<'_>, declared_type: &str) -> Result<Value> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            if declared_type.eq_ignore_ascii_case(TIMESTAMP_TYPE) {
                Value::Timestamp(parse_timestamp(&text)?)
            } else {
                Value::Text(text.into_owned())
            }
        },
        ValueRef::Blob(_) => {
            return Err(PipelineError::MalformedInput("binary values are not supported".to_string()));
        },
    })
}

/// Declared SQL type for a column, taken from its first non-null value
fn declared_type(table: &Table, index: usize) -> &'static str {
    match table.columns[index].as_str() {
        INGEST_TIMESTAMP => return TIMESTAMP_TYPE,
        DIMENSION_ID => return "BIGINT",
        _ => {},
    }
    table
        .rows
        .iter()
        .map(|row| &row[index])
        .find(|value| !value.is_null())
        .map_or("", |value| match value {
            Value::Integer(_) => "BIGINT",
            Value::Float(_) => "DOUBLE",
            Value::Timestamp(_) => TIMESTAMP_TYPE,
            Value::Text(_) | Value::Null => "TEXT",
        })
}

fn quote(identifier: &str) -> Result<String> {
    InputValidator::validate_identifier(identifier)?;
    Ok(format!("\"{identifier}\""))
}

fn quote_all<'a, I>(identifiers: I) -> Result<String>
where
    I: IntoIterator<Item = &'a String>,
{
    Ok(identifiers
        .into_iter()
        .map(|identifier| quote(identifier))
        .collect::<Result<Vec<_>>>()?
        .join(", "))
}

/// SQLite relational store for dimension and log tables
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database at `database_url`.
    ///
    /// Accepts a plain path, a `sqlite:` prefixed path or `:memory:`.
    pub fn open(database_url: &str) -> Result<Self> {
        let path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            Connection::open(path)?
        };
        info!(database = %path, "Opened relational store");
        Ok(Self { conn })
    }

    /// Throwaway in-memory store
    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Whether `table` exists
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            params![table],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Number of rows stored in `table`
    pub fn row_count(&self, table: &str) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", quote(table)?), [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn column_types(&self, table: &str) -> Result<BTreeMap<String, String>> {
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({})", quote(table)?))?;
        let columns = stmt
            .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?)))?
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
        Ok(columns)
    }

    /// Every row of `table`, ordered by the given columns
    pub fn read_table(&self, table: &str, order_by: &[String]) -> Result<Table> {
        let types = self.column_types(table)?;
        let mut sql = format!("SELECT * FROM {}", quote(table)?);
        if !order_by.is_empty() {
            sql.push_str(&format!(" ORDER BY {}", quote_all(order_by)?));
        }
        let mut stmt = self.conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(ToString::to_string).collect();
        let declared: Vec<&str> = columns
            .iter()
            .map(|column| types.get(column).map_or("", String::as_str))
            .collect();

        let mut output = Table::new(table, columns.clone());
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let values = declared
                .iter()
                .enumerate()
                .map(|(index, declared_type)| value_from_sql(row.get_ref(index)?, declared_type))
                .collect::<Result<Vec<_>>>()?;
            output.rows.push(values);
        }
        Ok(output)
    }

    fn create_table(conn: &Connection, table: &Table) -> Result<()> {
        let mut definitions = Vec::with_capacity(table.columns.len() + 1);
        for (index, column) in table.columns.iter().enumerate() {
            let column_type = declared_type(table, index);
            definitions.push(format!("{} {column_type}", quote(column)?).trim_end().to_string());
        }
        if !table.primary_key.is_empty() {
            definitions.push(format!("PRIMARY KEY ({})", quote_all(&table.primary_key)?));
        }
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote(&table.name)?,
            definitions.join(", ")
        ))?;
        Ok(())
    }

    fn insert_rows(conn: &Connection, table: &Table) -> Result<usize> {
        if table.is_empty() {
            return Ok(0);
        }
        let placeholders = (1..=table.columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = conn.prepare(&format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            quote(&table.name)?,
            quote_all(&table.columns)?
        ))?;
        for row in &table.rows {
            stmt.execute(params_from_iter(row.iter()))?;
        }
        Ok(table.len())
    }
}

impl TableSink for SqliteStore {
    fn write_tables(&mut self, tables: &[Table]) -> Result<()> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        for table in tables {
            Self::create_table(&tx, table)?;
            let rows = Self::insert_rows(&tx, table)?;
            debug!(table = %table.name, rows, "Appended rows");
            inserted += rows;
        }
        tx.commit()?;
        info!(tables = tables.len(), rows = inserted, "Committed run to relational store");
        Ok(())
    }
}

impl TableHistory for SqliteStore {
    fn dimension_rows(&self, definition: &DimensionDefinition) -> Result<Vec<DimensionRow>> {
        if !self.table_exists(&definition.table)? {
            return Ok(Vec::new());
        }
        let table = self.read_table(&definition.table, &[DIMENSION_ID.to_string()])?;
        let id_index = column_position(&table, DIMENSION_ID)?;
        let key_index = column_position(&table, &definition.natural_key_column)?;
        let source_index = table.column_index(DIMENSION_SOURCE);

        table
            .rows
            .iter()
            .map(|row| {
                let Value::Integer(id) = row[id_index] else {
                    return Err(malformed(&definition.table, DIMENSION_ID));
                };
                let natural_key = row[key_index]
                    .to_key_part(&definition.natural_key_column)?
                    .ok_or_else(|| malformed(&definition.table, &definition.natural_key_column))?;
                let source = source_index.and_then(|index| match &row[index] {
                    Value::Text(source) => Some(source.clone()),
                    _ => None,
                });
                Ok(DimensionRow {
                    id,
                    source,
                    natural_key,
                })
            })
            .collect()
    }

    fn log_rows(&self, definition: &LogTableDefinition) -> Result<Vec<LogRow>> {
        if !self.table_exists(&definition.table)? {
            return Ok(Vec::new());
        }
        let table = self.read_table(&definition.table, &[INGEST_TIMESTAMP.to_string()])?;
        let position = |column: &str| column_position(&table, definition.storage_column(column));
        let key_indices = definition
            .key_columns
            .iter()
            .map(|column| position(column))
            .collect::<Result<Vec<_>>>()?;
        let tracked_indices = definition
            .tracked_columns
            .iter()
            .map(|column| position(column))
            .collect::<Result<Vec<_>>>()?;
        let ts_index = position(INGEST_TIMESTAMP)?;

        let rows = table
            .rows
            .iter()
            .map(|row| {
                let key = key_indices
                    .iter()
                    .zip(&definition.key_columns)
                    .map(|(&index, column)| {
                        row[index]
                            .to_key_part(column)?
                            .ok_or_else(|| malformed(&definition.table, column))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let ingest_timestamp: NaiveDateTime = match &row[ts_index] {
                    Value::Timestamp(ts) => *ts,
                    _ => return Err(malformed(&definition.table, INGEST_TIMESTAMP)),
                };
                let tracked = tracked_indices.iter().map(|&index| row[index].clone()).collect();
                Ok(LogRow {
                    key,
                    ingest_timestamp,
                    tracked,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(table = %definition.table, rows = rows.len(), "Loaded prior log rows");
        Ok(rows)
    }
}

fn column_position(table: &Table, column: &str) -> Result<usize> {
    table.column_index(column).ok_or_else(|| PipelineError::UnknownColumn {
        table: table.name.clone(),
        column: column.to_string(),
    })
}

fn malformed(table: &str, column: &str) -> PipelineError {
    PipelineError::MalformedInput(format!("stored {table}.{column} has an unexpected value"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KeyPart;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").expect("valid timestamp")
    }

    #[test]
    fn test_dimension_round_trip() {
        let mut store = SqliteStore::in_memory().expect("open");
        let definition = DimensionDefinition::new("users", "channel_id", "source_id").sourced_from("youtube");
        let rows = vec![DimensionRow {
            id: 1,
            source: Some("youtube".to_string()),
            natural_key: KeyPart::Text("c1".to_string()),
        }];
        store.write_tables(&[definition.to_table(&rows)]).expect("write");
        assert_eq!(store.dimension_rows(&definition).expect("read"), rows);
    }

    #[test]
    fn test_log_history_reverses_storage_alias() {
        let mut store = SqliteStore::in_memory().expect("open");
        let definition = LogTableDefinition::new("meta", &["playlist_id"], &["playlist_name"])
            .with_storage_alias("playlist_name", "name");
        let rows = vec![LogRow {
            key: vec![KeyPart::Integer(3)],
            ingest_timestamp: ts("2022-05-20 12:00:00"),
            tracked: vec![Value::from("Hits")],
        }];
        store
            .write_tables(&[definition.to_storage(&definition.to_table(&rows))])
            .expect("write");

        let stored = store.read_table("meta", &[]).expect("read");
        assert!(stored.column_index("name").is_some());
        assert_eq!(store.log_rows(&definition).expect("history"), rows);
    }

    #[test]
    fn test_missing_tables_have_no_history() {
        let store = SqliteStore::in_memory().expect("open");
        let definition = LogTableDefinition::new("plays", &["playlist_id"], &["plays"]);
        assert!(store.log_rows(&definition).expect("history").is_empty());
        assert!(!store.table_exists("plays").expect("exists"));
    }

    #[test]
    fn test_duplicate_primary_key_rolls_back() {
        let mut store = SqliteStore::in_memory().expect("open");
        let definition = DimensionDefinition::new("artists", "artist_name", "name");
        let row = DimensionRow {
            id: 1,
            source: None,
            natural_key: KeyPart::Text("Adele".to_string()),
        };
        let first = definition.to_table(&[row]);
        let second = LogTableDefinition::new("plays", &["playlist_id"], &["plays"]).to_table(&[]);
        store.write_tables(&[first.clone()]).expect("first write");

        let failed = store.write_tables(&[second, first]);
        assert!(failed.is_err());
        assert!(!store.table_exists("plays").expect("exists"));
        assert_eq!(store.row_count("artists").expect("count"), 1);
    }
}
