//! Change-detection log builder
//!
//! Folds enriched rows into an append-only slowly changing dimension log.
//! Intervals are visited in chronological order. Within an interval only the
//! latest row per entity key is kept; it is appended when the entity has never
//! been recorded or when a tracked attribute differs from the most recently
//! recorded version of that entity. Each interval depends on everything
//! recorded before it, so intervals are never processed out of order.
//!
//! Tie-break: when several rows of one entity share the maximum timestamp of
//! an interval, the one that comes first in input order wins.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::interval::{Granularity, IntervalSequence};
use crate::models::{EnrichedRow, EntityKey, LogRow, Table, Value};
use crate::schema::LogTableDefinition;

/// Whether any tracked attribute differs, using null-aware inequality
#[must_use]
pub fn has_changed(previous: &[Value], current: &[Value]) -> bool {
    previous.len() != current.len() || previous.iter().zip(current).any(|(p, c)| p.is_distinct_from(c))
}

#[derive(Debug, Clone)]
struct RecordedVersion {
    ingest_timestamp: NaiveDateTime,
    tracked: Vec<Value>,
}

/// Counts gathered while building one log table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogBuildStats {
    /// Log table name
    pub table: String,
    /// Rows recorded by earlier runs
    pub prior_rows: usize,
    /// Intervals visited
    pub intervals: usize,
    /// Rows appended by this build
    pub appended_rows: usize,
    /// Rows skipped because an entity key component was null
    pub skipped_null_key: usize,
    /// Selected rows not newer than the entity's last recorded version
    pub skipped_stale: usize,
    /// Rows without an observation timestamp
    pub untimed_rows: usize,
    /// Rows whose timestamp fell outside every interval
    pub unbucketed_rows: usize,
}

/// Rows appended to one log table and the counts behind them
#[derive(Debug, Clone)]
pub struct LogBuild {
    /// Definition the rows were built for
    pub definition: LogTableDefinition,
    /// Appended rows, in interval order then entity key order
    pub rows: Vec<LogRow>,
    /// Data-quality counts
    pub stats: LogBuildStats,
}

impl LogBuild {
    /// Appended rows as a table
    #[must_use]
    pub fn to_table(&self) -> Table {
        self.definition.to_table(&self.rows)
    }
}

/// Builds one change log table from enriched rows
#[derive(Debug, Clone)]
pub struct ChangeLogBuilder {
    definition: LogTableDefinition,
    granularity: Granularity,
    latest: HashMap<EntityKey, RecordedVersion>,
    prior_rows: usize,
}

impl ChangeLogBuilder {
    /// Builder for `definition`, expecting intervals at `granularity`
    #[must_use]
    pub fn new(definition: LogTableDefinition, granularity: Granularity) -> Self {
        Self {
            definition,
            granularity,
            latest: HashMap::new(),
            prior_rows: 0,
        }
    }

    /// Seed the builder with rows recorded by earlier runs
    pub fn with_prior(mut self, prior: &[LogRow]) -> Result<Self> {
        for row in prior {
            if row.key.len() != self.definition.key_columns.len()
                || row.tracked.len() != self.definition.tracked_columns.len()
            {
                return Err(PipelineError::MalformedInput(format!(
                    "prior row of {} does not match its definition",
                    self.definition.table
                )));
            }
            let newer = self
                .latest
                .get(&row.key)
                .is_none_or(|recorded| row.ingest_timestamp >= recorded.ingest_timestamp);
            if newer {
                self.latest.insert(
                    row.key.clone(),
                    RecordedVersion {
                        ingest_timestamp: row.ingest_timestamp,
                        tracked: row.tracked.clone(),
                    },
                );
            }
        }
        self.prior_rows += prior.len();
        Ok(self)
    }

    /// Definition this builder writes
    #[must_use]
    pub const fn definition(&self) -> &LogTableDefinition {
        &self.definition
    }

    fn entity_key(&self, row: &EnrichedRow) -> Result<Option<EntityKey>> {
        let mut key = Vec::with_capacity(self.definition.key_columns.len());
        for column in &self.definition.key_columns {
            match row.value(column).to_key_part(column)? {
                Some(part) => key.push(part),
                None => return Ok(None),
            }
        }
        Ok(Some(key))
    }

    fn tracked_values(&self, row: &EnrichedRow) -> Vec<Value> {
        self.definition
            .tracked_columns
            .iter()
            .map(|column| row.value(column).clone())
            .collect()
    }

    /// Fold `rows` over `intervals` and return the rows to append
    pub fn build(mut self, rows: &[EnrichedRow], intervals: &IntervalSequence) -> Result<LogBuild> {
        if intervals.granularity() != self.granularity {
            return Err(PipelineError::GranularityMismatch {
                expected: self.granularity.to_string(),
                actual: intervals.granularity().to_string(),
            });
        }

        let mut stats = LogBuildStats {
            table: self.definition.table.clone(),
            prior_rows: self.prior_rows,
            intervals: intervals.len(),
            ..LogBuildStats::default()
        };

        let mut buckets: Vec<Vec<(usize, NaiveDateTime)>> = vec![Vec::new(); intervals.len()];
        for (index, row) in rows.iter().enumerate() {
            let Some(ts) = row.observed_at else {
                stats.untimed_rows += 1;
                continue;
            };
            match intervals.locate(ts) {
                Some(bucket) => buckets[bucket].push((index, ts)),
                None => stats.unbucketed_rows += 1,
            }
        }

        let mut appended = Vec::new();
        for (interval, bucket) in intervals.intervals().iter().zip(&buckets) {
            let mut selected: BTreeMap<EntityKey, (NaiveDateTime, usize)> = BTreeMap::new();
            for &(index, ts) in bucket {
                let Some(key) = self.entity_key(&rows[index])? else {
                    debug!(table = %self.definition.table, row = index, "Skipping row with null entity key");
                    stats.skipped_null_key += 1;
                    continue;
                };
                selected
                    .entry(key)
                    .and_modify(|current| {
                        if ts > current.0 {
                            *current = (ts, index);
                        }
                    })
                    .or_insert((ts, index));
            }

            let before = appended.len();
            for (key, (ts, index)) in selected {
                let tracked = self.tracked_values(&rows[index]);
                let emit = match self.latest.get(&key) {
                    None => true,
                    Some(recorded) if ts <= recorded.ingest_timestamp => {
                        stats.skipped_stale += 1;
                        false
                    },
                    Some(recorded) => has_changed(&recorded.tracked, &tracked),
                };
                if emit {
                    self.latest.insert(
                        key.clone(),
                        RecordedVersion {
                            ingest_timestamp: ts,
                            tracked: tracked.clone(),
                        },
                    );
                    appended.push(LogRow {
                        key,
                        ingest_timestamp: ts,
                        tracked,
                    });
                }
            }
            debug!(
                table = %self.definition.table,
                interval_start = %interval.start,
                candidates = bucket.len(),
                appended = appended.len() - before,
                "Processed interval"
            );
        }

        stats.appended_rows = appended.len();
        if stats.skipped_null_key > 0 || stats.skipped_stale > 0 {
            warn!(
                table = %stats.table,
                skipped_null_key = stats.skipped_null_key,
                skipped_stale = stats.skipped_stale,
                "Skipped rows while building change log"
            );
        }

        Ok(LogBuild {
            definition: self.definition,
            rows: appended,
            stats,
        })
    }
}
