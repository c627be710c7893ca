//! Pipeline orchestration
//!
//! One run goes through four stages: build every identifier registry, enrich
//! the raw rows, partition the enriched timestamps into intervals once, then
//! build each change log over the same rows and intervals. Intermediate state
//! lives in an explicit [`PipelineContext`] owned by the run.
//!
//! Log builders are independent of each other, so [`Pipeline::run_concurrent`]
//! runs them on blocking tasks. Intervals inside one builder stay sequential.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::changelog::{ChangeLogBuilder, LogBuild, LogBuildStats};
use crate::enrichment::{enrich, Enrichment, EnrichmentStats};
use crate::error::Result;
use crate::ingestors::IngestorDefinition;
use crate::interval::{Granularity, IntervalSequence};
use crate::metrics::{MetricsCollector, MetricsTimer};
use crate::models::{RawRow, Table};
use crate::registry::IdentifierRegistry;
use crate::repository::TableHistory;
use crate::validation::InputValidator;

/// Intermediate state shared by the stages of one run
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// Registries by dimension table name
    pub registries: BTreeMap<String, IdentifierRegistry>,
    /// Enriched rows and enrichment counts
    pub enrichment: Enrichment,
    /// Intervals covering every enriched timestamp
    pub intervals: IntervalSequence,
}

/// Data-quality and volume counts for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Counts from the enrichment stage
    pub enrichment: EnrichmentStats,
    /// Intervals the enriched rows were partitioned into
    pub intervals: usize,
    /// New mappings per dimension table
    pub dimension_rows_added: BTreeMap<String, usize>,
    /// Counts per log table, in definition order
    pub logs: Vec<LogBuildStats>,
}

impl RunSummary {
    /// Rows appended across every log table
    #[must_use]
    pub fn appended_rows(&self) -> usize {
        self.logs.iter().map(|log| log.appended_rows).sum()
    }

    /// Counts for one log table
    #[must_use]
    pub fn log(&self, table: &str) -> Option<&LogBuildStats> {
        self.logs.iter().find(|log| log.table == table)
    }
}

/// Everything one run produced
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// New dimension mappings, one table per registry
    pub dimensions: Vec<Table>,
    /// Appended log rows, one build per log definition
    pub logs: Vec<LogBuild>,
    /// Counts gathered along the way
    pub summary: RunSummary,
}

impl RunOutput {
    /// Every output table under its column names, dimensions first
    #[must_use]
    pub fn tables(&self) -> Vec<Table> {
        self.dimensions
            .iter()
            .cloned()
            .chain(self.logs.iter().map(LogBuild::to_table))
            .collect()
    }

    /// Every output table with columns renamed for the relational store
    #[must_use]
    pub fn storage_tables(&self) -> Vec<Table> {
        self.dimensions
            .iter()
            .cloned()
            .chain(self.logs.iter().map(|log| log.definition.to_storage(&log.to_table())))
            .collect()
    }

    /// Output table by name
    #[must_use]
    pub fn table(&self, name: &str) -> Option<Table> {
        self.dimensions
            .iter()
            .find(|table| table.name == name)
            .cloned()
            .or_else(|| self.logs.iter().find(|log| log.definition.table == name).map(LogBuild::to_table))
    }
}

/// Runs one ingestor definition at one granularity
#[derive(Debug, Clone)]
pub struct Pipeline {
    definition: IngestorDefinition,
    granularity: Granularity,
    metrics: MetricsCollector,
}

impl Pipeline {
    /// Validate `definition` and build a pipeline for it
    pub fn new(definition: IngestorDefinition, granularity: Granularity) -> Result<Self> {
        InputValidator::validate_ingestor(&definition)?;
        Ok(Self {
            definition,
            granularity,
            metrics: MetricsCollector::default(),
        })
    }

    /// Definition this pipeline runs
    #[must_use]
    pub const fn definition(&self) -> &IngestorDefinition {
        &self.definition
    }

    /// Granularity of every log this pipeline builds
    #[must_use]
    pub const fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Build registries, enrich and partition
    #[instrument(skip_all, fields(ingestor = %self.definition.name, rows = rows.len()))]
    pub fn prepare(&self, rows: &[RawRow], history: &dyn TableHistory) -> Result<PipelineContext> {
        let timer = MetricsTimer::new(self.metrics.clone(), "registries");
        let mut registries = BTreeMap::new();
        for dimension in &self.definition.dimensions {
            let prior = history.dimension_rows(dimension)?;
            let registry = IdentifierRegistry::build_with_prior(dimension, rows, &prior)?;
            registries.insert(dimension.table.clone(), registry);
        }
        timer.finish();
        info!(registries = registries.len(), "Built identifier registries");

        let timer = MetricsTimer::new(self.metrics.clone(), "enrichment");
        let enrichment = enrich(rows, &self.definition.enrichment, &registries)?;
        timer.finish();
        let stats = &enrichment.stats;
        info!(enriched = stats.enriched_rows, "Enriched raw rows");
        if stats.dropped_null_required > 0 || stats.dropped_unmapped_required > 0 {
            warn!(
                null_required = stats.dropped_null_required,
                unmapped_required = stats.dropped_unmapped_required,
                "Dropped rows without a required surrogate ID"
            );
        }
        if stats.untimed_rows > 0 {
            warn!(untimed = stats.untimed_rows, "Enriched rows without an observation timestamp");
        }

        let intervals = IntervalSequence::covering(
            enrichment.rows.iter().filter_map(|row| row.observed_at),
            self.granularity,
        );
        info!(intervals = intervals.len(), granularity = %self.granularity, "Partitioned observation range");

        Ok(PipelineContext {
            registries,
            enrichment,
            intervals,
        })
    }

    fn log_builders(&self, history: &dyn TableHistory) -> Result<Vec<ChangeLogBuilder>> {
        self.definition
            .logs
            .iter()
            .map(|log| {
                let prior = history.log_rows(log)?;
                ChangeLogBuilder::new(log.clone(), self.granularity).with_prior(&prior)
            })
            .collect()
    }

    /// Run every stage sequentially
    pub fn run(&self, rows: &[RawRow], history: &dyn TableHistory) -> Result<RunOutput> {
        let context = self.prepare(rows, history)?;
        let builders = self.log_builders(history)?;

        let timer = MetricsTimer::new(self.metrics.clone(), "change_logs");
        let logs = builders
            .into_iter()
            .map(|builder| builder.build(&context.enrichment.rows, &context.intervals))
            .collect::<Result<Vec<_>>>()?;
        timer.finish();

        Ok(self.finish(&context.registries, context.enrichment.stats, context.intervals.len(), logs))
    }

    /// Run the log builders concurrently on blocking tasks.
    ///
    /// Output is gathered in definition order, so it matches [`Pipeline::run`].
    pub async fn run_concurrent(&self, rows: &[RawRow], history: &dyn TableHistory) -> Result<RunOutput> {
        let PipelineContext {
            registries,
            enrichment,
            intervals,
        } = self.prepare(rows, history)?;
        let builders = self.log_builders(history)?;
        let interval_count = intervals.len();

        let timer = MetricsTimer::new(self.metrics.clone(), "change_logs");
        let enriched = Arc::new(enrichment.rows);
        let intervals = Arc::new(intervals);
        let handles: Vec<_> = builders
            .into_iter()
            .map(|builder| {
                let enriched = Arc::clone(&enriched);
                let intervals = Arc::clone(&intervals);
                tokio::task::spawn_blocking(move || builder.build(&enriched, &intervals))
            })
            .collect();

        let mut logs = Vec::with_capacity(handles.len());
        for handle in handles {
            logs.push(handle.await??);
        }
        timer.finish();

        Ok(self.finish(&registries, enrichment.stats, interval_count, logs))
    }

    fn finish(
        &self,
        registries: &BTreeMap<String, IdentifierRegistry>,
        enrichment: EnrichmentStats,
        intervals: usize,
        logs: Vec<LogBuild>,
    ) -> RunOutput {
        let dimensions: Vec<Table> = self
            .definition
            .dimensions
            .iter()
            .filter_map(|dimension| registries.get(&dimension.table))
            .map(IdentifierRegistry::to_table)
            .collect();

        let summary = RunSummary {
            enrichment,
            intervals,
            dimension_rows_added: dimensions.iter().map(|table| (table.name.clone(), table.len())).collect(),
            logs: logs.iter().map(|log| log.stats.clone()).collect(),
        };

        self.metrics.record_run(&self.definition.name, &summary);
        info!(
            ingestor = %self.definition.name,
            appended = summary.appended_rows(),
            intervals = summary.intervals,
            "Pipeline run complete"
        );

        RunOutput {
            dimensions,
            logs,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::EnrichmentPlan;
    use crate::models::{DimensionRow, KeyPart, LogRow};
    use crate::repository::{MockTableHistory, NoHistory};
    use crate::schema::{DimensionDefinition, LogTableDefinition};
    use chrono::NaiveDateTime;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").expect("valid timestamp")
    }

    fn definition() -> IngestorDefinition {
        IngestorDefinition {
            name: "playlist_test".to_string(),
            timestamp_column: "timestp".to_string(),
            dimensions: vec![DimensionDefinition::new("playlists", "playlist_id", "source_id").sourced_from("test")],
            enrichment: EnrichmentPlan::new()
                .inner_join("playlists", "playlist_id", "playlist_id")
                .project("views", "plays"),
            logs: vec![LogTableDefinition::new("playlist_plays_log", &["playlist_id"], &["plays"])],
        }
    }

    fn observation(playlist: &str, views: i64, at: &str) -> RawRow {
        RawRow::new(Some(ts(at))).with("playlist_id", playlist).with("views", views)
    }

    #[test]
    fn test_run_builds_dimensions_and_logs() {
        let pipeline = Pipeline::new(definition(), Granularity::Day).expect("valid definition");
        let rows = vec![
            observation("p1", 10_i64, "2022-05-20 10:00:00"),
            observation("p1", 10_i64, "2022-05-21 10:00:00"),
            observation("p1", 12_i64, "2022-05-22 10:00:00"),
        ];
        let output = pipeline.run(&rows, &NoHistory).expect("run");

        assert_eq!(output.summary.intervals, 3);
        assert_eq!(output.summary.dimension_rows_added.get("playlists"), Some(&1));
        let log = output.table("playlist_plays_log").expect("log table");
        assert_eq!(log.len(), 2);
        assert_eq!(output.tables().len(), 2);
    }

    #[test]
    fn test_run_reuses_history() {
        let pipeline = Pipeline::new(definition(), Granularity::Day).expect("valid definition");
        let mut history = MockTableHistory::new();
        history.expect_dimension_rows().returning(|_| {
            Ok(vec![DimensionRow {
                id: 7,
                source: Some("test".to_string()),
                natural_key: KeyPart::Text("p1".to_string()),
            }])
        });
        history.expect_log_rows().returning(|_| {
            Ok(vec![LogRow {
                key: vec![KeyPart::Integer(7)],
                ingest_timestamp: ts("2022-05-19 09:00:00"),
                tracked: vec![crate::models::Value::Integer(10)],
            }])
        });

        let rows = vec![observation("p1", 10_i64, "2022-05-20 10:00:00")];
        let output = pipeline.run(&rows, &history).expect("run");

        assert!(output.dimensions.iter().all(Table::is_empty));
        assert_eq!(output.summary.appended_rows(), 0);
        assert_eq!(output.summary.log("playlist_plays_log").map(|log| log.prior_rows), Some(1));
    }

    #[test]
    fn test_invalid_definition_is_rejected() {
        let mut bad = definition();
        bad.enrichment = bad.enrichment.inner_join("missing", "playlist_id", "other_id");
        assert!(Pipeline::new(bad, Granularity::Day).is_err());
    }

    #[tokio::test]
    async fn test_concurrent_matches_sequential() {
        let pipeline = Pipeline::new(definition(), Granularity::Day).expect("valid definition");
        let rows = vec![
            observation("p1", 1_i64, "2022-05-20 10:00:00"),
            observation("p2", 5_i64, "2022-05-20 11:00:00"),
            observation("p1", 2_i64, "2022-05-21 10:00:00"),
        ];
        let sequential = pipeline.run(&rows, &NoHistory).expect("run");
        let concurrent = pipeline.run_concurrent(&rows, &NoHistory).await.expect("run");
        assert_eq!(sequential.tables(), concurrent.tables());
        assert_eq!(sequential.summary, concurrent.summary);
    }
}
