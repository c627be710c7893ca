use std::time::Duration;

use metrics::{counter, gauge, histogram};

use crate::pipeline::RunSummary;

/// Metric names published by the pipeline
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    // Input metrics
    pub raw_rows_total: &'static str,
    pub enriched_rows_total: &'static str,
    pub dropped_rows_total: &'static str,
    pub absent_optional_ids_total: &'static str,
    pub untimed_rows_total: &'static str,
    pub intervals: &'static str,

    // Log builder metrics
    pub log_rows_appended_total: &'static str,
    pub log_rows_skipped_total: &'static str,
    pub log_prior_rows: &'static str,

    // Dimension metrics
    pub dimension_rows_added_total: &'static str,

    // Stage and storage metrics
    pub stage_duration: &'static str,
    pub tables_written_total: &'static str,
    pub errors_total: &'static str,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            raw_rows_total: "playlist_history_raw_rows_total",
            enriched_rows_total: "playlist_history_enriched_rows_total",
            dropped_rows_total: "playlist_history_dropped_rows_total",
            absent_optional_ids_total: "playlist_history_absent_optional_ids_total",
            untimed_rows_total: "playlist_history_untimed_rows_total",
            intervals: "playlist_history_intervals",

            log_rows_appended_total: "playlist_history_log_rows_appended_total",
            log_rows_skipped_total: "playlist_history_log_rows_skipped_total",
            log_prior_rows: "playlist_history_log_prior_rows",

            dimension_rows_added_total: "playlist_history_dimension_rows_added_total",

            stage_duration: "playlist_history_stage_duration_seconds",
            tables_written_total: "playlist_history_tables_written_total",
            errors_total: "playlist_history_errors_total",
        }
    }
}

impl MetricsCollector {
    /// Publish every count of a finished run
    #[allow(clippy::cast_precision_loss)]
    pub fn record_run(&self, ingestor: &str, summary: &RunSummary) {
        let ingestor = ingestor.to_string();
        let enrichment = &summary.enrichment;

        counter!(self.raw_rows_total, "ingestor" => ingestor.clone()).increment(enrichment.input_rows as u64);
        counter!(self.enriched_rows_total, "ingestor" => ingestor.clone()).increment(enrichment.enriched_rows as u64);
        counter!(self.dropped_rows_total, "ingestor" => ingestor.clone(), "reason" => "null_required_key")
            .increment(enrichment.dropped_null_required as u64);
        counter!(self.dropped_rows_total, "ingestor" => ingestor.clone(), "reason" => "unmapped_required_key")
            .increment(enrichment.dropped_unmapped_required as u64);
        counter!(self.untimed_rows_total, "ingestor" => ingestor.clone()).increment(enrichment.untimed_rows as u64);
        for (column, count) in &enrichment.absent_optional {
            counter!(self.absent_optional_ids_total, "ingestor" => ingestor.clone(), "column" => column.clone())
                .increment(*count as u64);
        }
        gauge!(self.intervals, "ingestor" => ingestor.clone()).set(summary.intervals as f64);

        for (table, added) in &summary.dimension_rows_added {
            counter!(self.dimension_rows_added_total, "table" => table.clone()).increment(*added as u64);
        }

        for log in &summary.logs {
            counter!(self.log_rows_appended_total, "table" => log.table.clone()).increment(log.appended_rows as u64);
            counter!(self.log_rows_skipped_total, "table" => log.table.clone(), "reason" => "null_key")
                .increment(log.skipped_null_key as u64);
            counter!(self.log_rows_skipped_total, "table" => log.table.clone(), "reason" => "stale")
                .increment(log.skipped_stale as u64);
            gauge!(self.log_prior_rows, "table" => log.table.clone()).set(log.prior_rows as f64);
        }
    }

    /// Record how long a pipeline stage took
    pub fn record_stage(&self, stage: &str, duration: Duration) {
        histogram!(self.stage_duration, "stage" => stage.to_string()).record(duration.as_secs_f64());
    }

    /// Record tables handed to a sink
    pub fn record_tables_written(&self, sink: &str, count: usize) {
        counter!(self.tables_written_total, "sink" => sink.to_string()).increment(count as u64);
    }

    /// Record error metrics
    pub fn record_error(&self, error_type: &str, operation: &str) {
        counter!(self.errors_total, "type" => error_type.to_string(), "operation" => operation.to_string()).increment(1);
    }
}

/// Times a stage and records it on `finish`
pub struct MetricsTimer {
    collector: MetricsCollector,
    stage: String,
    start: std::time::Instant,
}

impl MetricsTimer {
    pub fn new(collector: MetricsCollector, stage: &str) -> Self {
        Self {
            collector,
            stage: stage.to_string(),
            start: std::time::Instant::now(),
        }
    }

    pub fn finish(self) -> Duration {
        let duration = self.start.elapsed();
        self.collector.record_stage(&self.stage, duration);
        duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::default();
        assert_eq!(collector.raw_rows_total, "playlist_history_raw_rows_total");
        assert!(collector.stage_duration.ends_with("_seconds"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let collector = MetricsCollector::default();
        collector.record_run("playlist_youtube", &RunSummary::default());
        collector.record_error("database", "write");
        let timer = MetricsTimer::new(collector, "enrich");
        assert!(timer.finish() < Duration::from_secs(60));
    }
}
