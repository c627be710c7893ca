use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use playlist_history::config::AppConfig;
use playlist_history::ingestors::{ingestor_by_name, valid_ingestors};
use playlist_history::logging::{init_logging, LogFormat, OperationTimer};
use playlist_history::lookup::load_isrc_csv;
use playlist_history::metrics::MetricsCollector;
use playlist_history::source::{JsonRecordsSource, RowSource};
use playlist_history::{CsvTableWriter, NoHistory, Pipeline, RunOutput, SqliteStore, TableHistory, TableSink};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest one snapshot file
    Ingest {
        /// JSON file holding the raw records
        source_path: PathBuf,

        /// Ingestor to run, e.g. playlist_youtube
        ingestor_type: String,

        /// Output directory for CSV tables
        #[arg(short, long)]
        output_dir: Option<String>,

        /// SQLite database to load into
        #[arg(long)]
        database_url: Option<String>,

        /// Change log granularity
        #[arg(short, long)]
        granularity: Option<String>,

        /// Skip the relational store
        #[arg(long)]
        no_database: bool,

        /// Build log tables concurrently
        #[arg(long)]
        concurrent: bool,
    },
    /// Append a track CSV to the ISRC lookup table
    LoadIsrc {
        /// CSV file with track, artist and isrc columns
        csv_path: PathBuf,

        /// SQLite database to load into
        #[arg(long)]
        database_url: Option<String>,
    },
    /// List the available ingestors
    Ingestors,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration
    let mut config = AppConfig::load()?;
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    apply_overrides(&mut config, &cli.command);
    config.validate()?;

    // Initialize logging; the guard flushes the file log on exit
    let _guard = init_logging(
        Some(&config.logging.level),
        config.logging.file_path.as_deref().map(Path::new),
        LogFormat::parse(&config.logging.format)?,
    )?;

    info!("Starting playlist-history");
    let metrics = MetricsCollector::default();

    let result = match &cli.command {
        Commands::Ingest {
            source_path,
            ingestor_type,
            ..
        } => ingest(&config, &metrics, source_path, ingestor_type).await,
        Commands::LoadIsrc { csv_path, .. } => load_isrc(&config, &metrics, csv_path),
        Commands::Ingestors => {
            list_ingestors();
            Ok(())
        },
    };

    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }
    result
}

/// Fold command line flags into the loaded configuration
fn apply_overrides(config: &mut AppConfig, command: &Commands) {
    match command {
        Commands::Ingest {
            output_dir,
            database_url,
            granularity,
            no_database,
            concurrent,
            ..
        } => {
            if let Some(dir) = output_dir {
                config.pipeline.output_directory.clone_from(dir);
            }
            if let Some(url) = database_url {
                config.database.url.clone_from(url);
            }
            if let Some(granularity) = granularity {
                config.pipeline.granularity.clone_from(granularity);
            }
            if *no_database {
                config.database.enabled = false;
            }
            if *concurrent {
                config.pipeline.concurrent_log_builders = true;
            }
        },
        Commands::LoadIsrc { database_url, .. } => {
            if let Some(url) = database_url {
                config.database.url.clone_from(url);
            }
        },
        Commands::Ingestors => {},
    }
}

/// Run one ingestor over one snapshot and publish the results
async fn ingest(config: &AppConfig, metrics: &MetricsCollector, source_path: &Path, ingestor_type: &str) -> Result<()> {
    let timer = OperationTimer::new("ingest");

    let definition = ingestor_by_name(ingestor_type)?;
    let granularity = config.granularity()?;
    let source = JsonRecordsSource::new(source_path, &definition.timestamp_column);
    let pipeline = Pipeline::new(definition, granularity)?;

    let rows = source
        .read_rows()
        .with_context(|| format!("Failed to read {}", source_path.display()))?;

    let mut store = if config.database.enabled {
        Some(SqliteStore::open(&config.database.url).context("Failed to open relational store")?)
    } else {
        warn!("Relational store disabled; prior runs are not consulted");
        None
    };

    let output = {
        let history: &dyn TableHistory = match &store {
            Some(store) => store,
            None => &NoHistory,
        };
        if config.pipeline.concurrent_log_builders {
            pipeline.run_concurrent(&rows, history).await
        } else {
            pipeline.run(&rows, history)
        }
    };
    let output = output.inspect_err(|e| metrics.record_error(error_kind(e), "run"))?;

    publish(config, metrics, &output, store.as_mut())?;

    timer.finish();
    Ok(())
}

/// Write the CSV tables, then commit the run to the relational store
fn publish(config: &AppConfig, metrics: &MetricsCollector, output: &RunOutput, store: Option<&mut SqliteStore>) -> Result<()> {
    let tables = output.tables();
    let mut writer = CsvTableWriter::new(Path::new(&config.pipeline.output_directory))?;
    writer
        .write_tables(&tables)
        .inspect_err(|e| metrics.record_error(error_kind(e), "csv"))
        .context("Failed to write CSV tables")?;
    metrics.record_tables_written("csv", tables.len());

    if let Some(store) = store {
        let tables = output.storage_tables();
        store
            .write_tables(&tables)
            .inspect_err(|e| metrics.record_error(error_kind(e), "database"))
            .context("Failed to commit run")?;
        metrics.record_tables_written("database", tables.len());
    }

    let summary = &output.summary;
    info!(
        raw_rows = summary.enrichment.input_rows,
        enriched_rows = summary.enrichment.enriched_rows,
        intervals = summary.intervals,
        appended = summary.appended_rows(),
        "Ingest complete"
    );
    for log in &summary.logs {
        info!(
            table = %log.table,
            appended = log.appended_rows,
            prior = log.prior_rows,
            stale = log.skipped_stale,
            null_key = log.skipped_null_key,
            "Log table"
        );
    }
    Ok(())
}

/// Append the ISRC lookup CSV to the relational store
fn load_isrc(config: &AppConfig, metrics: &MetricsCollector, csv_path: &Path) -> Result<()> {
    let table = load_isrc_csv(csv_path).with_context(|| format!("Failed to read {}", csv_path.display()))?;
    let mut store = SqliteStore::open(&config.database.url).context("Failed to open relational store")?;
    store
        .write_tables(std::slice::from_ref(&table))
        .inspect_err(|e| metrics.record_error(error_kind(e), "database"))?;
    metrics.record_tables_written("database", 1);
    info!(rows = table.len(), "Loaded ISRC lookup");
    Ok(())
}

#[allow(clippy::print_stdout)]
fn list_ingestors() {
    for name in valid_ingestors() {
        println!("{name}");
    }
}

const fn error_kind(e: &playlist_history::PipelineError) -> &'static str {
    if e.is_configuration_error() {
        "configuration"
    } else {
        "io"
    }
}
