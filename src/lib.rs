//! Playlist History - Slowly Changing Dimension Ingestion
//!
//! A Rust library that turns periodic playlist crawl snapshots into
//! surrogate-keyed dimension tables and append-only change logs.
//!
//! # Features
//!
//! - Deterministic surrogate IDs per entity type, reused across runs
//! - Inner and left joins from source keys to surrogate IDs
//! - Day-granularity change logs that record only what changed
//! - CSV export and a transactional SQLite store
//! - Declarative ingestor definitions, one generic log builder

/// Change-detection log builder
pub mod changelog;
/// Configuration management
pub mod config;
/// Relational store
pub mod db;
/// Surrogate ID enrichment
pub mod enrichment;
/// Error types
pub mod error;
/// CSV export
pub mod file_writer;
/// Ingestor catalogue
pub mod ingestors;
/// Interval partitioning
pub mod interval;
/// Logging setup and utilities
pub mod logging;
/// ISRC lookup loading
pub mod lookup;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Run orchestration
pub mod pipeline;
/// Identifier registries
pub mod registry;
/// Collaborator traits
pub mod repository;
/// Table schema definitions
pub mod schema;
/// Raw snapshot readers
pub mod source;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use db::SqliteStore;
pub use error::{PipelineError, Result};
pub use file_writer::CsvTableWriter;
pub use interval::Granularity;
pub use models::{RawRow, Table, Value};
pub use pipeline::{Pipeline, RunOutput, RunSummary};
pub use repository::{NoHistory, TableHistory, TableSink};
