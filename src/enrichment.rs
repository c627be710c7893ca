//! Enrichment join
//!
//! Replaces the source-native keys of raw rows with surrogate IDs looked up in
//! the identifier registries, and projects the remaining attributes under
//! their output names. Required joins behave like inner joins and drop rows
//! whose key is null; optional joins behave like left joins and leave the
//! surrogate ID null.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::models::{Attributes, EnrichedRow, RawRow, Value};
use crate::registry::IdentifierRegistry;

/// How a missing mapping is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// The entity must exist; rows without a mapping are dropped
    Inner,
    /// The entity is optional; rows without a mapping keep a null ID
    Left,
}

/// Replace one source key with the surrogate ID from a registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    /// Registry (dimension table) to look the key up in
    pub registry: String,
    /// Raw row attribute holding the source key
    pub source_column: String,
    /// Enriched row attribute receiving the surrogate ID
    pub output_column: String,
    /// Inner or left
    pub kind: JoinKind,
}

/// Carry one raw attribute over, possibly renamed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    /// Raw row attribute
    pub source_column: String,
    /// Enriched row attribute
    pub output_column: String,
}

/// Joins and projections producing enriched rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentPlan {
    /// Surrogate ID lookups, applied in order
    pub joins: Vec<JoinSpec>,
    /// Attributes carried over unchanged
    pub projections: Vec<Projection>,
}

impl EnrichmentPlan {
    /// Empty plan
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required join
    #[must_use]
    pub fn inner_join(self, registry: &str, source_column: &str, output_column: &str) -> Self {
        self.join(registry, source_column, output_column, JoinKind::Inner)
    }

    /// Add an optional join
    #[must_use]
    pub fn left_join(self, registry: &str, source_column: &str, output_column: &str) -> Self {
        self.join(registry, source_column, output_column, JoinKind::Left)
    }

    fn join(mut self, registry: &str, source_column: &str, output_column: &str, kind: JoinKind) -> Self {
        self.joins.push(JoinSpec {
            registry: registry.to_string(),
            source_column: source_column.to_string(),
            output_column: output_column.to_string(),
            kind,
        });
        self
    }

    /// Carry `source_column` over as `output_column`
    #[must_use]
    pub fn project(mut self, source_column: &str, output_column: &str) -> Self {
        self.projections.push(Projection {
            source_column: source_column.to_string(),
            output_column: output_column.to_string(),
        });
        self
    }

    /// Every attribute an enriched row can carry
    #[must_use]
    pub fn output_columns(&self) -> Vec<&str> {
        self.joins
            .iter()
            .map(|j| j.output_column.as_str())
            .chain(self.projections.iter().map(|p| p.output_column.as_str()))
            .collect()
    }
}

/// Data-quality counts from one enrichment pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentStats {
    /// Raw rows seen
    pub input_rows: usize,
    /// Enriched rows produced
    pub enriched_rows: usize,
    /// Rows dropped because a required key was null
    pub dropped_null_required: usize,
    /// Rows dropped because a required key had no mapping
    pub dropped_unmapped_required: usize,
    /// Optional surrogate IDs left null, by output column
    pub absent_optional: BTreeMap<String, usize>,
    /// Enriched rows without an observation timestamp
    pub untimed_rows: usize,
}

/// Enriched rows and the counts gathered while producing them
#[derive(Debug, Clone, Default)]
pub struct Enrichment {
    /// One row per qualifying raw row, in input order
    pub rows: Vec<EnrichedRow>,
    /// Data-quality counts
    pub stats: EnrichmentStats,
}

/// Join `rows` against `registries` according to `plan`.
///
/// Every registry the plan names must be present; a missing one is a
/// configuration error and fails before any row is looked at.
pub fn enrich(
    rows: &[RawRow],
    plan: &EnrichmentPlan,
    registries: &BTreeMap<String, IdentifierRegistry>,
) -> Result<Enrichment> {
    let resolved = plan
        .joins
        .iter()
        .map(|join| {
            registries
                .get(&join.registry)
                .map(|registry| (join, registry))
                .ok_or_else(|| PipelineError::MissingRegistry(join.registry.clone()))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut stats = EnrichmentStats {
        input_rows: rows.len(),
        ..EnrichmentStats::default()
    };
    let mut enriched = Vec::with_capacity(rows.len());

    'rows: for (index, row) in rows.iter().enumerate() {
        let mut attributes = Attributes::new();

        for (join, registry) in &resolved {
            let value = match (row.get(&join.source_column), join.kind) {
                (Some(value), _) => value,
                (None, JoinKind::Left) => row.value(&join.source_column),
                (None, JoinKind::Inner) => {
                    return Err(PipelineError::MissingAttribute {
                        column: join.source_column.clone(),
                        row: index,
                    });
                },
            };
            let id = match value.to_key_part(&join.source_column)? {
                Some(key) => registry.lookup(&key),
                None if join.kind == JoinKind::Inner => {
                    debug!(row = index, column = %join.source_column, "Dropping row with null required key");
                    stats.dropped_null_required += 1;
                    continue 'rows;
                },
                None => None,
            };
            match (id, join.kind) {
                (Some(id), _) => {
                    attributes.insert(join.output_column.clone(), Value::Integer(id));
                },
                (None, JoinKind::Inner) => {
                    debug!(row = index, column = %join.source_column, "Dropping row with unmapped required key");
                    stats.dropped_unmapped_required += 1;
                    continue 'rows;
                },
                (None, JoinKind::Left) => {
                    *stats.absent_optional.entry(join.output_column.clone()).or_default() += 1;
                    attributes.insert(join.output_column.clone(), Value::Null);
                },
            }
        }

        for projection in &plan.projections {
            attributes.insert(projection.output_column.clone(), row.value(&projection.source_column).clone());
        }

        if row.observed_at.is_none() {
            stats.untimed_rows += 1;
        }
        enriched.push(EnrichedRow {
            attributes,
            observed_at: row.observed_at,
        });
    }

    stats.enriched_rows = enriched.len();
    Ok(Enrichment { rows: enriched, stats })
}
