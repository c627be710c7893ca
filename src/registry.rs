//! Identifier registry
//!
//! Assigns a dense integer surrogate ID to every distinct non-null value of a
//! source key. Distinct values are numbered in sorted order, so the same input
//! always yields the same mapping regardless of row order. A registry can be
//! seeded with the mappings persisted by earlier runs; those IDs are kept and
//! only unseen keys are numbered, after the current maximum.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::Result;
use crate::models::{DimensionRow, KeyPart, RawRow, Table};
use crate::schema::DimensionDefinition;

/// Mapping from source key to surrogate ID for one entity type
#[derive(Debug, Clone)]
pub struct IdentifierRegistry {
    definition: DimensionDefinition,
    ids: BTreeMap<KeyPart, i64>,
    first_new_id: i64,
}

impl IdentifierRegistry {
    /// Build a fresh registry from the rows of this run
    pub fn build(definition: &DimensionDefinition, rows: &[RawRow]) -> Result<Self> {
        Self::build_with_prior(definition, rows, &[])
    }

    /// Build a registry that keeps the mappings in `prior`
    pub fn build_with_prior(definition: &DimensionDefinition, rows: &[RawRow], prior: &[DimensionRow]) -> Result<Self> {
        let mut ids = BTreeMap::new();
        for row in prior {
            ids.entry(row.natural_key.clone()).or_insert(row.id);
        }
        let first_new_id = prior.iter().map(|row| row.id).max().unwrap_or(0) + 1;

        let mut distinct = BTreeSet::new();
        for row in rows {
            if let Some(key) = row.value(&definition.source_column).to_key_part(&definition.source_column)? {
                distinct.insert(key);
            }
        }

        let mut next_id = first_new_id;
        for key in distinct {
            ids.entry(key).or_insert_with(|| {
                let id = next_id;
                next_id += 1;
                id
            });
        }

        debug!(
            registry = %definition.table,
            mappings = ids.len(),
            new_mappings = next_id - first_new_id,
            "Built identifier registry"
        );

        Ok(Self {
            definition: definition.clone(),
            ids,
            first_new_id,
        })
    }

    /// Registry name, the dimension table name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.table
    }

    /// Definition this registry was built from
    #[must_use]
    pub const fn definition(&self) -> &DimensionDefinition {
        &self.definition
    }

    /// Surrogate ID for a source key
    #[must_use]
    pub fn lookup(&self, key: &KeyPart) -> Option<i64> {
        self.ids.get(key).copied()
    }

    /// Number of mappings, including seeded ones
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the registry holds no mappings
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Every mapping, ordered by surrogate ID
    #[must_use]
    pub fn rows(&self) -> Vec<DimensionRow> {
        let mut rows: Vec<DimensionRow> = self
            .ids
            .iter()
            .map(|(key, id)| DimensionRow {
                id: *id,
                source: self.definition.source.clone(),
                natural_key: key.clone(),
            })
            .collect();
        rows.sort_by_key(|row| row.id);
        rows
    }

    /// Mappings assigned by this run, ordered by surrogate ID
    #[must_use]
    pub fn new_rows(&self) -> Vec<DimensionRow> {
        self.rows()
            .into_iter()
            .filter(|row| row.id >= self.first_new_id)
            .collect()
    }

    /// Dimension table holding the mappings assigned by this run
    #[must_use]
    pub fn to_table(&self) -> Table {
        self.definition.to_table(&self.new_rows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;

    fn rows(keys: &[Option<&str>]) -> Vec<RawRow> {
        keys.iter()
            .map(|k| RawRow::new(None).with("channel_id", Value::from(*k)))
            .collect()
    }

    fn definition() -> DimensionDefinition {
        DimensionDefinition::new("users", "channel_id", "source_id").sourced_from("youtube")
    }

    #[test]
    fn test_nulls_are_never_assigned() {
        let registry = IdentifierRegistry::build(&definition(), &rows(&[Some("b"), None, Some("a"), Some("b")]))
            .expect("build registry");
        assert_eq!(registry.len(), 2);
        assert!(registry.rows().iter().all(|row| row.natural_key != KeyPart::Text(String::new())));
    }

    #[test]
    fn test_assignment_ignores_row_order() {
        let forward = IdentifierRegistry::build(&definition(), &rows(&[Some("x"), Some("y"), Some("z")]))
            .expect("build registry");
        let backward = IdentifierRegistry::build(&definition(), &rows(&[Some("z"), Some("y"), Some("x")]))
            .expect("build registry");
        assert_eq!(forward.rows(), backward.rows());
    }

    #[test]
    fn test_ids_are_dense_and_unique() {
        let registry = IdentifierRegistry::build(&definition(), &rows(&[Some("c"), Some("a"), Some("b")]))
            .expect("build registry");
        let ids: Vec<i64> = registry.rows().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_prior_mappings_are_kept() {
        let prior = vec![DimensionRow {
            id: 7,
            source: Some("youtube".into()),
            natural_key: KeyPart::Text("m".into()),
        }];
        let registry = IdentifierRegistry::build_with_prior(&definition(), &rows(&[Some("m"), Some("a")]), &prior)
            .expect("build registry");
        assert_eq!(registry.lookup(&KeyPart::Text("m".into())), Some(7));
        assert_eq!(registry.lookup(&KeyPart::Text("a".into())), Some(8));
        let new_rows = registry.new_rows();
        assert_eq!(new_rows.len(), 1);
        assert_eq!(new_rows[0].natural_key, KeyPart::Text("a".into()));
    }

    #[test]
    fn test_float_source_key_is_rejected() {
        let rows = vec![RawRow::new(None).with("channel_id", 1.5_f64)];
        assert!(IdentifierRegistry::build(&definition(), &rows).is_err());
    }
}
