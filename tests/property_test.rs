//! Property tests for registries, interval partitioning and change logs

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use playlist_history::changelog::ChangeLogBuilder;
use playlist_history::interval::IntervalSequence;
use playlist_history::models::{Attributes, EnrichedRow, KeyPart, RawRow, Value};
use playlist_history::registry::IdentifierRegistry;
use playlist_history::schema::{DimensionDefinition, LogTableDefinition};
use playlist_history::Granularity;
use proptest::prelude::*;

const FIVE_DAYS_IN_MINUTES: i64 = 5 * 24 * 60;

fn base() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2022, 5, 19)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .expect("valid base timestamp")
}

fn at(minutes: i64) -> NaiveDateTime {
    base() + Duration::minutes(minutes)
}

fn observation(entity: i64, minutes: i64, value: i64) -> EnrichedRow {
    let mut attributes = Attributes::new();
    attributes.insert("entity_id".to_string(), Value::Integer(entity));
    attributes.insert("value".to_string(), Value::Integer(value));
    EnrichedRow {
        attributes,
        observed_at: Some(at(minutes)),
    }
}

/// Per entity: the value selected in each day, consecutive repeats collapsed
fn expected_log(observations: &[(i64, i64, i64)]) -> BTreeMap<i64, Vec<(NaiveDateTime, i64)>> {
    let mut selected: BTreeMap<(i64, i64), (i64, i64)> = BTreeMap::new();
    for &(entity, minutes, value) in observations {
        let day = minutes / (24 * 60);
        selected
            .entry((entity, day))
            .and_modify(|current| {
                if minutes > current.0 {
                    *current = (minutes, value);
                }
            })
            .or_insert((minutes, value));
    }

    let mut expected: BTreeMap<i64, Vec<(NaiveDateTime, i64)>> = BTreeMap::new();
    for ((entity, _day), (minutes, value)) in selected {
        let versions = expected.entry(entity).or_default();
        if versions.last().is_none_or(|(_, last)| *last != value) {
            versions.push((at(minutes), value));
        }
    }
    expected
}

proptest! {
    #[test]
    fn prop_registry_is_deterministic(keys in prop::collection::vec(prop::option::of("[a-d]{1,3}"), 0..40)) {
        let definition = DimensionDefinition::new("channels", "channel_id", "source_id");
        let rows: Vec<RawRow> = keys
            .iter()
            .map(|key| RawRow::default().with("channel_id", key.clone()))
            .collect();

        let first = IdentifierRegistry::build(&definition, &rows).expect("build");
        let second = IdentifierRegistry::build(&definition, &rows).expect("build");
        prop_assert_eq!(first.rows(), second.rows());

        let mut distinct: Vec<String> = keys.iter().flatten().cloned().collect();
        distinct.sort();
        distinct.dedup();
        prop_assert_eq!(first.len(), distinct.len());
        for (index, key) in distinct.iter().enumerate() {
            let expected = i64::try_from(index).expect("small index") + 1;
            prop_assert_eq!(first.lookup(&KeyPart::Text(key.clone())), Some(expected));
        }
    }

    #[test]
    fn prop_intervals_are_contiguous(offsets in prop::collection::vec(0..FIVE_DAYS_IN_MINUTES * 3, 1..50)) {
        let timestamps: Vec<NaiveDateTime> = offsets.iter().map(|&m| at(m)).collect();
        let sequence = IntervalSequence::covering(timestamps.iter().copied(), Granularity::Day);

        for pair in sequence.intervals().windows(2) {
            prop_assert_eq!(pair[0].end, pair[1].start);
        }
        for ts in &timestamps {
            let containing = sequence.intervals().iter().filter(|interval| interval.contains(*ts)).count();
            prop_assert_eq!(containing, 1);
            prop_assert!(sequence.locate(*ts).is_some());
        }
    }

    #[test]
    fn prop_change_log_is_minimal_and_complete(
        observations in prop::collection::vec((0..3_i64, 0..FIVE_DAYS_IN_MINUTES, 0..3_i64), 0..60)
    ) {
        let rows: Vec<EnrichedRow> = observations
            .iter()
            .map(|&(entity, minutes, value)| observation(entity, minutes, value))
            .collect();
        let intervals = IntervalSequence::covering(rows.iter().filter_map(|row| row.observed_at), Granularity::Day);
        let definition = LogTableDefinition::new("value_log", &["entity_id"], &["value"]);
        let build = ChangeLogBuilder::new(definition, Granularity::Day)
            .build(&rows, &intervals)
            .expect("build");

        let mut actual: BTreeMap<i64, Vec<(NaiveDateTime, i64)>> = BTreeMap::new();
        for row in &build.rows {
            let (KeyPart::Integer(entity), Value::Integer(value)) = (&row.key[0], &row.tracked[0]) else {
                panic!("unexpected row shape");
            };
            actual.entry(*entity).or_default().push((row.ingest_timestamp, *value));
        }

        for versions in actual.values() {
            for pair in versions.windows(2) {
                prop_assert_ne!(pair[0].1, pair[1].1);
                prop_assert!(pair[0].0 < pair[1].0);
            }
        }
        prop_assert_eq!(actual, expected_log(&observations));
    }
}
