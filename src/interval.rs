//! Interval partitioning
//!
//! Splits the observed timestamp range into contiguous half-open buckets at a
//! fixed granularity. Only day buckets are implemented; any other granularity
//! is rejected rather than silently replaced.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Time-bucket size of a change log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Calendar days
    Day,
}

impl Granularity {
    /// Configuration name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
        }
    }

    /// Start of the bucket containing `ts`
    #[must_use]
    pub fn bucket_start(&self, ts: NaiveDateTime) -> NaiveDateTime {
        match self {
            Self::Day => ts.date().and_time(NaiveTime::MIN),
        }
    }

    /// Width of one bucket
    #[must_use]
    pub fn step(&self) -> Duration {
        match self {
            Self::Day => Duration::days(1),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Self::Day),
            other => Err(PipelineError::UnsupportedGranularity(other.to_string())),
        }
    }
}

/// Half-open time range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    /// Inclusive start
    pub start: NaiveDateTime,
    /// Exclusive end
    pub end: NaiveDateTime,
}

impl Interval {
    /// Whether `ts` falls inside this interval
    #[must_use]
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start <= ts && ts < self.end
    }
}

/// Ordered, gapless intervals covering an observed range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalSequence {
    granularity: Granularity,
    intervals: Vec<Interval>,
}

impl IntervalSequence {
    /// Buckets from the one containing `min` to the one containing `max`, inclusive.
    ///
    /// Empty buckets inside the range are kept.
    #[must_use]
    pub fn partition(min: NaiveDateTime, max: NaiveDateTime, granularity: Granularity) -> Self {
        let step = granularity.step();
        let mut intervals = Vec::new();
        let mut start = granularity.bucket_start(min);
        while start <= max {
            let Some(end) = start.checked_add_signed(step) else {
                break;
            };
            intervals.push(Interval { start, end });
            start = end;
        }
        Self { granularity, intervals }
    }

    /// Buckets covering every timestamp in `timestamps`; empty when there are none
    pub fn covering<I>(timestamps: I, granularity: Granularity) -> Self
    where
        I: IntoIterator<Item = NaiveDateTime>,
    {
        let range = timestamps.into_iter().fold(None, |range, ts| match range {
            None => Some((ts, ts)),
            Some((min, max)) => Some((ts.min(min), ts.max(max))),
        });
        match range {
            Some((min, max)) => Self::partition(min, max, granularity),
            None => Self::empty(granularity),
        }
    }

    /// A sequence with no intervals
    #[must_use]
    pub const fn empty(granularity: Granularity) -> Self {
        Self {
            granularity,
            intervals: Vec::new(),
        }
    }

    /// Granularity the sequence was partitioned at
    #[must_use]
    pub const fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Intervals in chronological order
    #[must_use]
    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// Number of intervals
    #[must_use]
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Whether there are no intervals
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Index of the interval containing `ts`
    #[must_use]
    pub fn locate(&self, ts: NaiveDateTime) -> Option<usize> {
        let idx = self.intervals.partition_point(|interval| interval.end <= ts);
        self.intervals
            .get(idx)
            .filter(|interval| interval.contains(ts))
            .map(|_| idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").expect("valid timestamp")
    }

    #[test]
    fn test_partition_spans_calendar_days_inclusive() {
        let seq = IntervalSequence::partition(ts("2022-05-19 12:00:00"), ts("2022-05-23 12:00:01"), Granularity::Day);
        assert_eq!(seq.len(), 5);
        assert_eq!(seq.intervals()[0].start, ts("2022-05-19 00:00:00"));
        assert_eq!(seq.intervals()[4].end, ts("2022-05-24 00:00:00"));
    }

    #[test]
    fn test_single_instant_gives_one_day() {
        let seq = IntervalSequence::partition(ts("2022-05-19 23:59:59"), ts("2022-05-19 23:59:59"), Granularity::Day);
        assert_eq!(seq.len(), 1);
    }

    #[test]
    fn test_empty_days_are_kept() {
        let seq = IntervalSequence::covering(vec![ts("2022-01-01 08:00:00"), ts("2022-01-10 08:00:00")], Granularity::Day);
        assert_eq!(seq.len(), 10);
    }

    #[test]
    fn test_no_timestamps_gives_empty_sequence() {
        let seq = IntervalSequence::covering(Vec::new(), Granularity::Day);
        assert!(seq.is_empty());
    }

    #[test]
    fn test_locate() {
        let seq = IntervalSequence::partition(ts("2022-05-19 12:00:00"), ts("2022-05-21 12:00:00"), Granularity::Day);
        assert_eq!(seq.locate(ts("2022-05-20 00:00:00")), Some(1));
        assert_eq!(seq.locate(ts("2022-05-19 23:59:59")), Some(0));
        assert_eq!(seq.locate(ts("2022-05-22 00:00:00")), None);
        assert_eq!(seq.locate(ts("2022-05-18 23:59:59")), None);
    }

    #[test]
    fn test_unsupported_granularity() {
        assert!(matches!("week".parse::<Granularity>(), Err(PipelineError::UnsupportedGranularity(g)) if g == "week"));
        assert_eq!("day".parse::<Granularity>().ok(), Some(Granularity::Day));
    }
}
