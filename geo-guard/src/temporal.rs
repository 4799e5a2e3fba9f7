//! Interval logic behind the code-overlap and parent-period checks.
//!
//! A validity period `[start, end]` is inclusive on both ends with day
//! granularity; an absent end means the entity is still valid. Two periods
//! where one ends on day `d` and the next starts on `d + 1` are adjacent:
//! they neither overlap nor leave a gap.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// A validity period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Interval {
    pub start: NaiveDate,
    /// Inclusive last day, `None` when open-ended
    pub end: Option<NaiveDate>,
}

impl Interval {
    pub fn new(start: NaiveDate, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn open(start: NaiveDate) -> Self {
        Self { start, end: None }
    }

    /// First day after the period, `None` when open-ended or at the end of
    /// the calendar.
    pub fn end_exclusive(&self) -> Option<NaiveDate> {
        self.end.and_then(|e| e.succ_opt())
    }

    fn ends_before(&self, day: NaiveDate) -> bool {
        self.end.is_some_and(|e| e < day)
    }

    /// Whether the two periods share at least one day.
    pub fn intersects(&self, other: &Interval) -> bool {
        !self.ends_before(other.start) && !other.ends_before(self.start)
    }

    /// Whether every day of `other` belongs to `self`.
    pub fn contains(&self, other: &Interval) -> bool {
        if other.start < self.start {
            return false;
        }
        match (self.end, other.end) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(mine), Some(theirs)) => theirs <= mine,
        }
    }

    /// Whether `next` starts on or before the day after `self` ends.
    fn touches(&self, next: &Interval) -> bool {
        match self.end {
            None => true,
            Some(end) => match end.succ_opt() {
                Some(after) => next.start <= after,
                None => true,
            },
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{}, {}]", self.start, end),
            None => write!(f, "[{}, open)", self.start),
        }
    }
}

/// A record reduced to what code-overlap detection needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodedPeriod {
    pub uri: String,
    pub code: String,
    pub interval: Interval,
}

/// Two records sharing a code with intersecting periods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeOverlap {
    pub code: String,
    /// The record starting first
    pub first: CodedPeriod,
    pub second: CodedPeriod,
}

/// Finds the first pair of records with the same code whose periods
/// intersect.
///
/// Codes are visited in lexical order; within a code, records are sorted by
/// start date (then uri) and only neighbours are compared. Comparing
/// neighbours is enough: if any two periods of a code intersect, some pair of
/// neighbours does too.
pub fn find_code_overlap(records: &[CodedPeriod]) -> Option<CodeOverlap> {
    let mut by_code: BTreeMap<&str, Vec<&CodedPeriod>> = BTreeMap::new();
    for record in records {
        by_code.entry(record.code.as_str()).or_default().push(record);
    }

    for (code, mut group) in by_code {
        group.sort_by(|a, b| {
            (a.interval.start, a.uri.as_str()).cmp(&(b.interval.start, b.uri.as_str()))
        });
        for pair in group.windows(2) {
            if pair[0].interval.intersects(&pair[1].interval) {
                return Some(CodeOverlap {
                    code: code.to_string(),
                    first: pair[0].clone(),
                    second: pair[1].clone(),
                });
            }
        }
    }
    None
}

fn sorted_indices(intervals: &[Interval]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..intervals.len()).collect();
    indices.sort_by_key(|&i| (intervals[i].start, intervals[i].end.is_none(), intervals[i].end));
    indices
}

/// Returns the indices of two intersecting intervals, if any. The first
/// index designates the interval starting first.
pub fn find_pairwise_overlap(intervals: &[Interval]) -> Option<(usize, usize)> {
    let order = sorted_indices(intervals);
    order
        .windows(2)
        .find(|pair| intervals[pair[0]].intersects(&intervals[pair[1]]))
        .map(|pair| (pair[0], pair[1]))
}

/// Merges intervals into maximal continuous pieces, adjacent periods included.
pub fn union(intervals: &[Interval]) -> Vec<Interval> {
    let mut merged: Vec<Interval> = Vec::new();
    for i in sorted_indices(intervals) {
        let next = intervals[i];
        match merged.last_mut() {
            Some(current) if current.touches(&next) => {
                current.end = match (current.end, next.end) {
                    (None, _) | (_, None) => None,
                    (Some(a), Some(b)) => Some(a.max(b)),
                };
            }
            _ => merged.push(next),
        }
    }
    merged
}

/// First uncovered span `[from, to]` between the union pieces, if any.
pub fn find_gap(intervals: &[Interval]) -> Option<(NaiveDate, NaiveDate)> {
    let pieces = union(intervals);
    pieces.windows(2).find_map(|pair| {
        let from = pair[0].end_exclusive()?;
        let to = pair[1].start.pred_opt()?;
        Some((from, to))
    })
}

/// Whether `child` lies within a single continuous piece of the union.
pub fn covers(intervals: &[Interval], child: &Interval) -> bool {
    union(intervals).iter().any(|piece| piece.contains(child))
}
