//! Interval value module
//!
//! This module defines half-open ranges of instants with explicit closure at
//! either end. Intervals are produced by period rollforward/rollback and
//! consumed by historical conditions as evaluation windows.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::TimeError;

/// Which ends of an interval include their boundary instant
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Closed {
    /// Left boundary included, right excluded
    Left,
    /// Right boundary included, left excluded
    Right,
    /// Both boundaries included
    Both,
    /// Neither boundary included
    Neither,
}

/// A range of instants `[left, right]` with explicit closure
///
/// Periods hand out intervals as occurrence windows. The convention across
/// the time domain is left-closed, right-open occurrences; sliding windows
/// (`Period::delta`) are closed on both ends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Interval {
    /// Earlier boundary instant
    left: NaiveDateTime,
    /// Later boundary instant
    right: NaiveDateTime,
    /// Which boundaries include their instant
    closed: Closed,
}

impl Interval {
    /// Creates an interval, validating boundary ordering
    ///
    /// # Arguments
    ///
    /// * `left` - The earlier boundary
    /// * `right` - The later boundary
    /// * `closed` - Which boundaries include their instant
    ///
    /// # Returns
    ///
    /// A new Interval
    ///
    /// # Errors
    ///
    /// Returns `TimeError::InvalidInterval` when `left > right`.
    pub fn new(left: NaiveDateTime, right: NaiveDateTime, closed: Closed) -> Result<Self, TimeError> {
        if left > right {
            return Err(TimeError::InvalidInterval { left, right });
        }
        Ok(Self { left, right, closed })
    }

    /// Internal constructor for boundaries already known to be ordered
    pub(crate) fn span(left: NaiveDateTime, right: NaiveDateTime, closed: Closed) -> Self {
        debug_assert!(left <= right);
        Self { left, right, closed }
    }

    /// Returns the earlier boundary
    ///
    /// # Returns
    ///
    /// The left boundary instant
    pub fn left(&self) -> NaiveDateTime {
        self.left
    }

    /// Returns the later boundary
    ///
    /// # Returns
    ///
    /// The right boundary instant
    pub fn right(&self) -> NaiveDateTime {
        self.right
    }

    /// Returns the closure of the boundaries
    ///
    /// # Returns
    ///
    /// Which boundaries include their instant
    pub fn closed(&self) -> Closed {
        self.closed
    }

    /// Checks whether an instant lies inside the interval
    ///
    /// # Arguments
    ///
    /// * `t` - The instant to test
    ///
    /// # Returns
    ///
    /// `true` if `t` lies inside, respecting closure
    pub fn contains(&self, t: NaiveDateTime) -> bool {
        let after_left = match self.closed {
            Closed::Left | Closed::Both => t >= self.left,
            Closed::Right | Closed::Neither => t > self.left,
        };
        let before_right = match self.closed {
            Closed::Right | Closed::Both => t <= self.right,
            Closed::Left | Closed::Neither => t < self.right,
        };
        after_left && before_right
    }

    fn overlaps(&self, other: &Interval) -> bool {
        self.left <= other.right && other.left <= self.right
    }

    /// Computes the set union of two intervals
    ///
    /// # Arguments
    ///
    /// * `other` - The interval to unite with
    ///
    /// # Returns
    ///
    /// One merged interval when the operands touch, otherwise the disjoint
    /// pair ordered by left boundary
    pub fn union(&self, other: &Interval) -> Vec<Interval> {
        if self.overlaps(other) {
            vec![Interval::span(
                self.left.min(other.left),
                self.right.max(other.right),
                self.closed,
            )]
        } else {
            let mut pair = vec![*self, *other];
            pair.sort_by_key(Interval::left);
            pair
        }
    }

    /// Computes the set intersection of two intervals
    ///
    /// # Arguments
    ///
    /// * `other` - The interval to intersect with
    ///
    /// # Returns
    ///
    /// The overlapping interval, or `None` when the operands are disjoint
    pub fn intersection(&self, other: &Interval) -> Option<Interval> {
        if self.overlaps(other) {
            Some(Interval::span(
                self.left.max(other.left),
                self.right.min(other.right),
                self.closed,
            ))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 8, 7)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_contains_respects_closure() {
        let iv = Interval::new(at(12, 30), at(12, 31), Closed::Left).unwrap();
        assert!(iv.contains(at(12, 30)));
        assert!(!iv.contains(at(12, 31)));

        let iv = Interval::new(at(12, 30), at(12, 31), Closed::Both).unwrap();
        assert!(iv.contains(at(12, 31)));

        let iv = Interval::new(at(12, 30), at(12, 31), Closed::Neither).unwrap();
        assert!(!iv.contains(at(12, 30)));
        assert!(!iv.contains(at(12, 31)));
    }

    #[test]
    fn test_invalid_ordering_rejected() {
        assert!(Interval::new(at(13, 0), at(12, 0), Closed::Left).is_err());
    }

    #[test]
    fn test_union_merges_overlapping() {
        let a = Interval::new(at(10, 0), at(11, 0), Closed::Left).unwrap();
        let b = Interval::new(at(10, 30), at(12, 0), Closed::Left).unwrap();
        let merged = a.union(&b);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].left(), at(10, 0));
        assert_eq!(merged[0].right(), at(12, 0));
    }

    #[test]
    fn test_union_keeps_disjoint_pair_ordered() {
        let a = Interval::new(at(14, 0), at(15, 0), Closed::Left).unwrap();
        let b = Interval::new(at(10, 0), at(11, 0), Closed::Left).unwrap();
        let pair = a.union(&b);
        assert_eq!(pair.len(), 2);
        assert_eq!(pair[0].left(), at(10, 0));
        assert_eq!(pair[1].left(), at(14, 0));
    }

    #[test]
    fn test_intersection() {
        let a = Interval::new(at(10, 0), at(11, 0), Closed::Left).unwrap();
        let b = Interval::new(at(10, 30), at(12, 0), Closed::Left).unwrap();
        let iv = a.intersection(&b).unwrap();
        assert_eq!(iv.left(), at(10, 30));
        assert_eq!(iv.right(), at(11, 0));

        let c = Interval::new(at(13, 0), at(14, 0), Closed::Left).unwrap();
        assert!(a.intersection(&c).is_none());
    }
}
