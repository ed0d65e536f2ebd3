// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::sync::atomic::{AtomicU64, Ordering};

/// Result of comparing two component IDs
///
/// Component IDs are only partially ordered: two IDs whose ranges overlap
/// (e.g. because one of them was produced by a merge) cannot be ordered
/// and compare as [`IdCompareResult::Unknown`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IdCompareResult {
    /// `a` is older than `b`
    LessThan,

    /// `a` and `b` are the same component
    Equal,

    /// `a` is newer than `b`
    GreaterThan,

    /// Cannot be decided from the IDs alone
    Unknown,
}

/// Identity of a component
///
/// A flushed component has `min == max`. A merged component covers the union
/// of its inputs' ranges. Leveled merges produce several outputs with the same
/// range; those are told apart by `partition`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ComponentId {
    /// Lowest flush ID contained in this component
    pub min: u64,

    /// Highest flush ID contained in this component
    pub max: u64,

    /// Output number inside a leveled merge, 0 otherwise
    pub partition: u32,
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.partition == 0 {
            write!(f, "[{}, {}]", self.min, self.max)
        } else {
            write!(f, "[{}, {}]#{}", self.min, self.max, self.partition)
        }
    }
}

impl ComponentId {
    /// Creates the ID of a freshly flushed component.
    #[must_use]
    pub fn single(id: u64) -> Self {
        Self {
            min: id,
            max: id,
            partition: 0,
        }
    }

    /// Creates an ID covering `min..=max`.
    ///
    /// # Panics
    ///
    /// Panics if `min > max`.
    #[must_use]
    pub fn range(min: u64, max: u64) -> Self {
        assert!(min <= max, "component id range should not be inverted");

        Self {
            min,
            max,
            partition: 0,
        }
    }

    /// Returns the same range with another partition number.
    #[must_use]
    pub fn with_partition(mut self, partition: u32) -> Self {
        self.partition = partition;
        self
    }

    /// Computes the ID covering all given IDs.
    ///
    /// Returns `None` if `ids` is empty.
    pub fn union<'a, I: IntoIterator<Item = &'a Self>>(ids: I) -> Option<Self> {
        ids.into_iter().fold(None, |acc, id| match acc {
            None => Some(Self::range(id.min, id.max)),
            Some(acc) => Some(Self::range(acc.min.min(id.min), acc.max.max(id.max))),
        })
    }

    /// Returns `true` if `other`'s range lies fully inside this range.
    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        self.min <= other.min && other.max <= self.max
    }

    /// Compares two IDs, see [`IdCompareResult`].
    #[must_use]
    pub fn compare(&self, other: &Self) -> IdCompareResult {
        if self.min == other.min && self.max == other.max {
            if self.partition == other.partition {
                IdCompareResult::Equal
            } else {
                IdCompareResult::Unknown
            }
        } else if self.min > other.max {
            IdCompareResult::GreaterThan
        } else if self.max < other.min {
            IdCompareResult::LessThan
        } else {
            IdCompareResult::Unknown
        }
    }
}

/// Hands out monotonically increasing flush IDs
#[derive(Debug, Default)]
pub struct ComponentIdGenerator(AtomicU64);

impl ComponentIdGenerator {
    /// Returns the next ID.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel)
    }

    /// Makes sure the next ID is strictly greater than `seen`.
    pub fn observe(&self, seen: u64) {
        self.0.fetch_max(seen + 1, Ordering::AcqRel);
    }

    /// Returns the next ID without consuming it.
    pub fn peek(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}
