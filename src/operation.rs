// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    component::{Component, DiskComponent},
    value::UserKey,
};
use std::{ops::Bound, sync::Arc};

/// Kind of operation executed against an index
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[allow(clippy::module_name_repetitions)]
pub enum IndexOperation {
    /// Insert a new entry
    Insert,

    /// Update an existing entry
    Update,

    /// Write a tombstone
    Delete,

    /// Insert or update
    Upsert,

    /// Remove an entry from the memory component without leaving a tombstone
    PhysicalDelete,

    /// Point or range search
    Search,

    /// Flush a memory component
    Flush,

    /// Drop the contents of a memory component without writing it out
    DeleteMemoryComponent,

    /// Merge disk components
    Merge,

    /// Remove disk components without producing a merged component
    DeleteDiskComponents,

    /// Merge all disk components
    FullMerge,

    /// Scan all disk components (primary indexes only)
    DiskComponentScan,

    /// Replicate disk components
    Replicate,

    /// Index creation, never routed through component selection
    Create,

    /// Raw disk order scan, not supported by the LSM core
    DiskOrderScan,

    /// Placeholder operation
    NoOp,
}

impl std::fmt::Display for IndexOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl IndexOperation {
    /// Returns `true` if the operation writes into the current mutable component.
    #[must_use]
    pub fn is_modification(self) -> bool {
        matches!(
            self,
            Self::Insert | Self::Update | Self::Delete | Self::Upsert | Self::PhysicalDelete
        )
    }
}

/// Kind of IO operation reported to callbacks
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum IoOperationType {
    /// Memory component flush
    Flush,

    /// Disk component merge
    Merge,

    /// Bulk load
    Load,

    /// Replication
    Replicate,

    /// Nothing
    NoOp,
}

impl std::fmt::Display for IoOperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Key range and filter bounds of a search
#[derive(Clone, Debug)]
pub struct SearchPredicate {
    /// Lower key bound
    pub low: Bound<UserKey>,

    /// Upper key bound
    pub high: Bound<UserKey>,

    /// Lower filter bound, used to prune disk components
    pub min_filter: Option<UserKey>,

    /// Upper filter bound, used to prune disk components
    pub max_filter: Option<UserKey>,
}

impl Default for SearchPredicate {
    fn default() -> Self {
        Self::all()
    }
}

impl SearchPredicate {
    /// Matches all keys.
    #[must_use]
    pub fn all() -> Self {
        Self {
            low: Bound::Unbounded,
            high: Bound::Unbounded,
            min_filter: None,
            max_filter: None,
        }
    }

    /// Matches a single key.
    pub fn point<K: Into<UserKey>>(key: K) -> Self {
        let key = key.into();

        Self {
            low: Bound::Included(key.clone()),
            high: Bound::Included(key),
            min_filter: None,
            max_filter: None,
        }
    }

    /// Matches keys inside the given bounds.
    #[must_use]
    pub fn range(low: Bound<UserKey>, high: Bound<UserKey>) -> Self {
        Self {
            low,
            high,
            min_filter: None,
            max_filter: None,
        }
    }

    /// Sets the filter bounds used to prune disk components.
    #[must_use]
    pub fn with_filter(mut self, min: Option<UserKey>, max: Option<UserKey>) -> Self {
        self.min_filter = min;
        self.max_filter = max;
        self
    }

    /// Returns `true` if `key` lies inside the key bounds.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        let above_low = match &self.low {
            Bound::Included(low) => key >= &**low,
            Bound::Excluded(low) => key > &**low,
            Bound::Unbounded => true,
        };

        let below_high = match &self.high {
            Bound::Included(high) => key <= &**high,
            Bound::Excluded(high) => key < &**high,
            Bound::Unbounded => true,
        };

        above_low && below_high
    }
}

/// Per-operation state handed through selection, flush and merge
///
/// The component holder is filled by
/// [`LsmIndex::get_operational_components`](crate::LsmIndex::get_operational_components).
#[derive(Clone, Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct OperationContext {
    /// Operation kind
    pub operation: IndexOperation,

    /// Components the operation has to see, newest first
    pub component_holder: Vec<Component>,

    /// Merge inputs (next-level victims in leveled merges)
    pub components_to_be_merged: Vec<Arc<DiskComponent>>,

    /// Leveled merge inputs picked from the previous level
    pub component_picked_to_be_merged_from_prev_level: Vec<Arc<DiskComponent>>,

    /// Components to replicate
    pub components_to_be_replicated: Vec<Arc<DiskComponent>>,

    /// Search bounds
    pub search_predicate: Option<SearchPredicate>,

    /// Snapshot of the current mutable component index taken during selection
    pub current_mutable_component_id: usize,

    /// IO operation type reported to callbacks
    pub io_operation_type: IoOperationType,

    /// Destination level of a leveled merge
    pub dest_level: usize,
}

impl OperationContext {
    /// Creates an empty context for the given operation.
    #[must_use]
    pub fn new(operation: IndexOperation) -> Self {
        Self {
            operation,
            component_holder: Vec::new(),
            components_to_be_merged: Vec::new(),
            component_picked_to_be_merged_from_prev_level: Vec::new(),
            components_to_be_replicated: Vec::new(),
            search_predicate: None,
            current_mutable_component_id: 0,
            io_operation_type: IoOperationType::NoOp,
            dest_level: 0,
        }
    }

    /// Sets the search predicate.
    #[must_use]
    pub fn with_predicate(mut self, predicate: SearchPredicate) -> Self {
        self.search_predicate = Some(predicate);
        self
    }

    /// Returns the disk components in the holder.
    pub fn disk_components(&self) -> impl Iterator<Item = &Arc<DiskComponent>> + '_ {
        self.component_holder.iter().filter_map(Component::as_disk)
    }

    /// Resets the context so it can be reused for another operation.
    pub fn reset(&mut self, operation: IndexOperation) {
        self.operation = operation;
        self.component_holder.clear();
        self.components_to_be_merged.clear();
        self.component_picked_to_be_merged_from_prev_level.clear();
        self.components_to_be_replicated.clear();
        self.search_predicate = None;
        self.io_operation_type = IoOperationType::NoOp;
        self.dest_level = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn operation_is_modification() {
        assert!(IndexOperation::Insert.is_modification());
        assert!(IndexOperation::PhysicalDelete.is_modification());
        assert!(!IndexOperation::Search.is_modification());
        assert!(!IndexOperation::Flush.is_modification());
    }

    #[test]
    fn search_predicate_bounds() {
        let pred = SearchPredicate::range(
            Bound::Included("b".into()),
            Bound::Excluded("d".into()),
        );

        assert!(!pred.contains(b"a"));
        assert!(pred.contains(b"b"));
        assert!(pred.contains(b"c"));
        assert!(!pred.contains(b"d"));

        assert!(SearchPredicate::all().contains(b"anything"));
        assert!(SearchPredicate::point("x").contains(b"x"));
        assert!(!SearchPredicate::point("x").contains(b"xy"));
    }
}
