// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::LsmIndex;
use crate::{
    component::{ComponentId, ComponentTarget, DiskComponent, MemoryComponent},
    file_manager::FileManager,
    operation::{IndexOperation, OperationContext},
    value::Slice,
};
use std::sync::Arc;

/// Hooks implemented by a concrete index kind
///
/// The lifecycle, scheduling and installation logic of [`LsmIndex`] is
/// shared; a variant decides how components are written.
pub trait IndexVariant: Send + Sync {
    /// Name of the index kind, used in logs and `Display`
    fn name(&self) -> &'static str;

    /// Creates a fresh operation context.
    fn create_op_context(&self, operation: IndexOperation) -> OperationContext {
        OperationContext::new(operation)
    }

    /// Writes the contents of a memory component into a new disk component.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn do_flush(
        &self,
        index: &LsmIndex,
        component: &MemoryComponent,
        target: &ComponentTarget,
    ) -> crate::Result<Arc<DiskComponent>>;

    /// Merges `inputs` (newest first) into a single component.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn do_merge(
        &self,
        index: &LsmIndex,
        inputs: &[Arc<DiskComponent>],
        target: &ComponentTarget,
        drop_tombstones: bool,
    ) -> crate::Result<Arc<DiskComponent>>;

    /// Merges `inputs` (newest first) into up to `targets.len()` components
    /// with disjoint key ranges.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn do_leveled_merge(
        &self,
        index: &LsmIndex,
        inputs: &[Arc<DiskComponent>],
        targets: &[ComponentTarget],
    ) -> crate::Result<Vec<Arc<DiskComponent>>>;

    /// Output of a merge spanning `first` (newest) to `last` (oldest).
    fn merge_file_references(
        &self,
        file_manager: &dyn FileManager,
        first: &DiskComponent,
        last: &DiskComponent,
    ) -> ComponentTarget {
        let id = ComponentId::range(last.id().min.min(first.id().min), first.id().max.max(last.id().max));
        let level = first.level().max(last.level());

        ComponentTarget {
            id,
            level,
            files: file_manager.file_references(id, level),
        }
    }

    /// Outputs of a leveled merge; all outputs share the ID range of the
    /// inputs and differ in partition.
    fn leveled_merge_file_references(
        &self,
        file_manager: &dyn FileManager,
        to_be_merged: &[Arc<DiskComponent>],
        picked_from_prev_level: &[Arc<DiskComponent>],
        dest_level: usize,
        output_count: usize,
    ) -> Vec<ComponentTarget> {
        let ids = to_be_merged
            .iter()
            .chain(picked_from_prev_level)
            .map(|c| c.id())
            .collect::<Vec<_>>();

        let Some(id) = ComponentId::union(&ids) else {
            return vec![];
        };

        (0..output_count.max(1))
            .map(|partition| {
                #[allow(clippy::cast_possible_truncation)]
                let id = id.with_partition(partition as u32);

                ComponentTarget {
                    id,
                    level: dest_level,
                    files: file_manager.file_references(id, dest_level),
                }
            })
            .collect()
    }

    /// Key range covered by the components of a level.
    fn compute_range_of_level(&self, level: &[Arc<DiskComponent>]) -> Option<(Slice, Slice)> {
        level
            .iter()
            .filter_map(|c| c.key_range())
            .reduce(|(min, max), (lo, hi)| (min.min(lo), max.max(hi)))
    }
}
