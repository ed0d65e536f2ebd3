// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Contains merge policies

mod constant;
mod leveled;

pub use constant::ConstantMergePolicy;
pub use leveled::LeveledPartitioningPolicy;

use crate::component::DiskComponent;
use std::sync::Arc;

/// What the policy sees of the index
pub struct PolicyView<'a> {
    /// Disk components, newest first
    pub disk_components: &'a [Arc<DiskComponent>],

    /// Disk components bucketed by level, if the index is leveled
    pub levels: Option<&'a [Vec<Arc<DiskComponent>>]>,

    /// Desired size of merge outputs in bytes
    pub target_component_size: u64,
}

impl PolicyView<'_> {
    /// Returns `true` if any component of the level is a merge input.
    #[must_use]
    pub fn is_level_busy(&self, level: usize) -> bool {
        self.levels
            .and_then(|levels| levels.get(level))
            .is_some_and(|level| level.iter().any(|c| c.is_merging()))
    }

    /// Returns `true` if any disk component is a merge input.
    #[must_use]
    pub fn is_merging(&self) -> bool {
        self.disk_components.iter().any(|c| c.is_merging())
    }
}

/// Describes what to do (merge or not)
#[derive(Debug)]
pub enum MergeDecision {
    /// Just do nothing
    DoNothing,

    /// Merges the components into a single one
    Merge(Vec<Arc<DiskComponent>>),

    /// Merges components of a level with the overlapping components of the next level
    LeveledMerge {
        /// Components picked from the upper level
        from_prev_level: Vec<Arc<DiskComponent>>,

        /// Overlapping components of the destination level
        to_be_merged: Vec<Arc<DiskComponent>>,

        /// Level the outputs go to
        dest_level: usize,
    },

    /// Deletes the components without writing anything
    DeleteComponents(Vec<Arc<DiskComponent>>),
}

/// Trait for a merge policy
///
/// The policy receives a view of the disk components
/// and emits a decision on what to do
#[allow(clippy::module_name_repetitions)]
pub trait MergePolicy: Send + Sync {
    /// Policy name, used in logs
    fn name(&self) -> &'static str;

    /// Deepest level, if the policy organizes components in levels
    fn max_level(&self) -> Option<usize> {
        None
    }

    /// Decides on what to do based on the current disk components
    fn choose(&self, view: &PolicyView<'_>) -> MergeDecision;
}

/// Never merges
#[derive(Debug, Default)]
pub struct NoMergePolicy;

impl MergePolicy for NoMergePolicy {
    fn name(&self) -> &'static str {
        "NoMergePolicy"
    }

    fn choose(&self, _: &PolicyView<'_>) -> MergeDecision {
        MergeDecision::DoNothing
    }
}

#[cfg(test)]
pub(crate) mod fixture {
    use crate::{
        buffer_cache::FileBufferCache,
        component::{ComponentFileReferences, ComponentId, ComponentTarget, DiskComponent, FileReference},
        run::{RunWriteOptions, SortedRun},
        value::Entry,
    };
    use std::{path::Path, sync::Arc};

    pub fn component(
        folder: &Path,
        id: ComponentId,
        level: usize,
        keys: &[&str],
    ) -> crate::Result<Arc<DiskComponent>> {
        let cache = Arc::new(FileBufferCache::new());
        let name = format!("{}_{}_{}_{level}", id.min, id.max, id.partition);

        let files = ComponentFileReferences {
            insert_index: FileReference::new(folder.join(format!("{name}.run"))),
            delete_index: Some(FileReference::new(folder.join(format!("{name}.del")))),
            bloom_filter: Some(FileReference::new(folder.join(format!("{name}.bf")))),
        };

        let mut keys = keys.to_vec();
        keys.sort_unstable();

        let run = SortedRun::write(
            cache.as_ref(),
            &files,
            keys.into_iter().map(|k| Entry::new(k, "v")),
            &RunWriteOptions {
                bloom_filter_fp_rate: 0.01,
                durable: false,
                filter: None,
            },
        )?;

        Ok(Arc::new(DiskComponent::new(
            ComponentTarget { id, level, files },
            run,
            cache,
        )))
    }
}
