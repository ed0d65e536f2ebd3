// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{MergeDecision, MergePolicy, PolicyView};
use crate::{component::DiskComponent, value::UserKey};
use std::sync::Arc;

/// Leveled merge policy with range-partitioned levels
///
/// If a level reaches a threshold, parts of it are merged into overlapping
/// components in the next level, split into components of the target size.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct LeveledPartitioningPolicy {
    /// When the number of components in L0 reaches this threshold,
    /// they are merged into L1
    ///
    /// Default = 4
    l0_threshold: usize,

    /// Level size factor
    ///
    /// Each level Ln for n >= 1 can have up to ratio^n components
    ///
    /// Default = 10
    level_ratio: usize,

    max_level: usize,
}

impl LeveledPartitioningPolicy {
    /// Creates a policy with levels `0..=max_level`.
    #[must_use]
    pub fn new(max_level: usize) -> Self {
        Self {
            l0_threshold: 4,
            level_ratio: 10,
            max_level: max_level.max(1),
        }
    }

    /// Sets the number of L0 components triggering a merge into L1.
    #[must_use]
    pub fn l0_threshold(mut self, n: usize) -> Self {
        self.l0_threshold = n.max(1);
        self
    }

    /// Sets the level size factor.
    #[must_use]
    pub fn level_ratio(mut self, n: usize) -> Self {
        self.level_ratio = n.max(2);
        self
    }

    fn level_desired_size(&self, level: usize) -> usize {
        #[allow(clippy::cast_possible_truncation)]
        self.level_ratio.saturating_pow(level as u32)
    }
}

impl Default for LeveledPartitioningPolicy {
    fn default() -> Self {
        Self::new(6)
    }
}

fn get_key_range(components: &[Arc<DiskComponent>]) -> Option<(UserKey, UserKey)> {
    components
        .iter()
        .filter_map(|c| c.key_range())
        .reduce(|(min, max), (lo, hi)| (min.min(lo), max.max(hi)))
}

fn get_overlapping(
    level: &[Arc<DiskComponent>],
    range: Option<&(UserKey, UserKey)>,
) -> Vec<Arc<DiskComponent>> {
    let Some((min, max)) = range else {
        return vec![];
    };

    level
        .iter()
        .filter(|c| {
            c.key_range()
                .is_some_and(|(lo, hi)| lo <= *max && *min <= hi)
        })
        .cloned()
        .collect()
}

impl MergePolicy for LeveledPartitioningPolicy {
    fn name(&self) -> &'static str {
        "LeveledPartitioningPolicy"
    }

    fn max_level(&self) -> Option<usize> {
        Some(self.max_level)
    }

    fn choose(&self, view: &PolicyView<'_>) -> MergeDecision {
        let Some(levels) = view.levels else {
            return MergeDecision::DoNothing;
        };

        // NOTE: Deeper levels first, the last level has nowhere to go
        for level_index in (1..levels.len().saturating_sub(1)).rev() {
            let next_level_index = level_index + 1;

            if view.is_level_busy(level_index) || view.is_level_busy(next_level_index) {
                continue;
            }

            let Some(level) = levels.get(level_index) else {
                continue;
            };

            let overshoot = level
                .len()
                .saturating_sub(self.level_desired_size(level_index));

            if overshoot > 0 {
                let picked: Vec<_> = level.iter().rev().take(overshoot).cloned().collect();
                let range = get_key_range(&picked);

                let to_be_merged = levels
                    .get(next_level_index)
                    .map(|next| get_overlapping(next, range.as_ref()))
                    .unwrap_or_default();

                return MergeDecision::LeveledMerge {
                    from_prev_level: picked,
                    to_be_merged,
                    dest_level: next_level_index,
                };
            }
        }

        if view.is_level_busy(0) || view.is_level_busy(1) {
            return MergeDecision::DoNothing;
        }

        let Some(first_level) = levels.first() else {
            return MergeDecision::DoNothing;
        };

        if first_level.is_empty() || first_level.len() < self.l0_threshold {
            return MergeDecision::DoNothing;
        }

        let range = get_key_range(first_level);

        let to_be_merged = levels
            .get(1)
            .map(|next| get_overlapping(next, range.as_ref()))
            .unwrap_or_default();

        MergeDecision::LeveledMerge {
            from_prev_level: first_level.clone(),
            to_be_merged,
            dest_level: 1,
        }
    }
}
