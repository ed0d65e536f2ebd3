// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{variant::IndexVariant, LsmIndex};
use crate::{
    component::{ComponentTarget, DiskComponent, FilterManager, MemoryComponent},
    run::{RunWriteOptions, SortedRun},
    value::{Entry, Slice, UserKey},
};
use std::{collections::BTreeMap, sync::Arc};

/// Index kind storing each disk component as a [`SortedRun`]
#[derive(Debug, Default)]
pub struct SortedRunVariant;

/// Resolves `inputs` (newest first) into a single sorted list, newest version
/// of each key winning.
pub(crate) fn merge_entries(inputs: &[Arc<DiskComponent>], drop_tombstones: bool) -> Vec<Entry> {
    let mut merged: BTreeMap<UserKey, Entry> = BTreeMap::new();

    for component in inputs {
        for entry in component.run().entries() {
            merged
                .entry(entry.key.clone())
                .or_insert_with(|| entry.clone());
        }
    }

    merged
        .into_values()
        .filter(|x| !(drop_tombstones && x.is_tombstone()))
        .collect()
}

pub(crate) fn compute_filter(manager: Option<&FilterManager>, entries: &[Entry]) -> Option<(Slice, Slice)> {
    let manager = manager?;

    entries
        .iter()
        .filter_map(|x| manager.extract(x))
        .fold(None, |acc, value| match acc {
            None => Some((value.clone(), value)),
            Some((min, max)) => Some((min.min(value.clone()), max.max(value))),
        })
}

impl SortedRunVariant {
    fn write(
        index: &LsmIndex,
        target: &ComponentTarget,
        entries: Vec<Entry>,
        filter: Option<(Slice, Slice)>,
    ) -> crate::Result<Arc<DiskComponent>> {
        log::trace!(
            "writing {} entries into component {} (L{})",
            entries.len(),
            target.id,
            target.level
        );

        SortedRun::write(
            index.buffer_cache().as_ref(),
            &target.files,
            entries,
            &RunWriteOptions {
                bloom_filter_fp_rate: index.bloom_filter_fp_rate(),
                durable: index.is_durable(),
                filter,
            },
        )?;

        if index.is_durable() {
            index.file_manager().sync()?;
        }

        index.component_factory().create_component(target.clone())
    }
}

impl IndexVariant for SortedRunVariant {
    fn name(&self) -> &'static str {
        "SortedRunIndex"
    }

    fn do_flush(
        &self,
        index: &LsmIndex,
        component: &MemoryComponent,
        target: &ComponentTarget,
    ) -> crate::Result<Arc<DiskComponent>> {
        Self::write(
            index,
            target,
            component.entries(),
            component.filter().bounds(),
        )
    }

    fn do_merge(
        &self,
        index: &LsmIndex,
        inputs: &[Arc<DiskComponent>],
        target: &ComponentTarget,
        drop_tombstones: bool,
    ) -> crate::Result<Arc<DiskComponent>> {
        let entries = merge_entries(inputs, drop_tombstones);
        let filter = compute_filter(index.filter_manager(), &entries);
        Self::write(index, target, entries, filter)
    }

    fn do_leveled_merge(
        &self,
        index: &LsmIndex,
        inputs: &[Arc<DiskComponent>],
        targets: &[ComponentTarget],
    ) -> crate::Result<Vec<Arc<DiskComponent>>> {
        let entries = merge_entries(inputs, false);

        let groups = targets.len().min(entries.len()).max(1);
        let len = entries.len();

        let mut outputs = Vec::with_capacity(groups);
        let mut entries = entries.into_iter();

        for (i, target) in targets.iter().take(groups).enumerate() {
            let end = (i + 1) * len / groups;
            let start = i * len / groups;

            let chunk = entries.by_ref().take(end - start).collect::<Vec<_>>();
            let filter = compute_filter(index.filter_manager(), &chunk);

            outputs.push(Self::write(index, target, chunk, filter)?);
        }

        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{component::ComponentId, merge_policy::fixture::component};
    use test_log::test;

    #[test]
    fn merge_entries_newest_wins() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;

        let newer = component(folder.path(), ComponentId::single(1), 0, &["a", "c"])?;
        let older = component(folder.path(), ComponentId::single(0), 0, &["a", "b"])?;

        let merged = merge_entries(&[newer, older], false);
        let keys = merged.iter().map(|x| x.key.clone()).collect::<Vec<_>>();
        assert_eq!(
            vec![Slice::from("a"), Slice::from("b"), Slice::from("c")],
            keys
        );

        Ok(())
    }

    #[test]
    fn compute_filter_bounds() {
        let manager = FilterManager::default();
        let entries = vec![Entry::new("b", "1"), Entry::new("a", "2"), Entry::new("d", "3")];

        assert_eq!(
            Some((Slice::from("a"), Slice::from("d"))),
            compute_filter(Some(&manager), &entries)
        );
        assert_eq!(None, compute_filter(None, &entries));
        assert_eq!(None, compute_filter(Some(&manager), &[]));
    }
}
