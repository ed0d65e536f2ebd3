// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Data-plane entry points of an index
//!
//! A harness admits writers into the current mutable component, pins
//! components for readers, drains the flush queue and installs merge outputs.

mod classic;
mod external;
mod leveled;

pub use classic::LsmHarness;
pub use external::ExternalHarness;
pub use leveled::LeveledHarness;

use crate::{
    callback::IoOperationCallback,
    component::{Component, DiskComponent, DiskComponentState},
    error::ErrorCode,
    index::IndexInner,
    io::IoOperation,
    merge_policy::{MergeDecision, MergePolicy, PolicyView},
    operation::{IndexOperation, OperationContext, SearchPredicate},
    tracker::OperationTracker,
    value::{Entry, UserKey},
    Error, LsmIndex,
};
use std::{
    collections::BTreeMap,
    sync::{Arc, Weak},
};

pub(crate) fn create(
    index: Weak<IndexInner>,
    external: bool,
    leveled: bool,
    tracker: Arc<dyn OperationTracker>,
    merge_policy: Arc<dyn MergePolicy>,
) -> Box<dyn Harness> {
    let core = HarnessCore {
        index,
        tracker,
        merge_policy,
    };

    if external {
        Box::new(ExternalHarness::new(core))
    } else if leveled {
        Box::new(LeveledHarness::new(core))
    } else {
        Box::new(LsmHarness::new(core))
    }
}

/// Shared state of all harnesses
pub struct HarnessCore {
    index: Weak<IndexInner>,
    tracker: Arc<dyn OperationTracker>,
    merge_policy: Arc<dyn MergePolicy>,
}

impl HarnessCore {
    pub(crate) fn index(&self) -> crate::Result<LsmIndex> {
        self.index
            .upgrade()
            .map(LsmIndex)
            .ok_or(Error::InvariantViolation("index was dropped"))
    }

    fn ensure_active(index: &LsmIndex) -> crate::Result<()> {
        if index.is_active() {
            Ok(())
        } else {
            Err(Error::InvariantViolation("index is not active"))
        }
    }

    /// Runs `f` between `before_operation` and `complete_operation`.
    ///
    /// `complete_operation` is called even if `f` failed.
    fn tracked<T>(
        &self,
        index: &LsmIndex,
        operation: IndexOperation,
        f: impl FnOnce() -> crate::Result<T>,
    ) -> crate::Result<T> {
        self.tracker.before_operation(index, operation)?;
        let result = f();
        let completed = self.tracker.complete_operation(index, operation);
        let value = result?;
        completed?;
        Ok(value)
    }

    pub(crate) fn modify(&self, ctx: &mut OperationContext, entry: Entry) -> crate::Result<()> {
        let index = self.index()?;
        Self::ensure_active(&index)?;

        let operation = ctx.operation;
        if !operation.is_modification() {
            return Err(Error::UnsupportedOperation(operation));
        }

        if !index.is_memory_components_allocated() {
            index.allocate_memory_components()?;
        }

        self.tracked(&index, operation, || {
            let (slot, component) = index.enter_mutable_component(operation)?;

            ctx.current_mutable_component_id = slot;
            ctx.component_holder.clear();
            ctx.component_holder
                .push(Component::Memory(component.clone()));

            let filter_value = index.filter_manager().and_then(|m| m.extract(&entry));
            component.apply(operation, entry, filter_value);

            if component.is_full() {
                log::trace!("{index}: memory component #{slot} is full");
                index.request_flush(slot);
            }

            let result = self.tracker.after_operation(&index, operation);
            component.refs().exit_writer();
            result
        })
    }

    pub(crate) fn pin(&self, ctx: &mut OperationContext) -> crate::Result<PinnedComponents> {
        let index = self.index()?;

        // NOTE: Readers enter under the state lock, so a concurrent flush or merge
        // cannot swap components between selection and pinning
        let state = index.read_state();
        index.select_components(&state, ctx)?;

        let components = ctx
            .component_holder
            .iter()
            .filter(|c| c.refs().enter_reader())
            .cloned()
            .collect();

        drop(state);

        Ok(PinnedComponents { index, components })
    }

    pub(crate) fn search(
        &self,
        ctx: &mut OperationContext,
        predicate: &SearchPredicate,
    ) -> crate::Result<Vec<Entry>> {
        let index = self.index()?;
        Self::ensure_active(&index)?;

        ctx.reset(IndexOperation::Search);
        ctx.search_predicate = Some(predicate.clone());

        self.tracked(&index, IndexOperation::Search, || {
            let pinned = self.pin(ctx)?;

            Ok(resolve(
                pinned.components().iter().map(|c| c.range(predicate)),
                true,
            ))
        })
    }

    pub(crate) fn get(&self, key: &[u8]) -> crate::Result<Option<Entry>> {
        let index = self.index()?;
        Self::ensure_active(&index)?;

        let predicate = SearchPredicate::point(key);
        let mut ctx = index
            .variant()
            .create_op_context(IndexOperation::Search)
            .with_predicate(predicate);

        self.tracked(&index, IndexOperation::Search, || {
            let pinned = self.pin(&mut ctx)?;

            // NOTE: Newest component first, the first hit is the latest version
            Ok(pinned
                .components()
                .iter()
                .find_map(|c| c.get(key))
                .filter(|x| !x.is_tombstone()))
        })
    }

    pub(crate) fn scan_disk_components(
        &self,
        ctx: &mut OperationContext,
    ) -> crate::Result<Vec<Entry>> {
        let index = self.index()?;
        Self::ensure_active(&index)?;

        if !index.is_primary() {
            return Err(ErrorCode::DiskComponentScanNotAllowedForSecondaryIndex.into());
        }

        ctx.reset(IndexOperation::DiskComponentScan);
        let predicate = SearchPredicate::all();

        let pinned = self.pin(ctx)?;

        Ok(resolve(
            pinned.components().iter().map(|c| c.range(&predicate)),
            false,
        ))
    }

    pub(crate) fn schedule_flush(
        &self,
        operation: IndexOperation,
        callback: Arc<dyn IoOperationCallback>,
    ) -> crate::Result<bool> {
        let index = self.index()?;

        if !index.is_memory_components_allocated() {
            return Ok(false);
        }

        let component = {
            let _state = index.write_state();

            let current = index
                .current_memory_component()
                .cloned()
                .ok_or(Error::UnsupportedOperation(operation))?;

            index.change_flush_status_for_current_mutable_component(false);

            if current.is_writable() && current.is_modified() {
                index.enqueue_flush(&current, operation);
                index.advance_mutable_component();
                current
            } else {
                // NOTE: Nothing new to flush, but an earlier flush may have failed,
                // so retry the newest queued component
                let queue = index.flush_queue.lock().expect("lock is poisoned");

                match queue.back() {
                    Some(pending) => pending.component.clone(),
                    None => return Ok(false),
                }
            }
        };

        log::debug!("{index}: scheduling {operation} of {component:?}");

        let mut ctx = index.variant().create_op_context(operation);
        ctx.component_holder.push(Component::Memory(component));

        index.schedule_flush(&ctx, callback)?;

        Ok(true)
    }

    pub(crate) fn schedule_merge(
        &self,
        callback: Arc<dyn IoOperationCallback>,
    ) -> crate::Result<bool> {
        let index = self.index()?;

        let decision = {
            let state = index.write_state();

            let view = PolicyView {
                disk_components: &state.disk_components,
                levels: state.levels.as_deref(),
                target_component_size: index.target_component_size(),
            };

            let decision = self.merge_policy.choose(&view);

            if !mark_merging(&decision_inputs(&decision)) {
                return Ok(false);
            }

            decision
        };

        let inputs = decision_inputs(&decision);

        let result = match decision {
            MergeDecision::DoNothing => return Ok(false),
            MergeDecision::Merge(components) => {
                log::debug!(
                    "{index}: {} chose to merge {} component(s)",
                    self.merge_policy.name(),
                    components.len()
                );

                let mut ctx = index.variant().create_op_context(IndexOperation::Merge);
                ctx.component_holder = components.into_iter().map(Component::Disk).collect();
                index.schedule_merge(&ctx, callback)
            }
            MergeDecision::DeleteComponents(components) => {
                log::debug!(
                    "{index}: {} chose to delete {} component(s)",
                    self.merge_policy.name(),
                    components.len()
                );

                let mut ctx = index
                    .variant()
                    .create_op_context(IndexOperation::DeleteDiskComponents);
                ctx.component_holder = components.into_iter().map(Component::Disk).collect();
                index.schedule_merge(&ctx, callback)
            }
            MergeDecision::LeveledMerge {
                from_prev_level,
                to_be_merged,
                dest_level,
            } => {
                log::debug!(
                    "{index}: {} chose to merge {} component(s) into L{dest_level}",
                    self.merge_policy.name(),
                    from_prev_level.len() + to_be_merged.len(),
                );

                let mut ctx = index.variant().create_op_context(IndexOperation::Merge);
                ctx.component_picked_to_be_merged_from_prev_level = from_prev_level;
                ctx.components_to_be_merged = to_be_merged;
                ctx.dest_level = dest_level;
                index.schedule_leveled_merge(&ctx, callback)
            }
        };

        if let Err(e) = result {
            unmark_merging(&inputs);
            return Err(e);
        }

        Ok(true)
    }

    pub(crate) fn schedule_full_merge(
        &self,
        callback: Arc<dyn IoOperationCallback>,
    ) -> crate::Result<bool> {
        let index = self.index()?;

        let components = {
            let state = index.write_state();

            if state.disk_components.is_empty() || !mark_merging(&state.disk_components) {
                return Ok(false);
            }

            state.disk_components.clone()
        };

        log::debug!("{index}: scheduling full merge of {} component(s)", components.len());

        let mut ctx = index.variant().create_op_context(IndexOperation::FullMerge);
        ctx.component_holder = components.iter().cloned().map(Component::Disk).collect();

        if let Err(e) = index.schedule_merge(&ctx, callback) {
            unmark_merging(&components);
            return Err(e);
        }

        Ok(true)
    }

    pub(crate) fn add_bulk_loaded_component(
        &self,
        component: Arc<DiskComponent>,
    ) -> crate::Result<()> {
        let index = self.index()?;
        index.add_disk_component(Some(component))?;
        self.after_io(&index);
        Ok(())
    }

    /// Asks the merge policy for work after a flush or merge was installed.
    ///
    /// Failing to schedule a merge does not fail the finished operation.
    pub(crate) fn after_io(&self, index: &LsmIndex) {
        if let Err(e) = self.schedule_merge(index.io_operation_callback().clone()) {
            log::error!("{index}: failed to schedule merge: {e:?}");
        }
    }
}

fn decision_inputs(decision: &MergeDecision) -> Vec<Arc<DiskComponent>> {
    match decision {
        MergeDecision::DoNothing => vec![],
        MergeDecision::Merge(components) | MergeDecision::DeleteComponents(components) => {
            components.clone()
        }
        MergeDecision::LeveledMerge {
            from_prev_level,
            to_be_merged,
            ..
        } => from_prev_level.iter().chain(to_be_merged).cloned().collect(),
    }
}

/// Marks all components as merge inputs, or none of them.
fn mark_merging(components: &[Arc<DiskComponent>]) -> bool {
    for (i, component) in components.iter().enumerate() {
        if !component.mark_merging() {
            unmark_merging(components.get(..i).unwrap_or_default());
            return false;
        }
    }
    true
}

pub(crate) fn unmark_merging(components: &[Arc<DiskComponent>]) {
    for component in components {
        component.unmark_merging();
    }
}

/// Resolves per-component results (newest component first) into a single
/// sorted list; the newest version of each key wins.
fn resolve<I: IntoIterator<Item = Vec<Entry>>>(sources: I, hide_tombstones: bool) -> Vec<Entry> {
    let mut merged: BTreeMap<UserKey, Entry> = BTreeMap::new();

    for entries in sources {
        for entry in entries {
            merged.entry(entry.key.clone()).or_insert(entry);
        }
    }

    merged
        .into_values()
        .filter(|x| !(hide_tombstones && x.is_tombstone()))
        .collect()
}

/// Components a reader entered
///
/// Leaves the components on drop. Holding a pin on a memory component
/// blocks the flush of that component.
pub struct PinnedComponents {
    index: LsmIndex,
    components: Vec<Component>,
}

impl PinnedComponents {
    /// Pinned components, newest first
    #[must_use]
    pub fn components(&self) -> &[Component] {
        &self.components
    }
}

impl Drop for PinnedComponents {
    fn drop(&mut self) {
        let mut drain = false;

        for component in &self.components {
            let readers = component.refs().exit_reader();

            if readers == 0
                && component
                    .as_disk()
                    .is_some_and(|c| c.state() == DiskComponentState::Retired)
            {
                drain = true;
            }
        }

        if drain {
            if let Err(e) = self.index.drain_inactive_disk_components() {
                log::warn!("{}: failed to destroy retired components: {e:?}", self.index);
            }
        }
    }
}

/// Data-plane operations of an index
///
/// The provided methods implement the read-write LSM behaviour; harnesses
/// override what they do differently.
pub trait Harness: Send + Sync {
    /// Shared state
    fn core(&self) -> &HarnessCore;

    /// Applies a modification to the current mutable component.
    ///
    /// Allocates the memory components on first use and waits while no
    /// memory component is writable.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the index is inactive, or the operation is not a
    /// modification.
    fn modify(&self, ctx: &mut OperationContext, entry: Entry) -> crate::Result<()> {
        self.core().modify(ctx, entry)
    }

    /// Returns the live entries matching the predicate, sorted by key.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the index is inactive.
    fn search(
        &self,
        ctx: &mut OperationContext,
        predicate: &SearchPredicate,
    ) -> crate::Result<Vec<Entry>> {
        self.core().search(ctx, predicate)
    }

    /// Returns the newest live version of a key.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the index is inactive.
    fn get(&self, key: &[u8]) -> crate::Result<Option<Entry>> {
        self.core().get(key)
    }

    /// Returns the newest version of every key on disk, tombstones included.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the index is secondary, or inactive.
    fn scan_disk_components(&self, ctx: &mut OperationContext) -> crate::Result<Vec<Entry>> {
        self.core().scan_disk_components(ctx)
    }

    /// Pins the operational components of `ctx` for reading.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the operation does not select components.
    fn pin(&self, ctx: &mut OperationContext) -> crate::Result<PinnedComponents> {
        self.core().pin(ctx)
    }

    /// Seals the current mutable component and schedules its flush.
    ///
    /// Returns `false` if there was nothing to flush.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the scheduler rejected the flush.
    fn schedule_flush(
        &self,
        operation: IndexOperation,
        callback: Arc<dyn IoOperationCallback>,
    ) -> crate::Result<bool> {
        self.core().schedule_flush(operation, callback)
    }

    /// Executes a flush operation.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the flush failed.
    fn flush(&self, op: &IoOperation) -> crate::Result<()> {
        self.core().flush(op)
    }

    /// Asks the merge policy for work and schedules it.
    ///
    /// Returns `false` if the policy chose to do nothing.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the scheduler rejected the merge.
    fn schedule_merge(&self, callback: Arc<dyn IoOperationCallback>) -> crate::Result<bool> {
        self.core().schedule_merge(callback)
    }

    /// Schedules a merge of all disk components.
    ///
    /// Returns `false` if there is nothing to merge, or a merge is running.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the scheduler rejected the merge.
    fn schedule_full_merge(&self, callback: Arc<dyn IoOperationCallback>) -> crate::Result<bool> {
        self.core().schedule_full_merge(callback)
    }

    /// Executes a merge operation.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the merge failed.
    fn merge(&self, op: &IoOperation) -> crate::Result<()> {
        self.core().merge_classic(op)
    }

    /// Installs a bulk-loaded component as the newest disk component.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the component breaks the ID ordering.
    fn add_bulk_loaded_component(&self, component: Arc<DiskComponent>) -> crate::Result<()> {
        self.core().add_bulk_loaded_component(component)
    }

    /// Operation tracker
    fn operation_tracker(&self) -> &Arc<dyn OperationTracker> {
        &self.core().tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn resolve_newest_wins() {
        let newer = vec![Entry::new("a", "new"), Entry::new_tombstone("b")];
        let older = vec![Entry::new("a", "old"), Entry::new("b", "old"), Entry::new("c", "old")];

        let visible = resolve([newer.clone(), older.clone()], true);
        assert_eq!(
            vec![Entry::new("a", "new"), Entry::new("c", "old")],
            visible
        );

        let all = resolve([newer, older], false);
        assert_eq!(3, all.len());
        assert!(all.get(1).is_some_and(Entry::is_tombstone));
    }
}
