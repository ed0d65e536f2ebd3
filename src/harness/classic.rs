// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{unmark_merging, Harness, HarnessCore};
use crate::{
    callback::IoOperationCallback,
    component::{Component, DiskComponent},
    index::PendingFlush,
    io::IoOperation,
    operation::IoOperationType,
    replication::ReplicationOperation,
    Error, LsmIndex,
};
use std::sync::Arc;

/// Read-write LSM harness, merging with single-output merges
pub struct LsmHarness(HarnessCore);

impl LsmHarness {
    pub(crate) fn new(core: HarnessCore) -> Self {
        Self(core)
    }
}

impl Harness for LsmHarness {
    fn core(&self) -> &HarnessCore {
        &self.0
    }
}

impl HarnessCore {
    /// Drains the flush queue, oldest first, up to and including the
    /// component of `op`.
    pub(crate) fn flush(&self, op: &IoOperation) -> crate::Result<()> {
        let index = self.index()?;

        let component = op
            .context()
            .component_holder
            .iter()
            .find_map(Component::as_memory)
            .cloned()
            .ok_or(Error::InvariantViolation("flush needs a memory component"))?;

        let _serial = index.flush_serializer.lock().expect("lock is poisoned");

        let is_queued = index
            .flush_queue
            .lock()
            .expect("lock is poisoned")
            .iter()
            .any(|x| Arc::ptr_eq(&x.component, &component));

        if !is_queued {
            log::debug!("{index}: {component:?} was flushed by an earlier operation");
            return op.callback().after_finalize(IoOperationType::Flush, &[]);
        }

        loop {
            let Some(pending) = index
                .flush_queue
                .lock()
                .expect("lock is poisoned")
                .front()
                .cloned()
            else {
                break;
            };

            let is_target = Arc::ptr_eq(&pending.component, &component);

            let callback = if is_target {
                op.callback().clone()
            } else {
                index.io_operation_callback().clone()
            };

            if let Err(e) = self.flush_pending(&index, op, &pending, callback.as_ref()) {
                if !is_target {
                    op.callback().operation_failed(IoOperationType::Flush, &e);
                }
                return Err(e);
            }

            if is_target {
                break;
            }
        }

        self.after_io(&index);

        Ok(())
    }

    fn flush_pending(
        &self,
        index: &LsmIndex,
        op: &IoOperation,
        pending: &PendingFlush,
        callback: &dyn IoOperationCallback,
    ) -> crate::Result<()> {
        let component = &pending.component;

        let id = component
            .flush_id()
            .ok_or(Error::InvariantViolation("queued component has no flush ID"))?;

        let target = index.flush_target(id);

        component.refs().wait_for_writers();

        if let Err(e) = callback.before_operation(IoOperationType::Flush) {
            callback.operation_failed(IoOperationType::Flush, &e);
            return Err(e);
        }

        let new_component = match index.flush_component(pending.operation, component, &target) {
            Ok(x) => x,
            Err(e) => {
                // NOTE: The component stays queued and modified, the next flush retries it
                callback.operation_failed(IoOperationType::Flush, &e);
                return Err(e);
            }
        };

        let new_components = new_component.iter().cloned().collect::<Vec<_>>();

        if let Err(e) = callback.after_operation(IoOperationType::Flush, &new_components) {
            let e = index.cleanup_files(std::slice::from_ref(&target), e);
            callback.operation_failed(IoOperationType::Flush, &e);
            return Err(e);
        }

        {
            let mut state = index.write_state();

            if let Err(e) = LsmIndex::add_disk_component_locked(&mut state, new_component) {
                drop(state);
                let e = index.cleanup_files(std::slice::from_ref(&target), e);
                callback.operation_failed(IoOperationType::Flush, &e);
                return Err(e);
            }

            component.refs().set_readable(false);
        }

        component.refs().wait_for_readers();

        {
            let _ring = index.ring_lock.lock().expect("lock is poisoned");

            component.reset();

            if component.is_activation_requested() {
                component.activate();
            }

            index.flush_queue.lock().expect("lock is poisoned").pop_front();
        }

        index.ring_cond.notify_all();

        log::debug!("{index}: flushed {id} ({})", pending.operation);

        callback.after_finalize(IoOperationType::Flush, &new_components)?;

        index.schedule_replication(
            op.context(),
            &new_components,
            false,
            ReplicationOperation::Replicate,
            IoOperationType::Flush,
        )
    }

    pub(crate) fn merge_classic(&self, op: &IoOperation) -> crate::Result<()> {
        let index = self.index()?;
        let callback = op.callback();
        let inputs = op.context().components_to_be_merged.clone();

        let result = callback
            .before_operation(IoOperationType::Merge)
            .and_then(|()| index.merge(op));

        let new_component = match result {
            Ok(x) => x,
            Err(e) => {
                unmark_merging(&inputs);
                callback.operation_failed(IoOperationType::Merge, &e);
                return Err(e);
            }
        };

        self.install_merge(&index, op, new_component.into_iter().collect(), &inputs)
    }

    /// Installs merge outputs, retires the inputs and notifies the callback.
    pub(crate) fn install_merge(
        &self,
        index: &LsmIndex,
        op: &IoOperation,
        new_components: Vec<Arc<DiskComponent>>,
        inputs: &[Arc<DiskComponent>],
    ) -> crate::Result<()> {
        let callback = op.callback();

        if let Err(e) = callback.after_operation(IoOperationType::Merge, &new_components) {
            let e = index.cleanup_files(op.targets(), e);
            unmark_merging(inputs);
            callback.operation_failed(IoOperationType::Merge, &e);
            return Err(e);
        }

        {
            let mut state = index.write_state();

            if let Err(e) = index.subsume_locked(&mut state, new_components.clone(), inputs) {
                drop(state);
                let e = index.cleanup_files(op.targets(), e);
                unmark_merging(inputs);
                callback.operation_failed(IoOperationType::Merge, &e);
                return Err(e);
            }

            for component in inputs {
                component.retire();
                state.inactive_disk_components.push(component.clone());
            }
        }

        log::debug!(
            "{index}: merged {} component(s) into {:?}",
            inputs.len(),
            new_components.iter().map(|c| c.id()).collect::<Vec<_>>()
        );

        callback.after_finalize(IoOperationType::Merge, &new_components)?;

        index.schedule_replication(
            op.context(),
            &new_components,
            false,
            ReplicationOperation::Replicate,
            IoOperationType::Merge,
        )?;

        index.schedule_replication(
            op.context(),
            inputs,
            false,
            ReplicationOperation::Delete,
            IoOperationType::Merge,
        )?;

        if let Err(e) = index.drain_inactive_disk_components() {
            log::warn!("{index}: failed to destroy merged components: {e:?}");
        }

        self.after_io(index);

        Ok(())
    }
}
