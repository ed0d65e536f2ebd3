// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{compute_filter, LsmIndex};
use crate::{
    component::{ComponentTarget, DiskComponent},
    operation::{IndexOperation, IoOperationType, OperationContext},
    replication::ReplicationOperation,
    run::{RunWriteOptions, SortedRun},
    value::{Entry, UserKey, UserValue},
    Error, ErrorCode,
};
use std::{collections::BTreeMap, sync::Arc};

/// Loads entries directly into a new disk component
///
/// Entries are buffered until [`BulkLoader::end`], which takes a fresh component ID,
/// writes the component and installs it as the newest disk component.
pub struct BulkLoader {
    index: LsmIndex,
    entries: Vec<Entry>,
    fill_factor: f32,
    verify_input: bool,
    finished: bool,
}

impl std::fmt::Debug for BulkLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BulkLoader({}, entries={})",
            self.index.path().display(),
            self.entries.len()
        )
    }
}

impl BulkLoader {
    pub(crate) fn new(
        index: LsmIndex,
        fill_factor: f32,
        verify_input: bool,
        num_elements_hint: usize,
    ) -> Self {
        log::debug!("{index}: starting bulk load");

        Self {
            index,
            entries: Vec::with_capacity(num_elements_hint.min(1_000_000)),
            fill_factor: fill_factor.clamp(0.1, 1.0),
            verify_input,
            finished: false,
        }
    }

    /// Fill factor the loader was created with
    #[must_use]
    pub fn fill_factor(&self) -> f32 {
        self.fill_factor
    }

    /// Number of entries added so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was added yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds a key-value pair.
    ///
    /// # Errors
    ///
    /// Will return `Err` if input verification is enabled and the key is not
    /// strictly greater than the previous one.
    pub fn add<K: Into<UserKey>, V: Into<UserValue>>(&mut self, key: K, value: V) -> crate::Result<()> {
        self.push(Entry::new(key, value))
    }

    /// Adds a tombstone.
    ///
    /// # Errors
    ///
    /// Will return `Err` if input verification is enabled and the key is not
    /// strictly greater than the previous one.
    pub fn add_tombstone<K: Into<UserKey>>(&mut self, key: K) -> crate::Result<()> {
        self.push(Entry::new_tombstone(key))
    }

    fn push(&mut self, entry: Entry) -> crate::Result<()> {
        if self.verify_input {
            if let Some(last) = self.entries.last() {
                if last.key >= entry.key {
                    return Err(Error::InvariantViolation("bulk load input is not sorted"));
                }
            }
        }

        self.entries.push(entry);
        Ok(())
    }

    /// Writes the component and installs it.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, the component could not be installed,
    /// or a flush is pending. Files written so far are deleted.
    pub fn end(mut self) -> crate::Result<Arc<DiskComponent>> {
        self.finished = true;

        let index = self.index.clone();
        let callback = index.io_operation_callback().clone();

        let entries = if self.verify_input {
            std::mem::take(&mut self.entries)
        } else {
            // NOTE: Later entries win
            std::mem::take(&mut self.entries)
                .into_iter()
                .map(|x| (x.key.clone(), x))
                .collect::<BTreeMap<_, _>>()
                .into_values()
                .collect()
        };

        let count = entries.len();

        // NOTE: Flushes install under the serializer, so none can be installed
        // between taking the ID and installing the loaded component
        let serial = index.flush_serializer.lock().expect("lock is poisoned");

        let target = {
            let queue = index.flush_queue.lock().expect("lock is poisoned");

            if queue.is_empty() {
                // NOTE: Flush IDs are assigned under the queue lock
                index.create_bulk_load_target()
            } else {
                log::warn!(
                    "{index}: refusing bulk load, {} flush(es) pending",
                    queue.len()
                );

                drop(queue);
                drop(serial);

                let e = Error::from(ErrorCode::LoadNonEmptyIndex);
                callback.operation_failed(IoOperationType::Load, &e);
                return Err(e);
            }
        };

        let component = match self.write(&target, entries) {
            Ok(component) => component,
            Err(e) => {
                drop(serial);
                let e = index.cleanup_files(std::slice::from_ref(&target), e);
                callback.operation_failed(IoOperationType::Load, &e);
                return Err(e);
            }
        };

        let new_components = [component.clone()];

        let installed = callback
            .after_operation(IoOperationType::Load, &new_components)
            .and_then(|()| index.harness().add_bulk_loaded_component(component.clone()));

        drop(serial);

        if let Err(e) = installed {
            let e = index.cleanup_files(std::slice::from_ref(&target), e);
            callback.operation_failed(IoOperationType::Load, &e);
            return Err(e);
        }

        callback.after_finalize(IoOperationType::Load, &new_components)?;

        let ctx = OperationContext::new(IndexOperation::Replicate);
        index.schedule_replication(
            &ctx,
            &new_components,
            true,
            ReplicationOperation::Replicate,
            IoOperationType::Load,
        )?;

        log::debug!("{index}: bulk loaded {count} entries into {component:?}");

        Ok(component)
    }

    fn write(
        &self,
        target: &ComponentTarget,
        entries: Vec<Entry>,
    ) -> crate::Result<Arc<DiskComponent>> {
        let filter = compute_filter(self.index.filter_manager(), &entries);

        SortedRun::write(
            self.index.buffer_cache().as_ref(),
            &target.files,
            entries,
            &RunWriteOptions {
                bloom_filter_fp_rate: self.index.bloom_filter_fp_rate(),
                durable: self.index.is_durable(),
                filter,
            },
        )?;

        if self.index.is_durable() {
            self.index.file_manager().sync()?;
        }

        self.index
            .bulk_load_component_factory()
            .create_component(target.clone())
    }

    /// Discards the load.
    ///
    /// Nothing is written before [`BulkLoader::end`], so only the buffered entries are dropped.
    pub fn abort(mut self) {
        self.finished = true;

        log::debug!("{self:?}: aborted");

        self.index
            .io_operation_callback()
            .operation_failed(IoOperationType::Load, &Error::Interrupted);
    }
}

impl Drop for BulkLoader {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!("{self:?} was dropped without end() or abort()");

            self.index
                .io_operation_callback()
                .operation_failed(IoOperationType::Load, &Error::Interrupted);
        }
    }
}
