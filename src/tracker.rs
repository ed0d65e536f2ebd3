// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{operation::IndexOperation, LsmIndex};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Observes data-path operations of an index
#[allow(clippy::module_name_repetitions)]
pub trait OperationTracker: Send + Sync {
    /// Called before the operation enters its components.
    ///
    /// # Errors
    ///
    /// Returning `Err` aborts the operation.
    fn before_operation(&self, index: &LsmIndex, operation: IndexOperation) -> crate::Result<()> {
        let _ = (index, operation);
        Ok(())
    }

    /// Called after the operation applied its change, still inside its component.
    ///
    /// # Errors
    ///
    /// The error is propagated to the caller.
    fn after_operation(&self, index: &LsmIndex, operation: IndexOperation) -> crate::Result<()> {
        let _ = (index, operation);
        Ok(())
    }

    /// Called after the operation left its components.
    ///
    /// # Errors
    ///
    /// The error is propagated to the caller.
    fn complete_operation(&self, index: &LsmIndex, operation: IndexOperation) -> crate::Result<()> {
        let _ = (index, operation);
        Ok(())
    }
}

/// Tracker that does nothing
#[derive(Debug, Default)]
pub struct NoOpOperationTracker;

impl OperationTracker for NoOpOperationTracker {}

/// Schedules a flush once a modification finds a flush request for the
/// current mutable component
#[derive(Debug, Default)]
pub struct FlushingOperationTracker {
    active: AtomicUsize,
}

impl FlushingOperationTracker {
    /// Number of operations between `before_operation` and `complete_operation`
    #[must_use]
    pub fn active_operations(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

impl OperationTracker for FlushingOperationTracker {
    fn before_operation(&self, _: &LsmIndex, _: IndexOperation) -> crate::Result<()> {
        self.active.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn complete_operation(&self, index: &LsmIndex, operation: IndexOperation) -> crate::Result<()> {
        self.active.fetch_sub(1, Ordering::AcqRel);

        if operation.is_modification() && index.has_flush_request_for_current_mutable_component()
        {
            log::debug!("{index}: memory component is full, scheduling flush");

            index
                .harness()
                .schedule_flush(IndexOperation::Flush, index.io_operation_callback().clone())?;
        }

        Ok(())
    }
}
