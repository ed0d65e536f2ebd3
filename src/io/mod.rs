// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Flush and merge operations and the schedulers executing them

mod thread_pool;
mod tracer;

pub use thread_pool::ThreadPoolScheduler;
pub use tracer::Tracer;

use crate::{
    callback::IoOperationCallback, component::ComponentTarget, operation::IoOperationType,
    operation::OperationContext, Error, LsmIndex,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// A flush or merge, ready to be executed
///
/// Dropping an operation that never ran reports it as interrupted to its
/// callback.
pub struct IoOperation {
    op_type: IoOperationType,
    ctx: OperationContext,
    targets: Vec<ComponentTarget>,
    leveled: bool,
    callback: Arc<dyn IoOperationCallback>,
    index: LsmIndex,
    tracer: Option<Tracer>,
    completed: AtomicBool,
}

impl std::fmt::Debug for IoOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "IoOperation:{}({}, targets={:?})",
            self.op_type,
            self.ctx.operation,
            self.targets.iter().map(|x| x.id).collect::<Vec<_>>()
        )
    }
}

impl IoOperation {
    pub(crate) fn new(
        op_type: IoOperationType,
        ctx: OperationContext,
        targets: Vec<ComponentTarget>,
        leveled: bool,
        callback: Arc<dyn IoOperationCallback>,
        index: LsmIndex,
    ) -> Self {
        index.enter_io();

        Self {
            op_type,
            ctx,
            targets,
            leveled,
            callback,
            index,
            tracer: None,
            completed: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_tracer(&mut self, tracer: Tracer) {
        self.tracer = Some(tracer);
    }

    /// Flush or merge
    #[must_use]
    pub fn op_type(&self) -> IoOperationType {
        self.op_type
    }

    /// Operation context; the holder contains the flushed memory component
    /// or the merged disk components
    #[must_use]
    pub fn context(&self) -> &OperationContext {
        &self.ctx
    }

    /// Output targets
    #[must_use]
    pub fn targets(&self) -> &[ComponentTarget] {
        &self.targets
    }

    /// Returns `true` for multi-output merges.
    #[must_use]
    pub fn is_leveled(&self) -> bool {
        self.leveled
    }

    /// Callback of the operation
    #[must_use]
    pub fn callback(&self) -> &Arc<dyn IoOperationCallback> {
        &self.callback
    }

    /// Index the operation belongs to
    #[must_use]
    pub fn index(&self) -> &LsmIndex {
        &self.index
    }

    /// Executes the operation.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the flush or merge failed.
    pub fn call(&self) -> crate::Result<()> {
        let span = self.tracer.as_ref().map(|tracer| tracer.begin(self));

        let harness = self.index.harness();

        let result = match self.op_type {
            IoOperationType::Flush => harness.flush(self),
            IoOperationType::Merge => harness.merge(self),
            _ => Err(Error::InvariantViolation("unexpected IO operation type")),
        };

        self.completed.store(true, Ordering::Release);

        if let (Some(tracer), Some(span)) = (&self.tracer, span) {
            tracer.end(self, span, result.is_ok());
        }

        result
    }
}

impl Drop for IoOperation {
    fn drop(&mut self) {
        if !self.completed.load(Ordering::Acquire) {
            log::warn!("{self:?} was dropped before it ran");
            self.callback.operation_failed(self.op_type, &Error::Interrupted);

            if self.op_type == IoOperationType::Merge {
                for c in self.ctx.disk_components() {
                    c.unmark_merging();
                }
            }
        }

        self.index.exit_io();
    }
}

/// Executes IO operations
#[allow(clippy::module_name_repetitions)]
pub trait IoScheduler: Send + Sync {
    /// Hands an operation over for execution.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the operation could not be accepted. Schedulers
    /// running operations inline also return the operation's error.
    fn schedule_operation(&self, op: IoOperation) -> crate::Result<()>;
}

/// Runs every operation on the calling thread
#[derive(Debug, Default)]
pub struct SynchronousScheduler;

impl IoScheduler for SynchronousScheduler {
    fn schedule_operation(&self, op: IoOperation) -> crate::Result<()> {
        op.call()
    }
}
