// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    component::{DiskComponent, MemoryComponent},
    error::ErrorKind,
    operation::IoOperationType,
    Error,
};
use std::sync::{Arc, Condvar, Mutex};

/// Hooks around flushes, merges and bulk loads
///
/// `new_components` is empty if the operation produced no component,
/// e.g. when deleting a memory component.
#[allow(clippy::module_name_repetitions)]
pub trait IoOperationCallback: Send + Sync {
    /// Called before the operation writes anything.
    ///
    /// # Errors
    ///
    /// Returning `Err` aborts the operation.
    fn before_operation(&self, op_type: IoOperationType) -> crate::Result<()> {
        let _ = op_type;
        Ok(())
    }

    /// Called after the new components are written, before they are installed.
    ///
    /// # Errors
    ///
    /// Returning `Err` aborts the operation.
    fn after_operation(
        &self,
        op_type: IoOperationType,
        new_components: &[Arc<DiskComponent>],
    ) -> crate::Result<()> {
        let _ = (op_type, new_components);
        Ok(())
    }

    /// Called after the new components are installed.
    ///
    /// # Errors
    ///
    /// The error is propagated to the operation's caller.
    fn after_finalize(
        &self,
        op_type: IoOperationType,
        new_components: &[Arc<DiskComponent>],
    ) -> crate::Result<()> {
        let _ = (op_type, new_components);
        Ok(())
    }

    /// Called if the operation failed, or was dropped before it ran.
    fn operation_failed(&self, op_type: IoOperationType, error: &Error) {
        let _ = (op_type, error);
    }

    /// Called after a memory component was allocated.
    ///
    /// # Errors
    ///
    /// Returning `Err` rolls back the allocation.
    fn allocated(&self, component: &MemoryComponent) -> crate::Result<()> {
        let _ = component;
        Ok(())
    }
}

/// Callback that does nothing
#[derive(Debug, Default)]
pub struct NoOpIoOperationCallback;

impl IoOperationCallback for NoOpIoOperationCallback {}

#[derive(Debug)]
enum IoState {
    Pending,
    Done,
    Failed(ErrorKind, String),
}

/// Wraps a callback and lets a thread wait for the operation to finish
#[allow(clippy::module_name_repetitions)]
pub struct BlockingIoOperationCallback {
    inner: Arc<dyn IoOperationCallback>,
    state: Mutex<IoState>,
    cond: Condvar,
}

impl BlockingIoOperationCallback {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn IoOperationCallback>) -> Self {
        Self {
            inner,
            state: Mutex::new(IoState::Pending),
            cond: Condvar::new(),
        }
    }

    fn finish(&self, state: IoState) {
        *self.state.lock().expect("lock is poisoned") = state;
        self.cond.notify_all();
    }

    /// Blocks until the operation finalized or failed.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the operation failed, or was dropped without running.
    pub fn wait_for_io(&self) -> crate::Result<()> {
        let mut state = self.state.lock().expect("lock is poisoned");

        while matches!(*state, IoState::Pending) {
            state = self.cond.wait(state).expect("lock is poisoned");
        }

        match &*state {
            IoState::Pending | IoState::Done => Ok(()),
            IoState::Failed(ErrorKind::Interrupted, _) => Err(Error::Interrupted),
            IoState::Failed(_, msg) => Err(Error::operation_failed(
                Error::Io(std::io::Error::other(msg.clone())),
                vec![],
            )),
        }
    }
}

impl IoOperationCallback for BlockingIoOperationCallback {
    fn before_operation(&self, op_type: IoOperationType) -> crate::Result<()> {
        self.inner.before_operation(op_type)
    }

    fn after_operation(
        &self,
        op_type: IoOperationType,
        new_components: &[Arc<DiskComponent>],
    ) -> crate::Result<()> {
        self.inner.after_operation(op_type, new_components)
    }

    fn after_finalize(
        &self,
        op_type: IoOperationType,
        new_components: &[Arc<DiskComponent>],
    ) -> crate::Result<()> {
        let result = self.inner.after_finalize(op_type, new_components);
        self.finish(IoState::Done);
        result
    }

    fn operation_failed(&self, op_type: IoOperationType, error: &Error) {
        self.inner.operation_failed(op_type, error);
        self.finish(IoState::Failed(error.kind(), error.to_string()));
    }

    fn allocated(&self, component: &MemoryComponent) -> crate::Result<()> {
        self.inner.allocated(component)
    }
}
