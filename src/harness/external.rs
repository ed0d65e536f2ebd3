// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{Harness, HarnessCore};
use crate::{
    callback::IoOperationCallback,
    component::DiskComponent,
    io::IoOperation,
    operation::{IndexOperation, OperationContext},
    value::Entry,
    Error,
};
use std::sync::Arc;

/// Harness of read-only indexes over externally produced components
///
/// Has no memory components; data only arrives through bulk loads.
pub struct ExternalHarness(HarnessCore);

impl ExternalHarness {
    pub(crate) fn new(core: HarnessCore) -> Self {
        Self(core)
    }
}

impl Harness for ExternalHarness {
    fn core(&self) -> &HarnessCore {
        &self.0
    }

    fn modify(&self, ctx: &mut OperationContext, _: Entry) -> crate::Result<()> {
        Err(Error::UnsupportedOperation(ctx.operation))
    }

    fn schedule_flush(
        &self,
        _: IndexOperation,
        _: Arc<dyn IoOperationCallback>,
    ) -> crate::Result<bool> {
        Ok(false)
    }

    fn flush(&self, _: &IoOperation) -> crate::Result<()> {
        Err(Error::UnsupportedOperation(IndexOperation::Flush))
    }

    fn add_bulk_loaded_component(&self, component: Arc<DiskComponent>) -> crate::Result<()> {
        let index = self.0.index()?;
        index.add_disk_component(Some(component))
    }
}
