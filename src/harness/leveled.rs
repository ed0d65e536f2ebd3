// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{unmark_merging, Harness, HarnessCore};
use crate::{io::IoOperation, operation::IoOperationType, LsmIndex};

/// Read-write LSM harness for leveled indexes
///
/// Leveled merges produce several range-partitioned outputs; other merges
/// (e.g. full merges) take the single-output path.
pub struct LeveledHarness(HarnessCore);

impl LeveledHarness {
    pub(crate) fn new(core: HarnessCore) -> Self {
        Self(core)
    }
}

impl Harness for LeveledHarness {
    fn core(&self) -> &HarnessCore {
        &self.0
    }

    fn merge(&self, op: &IoOperation) -> crate::Result<()> {
        if op.is_leveled() {
            self.0.merge_leveled(op)
        } else {
            self.0.merge_classic(op)
        }
    }
}

impl HarnessCore {
    fn merge_leveled(&self, op: &IoOperation) -> crate::Result<()> {
        let index = self.index()?;
        let callback = op.callback();
        let inputs = LsmIndex::leveled_merge_inputs(op.context());

        let result = callback
            .before_operation(IoOperationType::Merge)
            .and_then(|()| index.leveled_merge(op));

        let new_components = match result {
            Ok(x) => x,
            Err(e) => {
                unmark_merging(&inputs);
                callback.operation_failed(IoOperationType::Merge, &e);
                return Err(e);
            }
        };

        log::trace!(
            "{index}: leveled merge into L{} produced {} component(s)",
            op.context().dest_level,
            new_components.len()
        );

        self.install_merge(&index, op, new_components, &inputs)
    }
}
