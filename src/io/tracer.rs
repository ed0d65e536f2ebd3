// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::IoOperation;
use std::{sync::Arc, time::Instant};

/// Logs begin and end of IO operations under a log target
#[derive(Clone, Debug)]
pub struct Tracer {
    category: Arc<str>,
}

impl Tracer {
    /// Creates a tracer logging to the target `category`.
    pub fn new<S: Into<Arc<str>>>(category: S) -> Self {
        Self {
            category: category.into(),
        }
    }

    /// Log target
    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Attaches the tracer to an operation.
    #[must_use]
    pub fn wrap(&self, mut op: IoOperation) -> IoOperation {
        op.set_tracer(self.clone());
        op
    }

    pub(crate) fn begin(&self, op: &IoOperation) -> Instant {
        log::debug!(target: self.category(), "begin {op:?}");
        Instant::now()
    }

    pub(crate) fn end(&self, op: &IoOperation, start: Instant, ok: bool) {
        log::debug!(
            target: self.category(),
            "end {op:?} ok={ok} in {}ms",
            start.elapsed().as_millis()
        );
    }
}
