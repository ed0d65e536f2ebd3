// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    buffer_cache::BufferCache,
    component::{ComponentTarget, DiskComponent},
    run::SortedRun,
};
use std::sync::Arc;

/// Materializes disk components from their files
#[allow(clippy::module_name_repetitions)]
pub trait ComponentFactory: Send + Sync {
    /// Opens the component described by `target`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, or the files are malformed.
    fn create_component(&self, target: ComponentTarget) -> crate::Result<Arc<DiskComponent>>;
}

/// Opens sorted-run components through a buffer cache
#[allow(clippy::module_name_repetitions)]
pub struct RunComponentFactory {
    buffer_cache: Arc<dyn BufferCache>,
}

impl RunComponentFactory {
    /// Creates a factory reading through `buffer_cache`.
    #[must_use]
    pub fn new(buffer_cache: Arc<dyn BufferCache>) -> Self {
        Self { buffer_cache }
    }
}

impl ComponentFactory for RunComponentFactory {
    fn create_component(&self, target: ComponentTarget) -> crate::Result<Arc<DiskComponent>> {
        log::trace!("opening disk component {} (L{})", target.id, target.level);

        let run = SortedRun::load(self.buffer_cache.as_ref(), &target.files)?;

        Ok(Arc::new(DiskComponent::new(
            target,
            run,
            self.buffer_cache.clone(),
        )))
    }
}
