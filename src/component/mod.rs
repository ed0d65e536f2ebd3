// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Memory and disk components

mod disk;
mod file_refs;
mod filter;
mod id;
mod memory;
mod refs;

pub use disk::{DiskComponent, DiskComponentState};
pub use file_refs::{ComponentFileReferences, ComponentTarget, FileReference};
pub use filter::{ComponentFilter, FilterExtractor, FilterManager};
pub use id::{ComponentId, ComponentIdGenerator, IdCompareResult};
pub use memory::MemoryComponent;
pub use refs::ComponentRefs;

use crate::{operation::SearchPredicate, value::Entry};
use std::sync::Arc;

/// A component as seen by an operation
///
/// Components compare by identity.
#[derive(Clone, Debug)]
pub enum Component {
    /// Mutable in-memory component
    Memory(Arc<MemoryComponent>),

    /// Immutable on-disk component
    Disk(Arc<DiskComponent>),
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Memory(a), Self::Memory(b)) => Arc::ptr_eq(a, b),
            (Self::Disk(a), Self::Disk(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Component {}

impl From<Arc<DiskComponent>> for Component {
    fn from(value: Arc<DiskComponent>) -> Self {
        Self::Disk(value)
    }
}

impl From<Arc<MemoryComponent>> for Component {
    fn from(value: Arc<MemoryComponent>) -> Self {
        Self::Memory(value)
    }
}

impl Component {
    /// Returns the disk component, if this is one.
    #[must_use]
    pub fn as_disk(&self) -> Option<&Arc<DiskComponent>> {
        match self {
            Self::Disk(c) => Some(c),
            Self::Memory(_) => None,
        }
    }

    /// Returns the memory component, if this is one.
    #[must_use]
    pub fn as_memory(&self) -> Option<&Arc<MemoryComponent>> {
        match self {
            Self::Memory(c) => Some(c),
            Self::Disk(_) => None,
        }
    }

    /// Returns `true` if this is a memory component.
    #[must_use]
    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Memory(_))
    }

    /// Min/max filter of the component
    #[must_use]
    pub fn filter(&self) -> &ComponentFilter {
        match self {
            Self::Memory(c) => c.filter(),
            Self::Disk(c) => c.filter(),
        }
    }

    /// Reference counts of the component
    #[must_use]
    pub fn refs(&self) -> &ComponentRefs {
        match self {
            Self::Memory(c) => c.refs(),
            Self::Disk(c) => c.refs(),
        }
    }

    /// Point read, tombstones included.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        match self {
            Self::Memory(c) => c.get(key),
            Self::Disk(c) => c.get(key),
        }
    }

    /// Entries inside the predicate's key bounds, tombstones included.
    #[must_use]
    pub fn range(&self, predicate: &SearchPredicate) -> Vec<Entry> {
        match self {
            Self::Memory(c) => c.range(predicate),
            Self::Disk(c) => c.range(predicate),
        }
    }
}
