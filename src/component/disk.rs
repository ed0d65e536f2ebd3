// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{
    file_refs::{ComponentFileReferences, ComponentTarget},
    filter::ComponentFilter,
    id::ComponentId,
    refs::ComponentRefs,
};
use crate::{
    buffer_cache::BufferCache, operation::SearchPredicate, run::SortedRun, value::Entry,
    value::Slice, Error,
};
use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

/// Lifecycle state of a disk component
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub enum DiskComponentState {
    /// Installed and visible
    Active,

    /// Input of a running merge, hidden from merge policies
    Merging,

    /// Replaced by a merge, waiting for its last reader
    Retired,

    /// Index was deactivated
    Deactivated,

    /// Files are deleted
    Destroyed,
}

/// Immutable on-disk component
#[allow(clippy::module_name_repetitions)]
pub struct DiskComponent {
    id: ComponentId,
    level: usize,
    files: ComponentFileReferences,
    filter: ComponentFilter,
    run: SortedRun,
    refs: ComponentRefs,
    state: Mutex<DiskComponentState>,
    buffer_cache: Arc<dyn BufferCache>,
}

impl std::fmt::Debug for DiskComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DiskComponent{}(L{}, len={}, {:?})",
            self.id,
            self.level,
            self.run.len(),
            self.state(),
        )
    }
}

impl DiskComponent {
    /// Wraps a loaded run.
    #[must_use]
    pub fn new(target: ComponentTarget, run: SortedRun, buffer_cache: Arc<dyn BufferCache>) -> Self {
        let filter = match run.filter() {
            Some((min, max)) => ComponentFilter::with_bounds(min.clone(), max.clone()),
            None => ComponentFilter::default(),
        };

        Self {
            id: target.id,
            level: target.level,
            files: target.files,
            filter,
            run,
            refs: ComponentRefs::new(true, false),
            state: Mutex::new(DiskComponentState::Active),
            buffer_cache,
        }
    }

    /// Component ID
    #[must_use]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Level of the component, 0 for flushed components
    #[must_use]
    pub fn level(&self) -> usize {
        self.level
    }

    /// Files backing the component
    #[must_use]
    pub fn files(&self) -> &ComponentFileReferences {
        &self.files
    }

    /// Paths of all files backing the component
    #[must_use]
    pub fn physical_files(&self) -> Vec<PathBuf> {
        self.files.iter().map(|x| x.path().to_path_buf()).collect()
    }

    /// Min/max filter of the component
    #[must_use]
    pub fn filter(&self) -> &ComponentFilter {
        &self.filter
    }

    /// Reader reference counts
    #[must_use]
    pub fn refs(&self) -> &ComponentRefs {
        &self.refs
    }

    /// Underlying sorted run
    #[must_use]
    pub fn run(&self) -> &SortedRun {
        &self.run
    }

    /// Size of all files in bytes
    #[must_use]
    pub fn size(&self) -> u64 {
        self.run.size_bytes()
    }

    /// Number of entries, tombstones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.run.len()
    }

    /// Returns `true` if the component has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.run.is_empty()
    }

    /// Lowest and highest key
    #[must_use]
    pub fn key_range(&self) -> Option<(Slice, Slice)> {
        self.run.key_range()
    }

    /// Point read, tombstones included.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        self.run.get(key).cloned()
    }

    /// Entries inside the predicate's key bounds, tombstones included.
    #[must_use]
    pub fn range(&self, predicate: &SearchPredicate) -> Vec<Entry> {
        self.run.range(predicate).cloned().collect()
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> DiskComponentState {
        *self.state.lock().expect("lock is poisoned")
    }

    /// Returns `true` if a merge consumes the component.
    #[must_use]
    pub fn is_merging(&self) -> bool {
        self.state() == DiskComponentState::Merging
    }

    /// Marks the component as merge input.
    ///
    /// Returns `false` if the component is not active.
    pub fn mark_merging(&self) -> bool {
        let mut state = self.state.lock().expect("lock is poisoned");

        if *state == DiskComponentState::Active {
            *state = DiskComponentState::Merging;
            true
        } else {
            false
        }
    }

    /// Makes a merge input available again after the merge failed.
    pub fn unmark_merging(&self) {
        let mut state = self.state.lock().expect("lock is poisoned");

        if *state == DiskComponentState::Merging {
            *state = DiskComponentState::Active;
        }
    }

    /// Marks the component as replaced by a merge.
    pub fn retire(&self) {
        *self.state.lock().expect("lock is poisoned") = DiskComponentState::Retired;
        self.refs.set_readable(false);
    }

    /// Detaches the component from a deactivated index, keeping its files.
    pub fn deactivate(&self) {
        *self.state.lock().expect("lock is poisoned") = DiskComponentState::Deactivated;
        self.refs.set_readable(false);
    }

    /// Deletes the component's files.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn destroy(&self) -> crate::Result<()> {
        log::debug!("destroying disk component {}", self.id);

        self.refs.set_readable(false);

        for file in self.files.iter() {
            self.buffer_cache.delete_file(file)?;
        }

        *self.state.lock().expect("lock is poisoned") = DiskComponentState::Destroyed;

        Ok(())
    }

    /// Checks that all files still exist.
    ///
    /// # Errors
    ///
    /// Will return `Err` if a file is missing.
    pub fn validate(&self) -> crate::Result<()> {
        if self.state() == DiskComponentState::Destroyed {
            return Err(Error::InvariantViolation("disk component is destroyed"));
        }

        for file in self.files.iter() {
            if !self.buffer_cache.file_exists(file) {
                log::error!("disk component {} is missing {file}", self.id);
                return Err(Error::InvariantViolation("disk component file is missing"));
            }
        }

        Ok(())
    }
}
