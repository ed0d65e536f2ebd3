// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{component::FileReference, replication::ReplicationManager, Error};
use dashmap::DashMap;
use std::{
    fs::File,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};
use xxhash_rust::xxh3::Xxh3Builder;

/// Page-level access to component files
///
/// The index only creates, opens and deletes whole files through it.
#[allow(clippy::module_name_repetitions)]
pub trait BufferCache: Send + Sync {
    /// Creates (or truncates) a file for writing.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn create_file(&self, file: &FileReference) -> crate::Result<File>;

    /// Opens an existing file for reading.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn open_file(&self, file: &FileReference) -> crate::Result<File>;

    /// Deletes a file.
    ///
    /// Deleting a file that does not exist is not an error.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    fn delete_file(&self, file: &FileReference) -> crate::Result<()>;

    /// Returns `true` if the file exists.
    fn file_exists(&self, file: &FileReference) -> bool;

    /// Replication manager, if replication is enabled.
    fn replication_manager(&self) -> Option<Arc<dyn ReplicationManager>> {
        None
    }

    /// Returns `true` if component files are replicated.
    fn is_replication_enabled(&self) -> bool {
        self.replication_manager()
            .is_some_and(|manager| manager.is_replication_enabled())
    }
}

/// Buffer cache backed by plain files
///
/// Keeps track of the files it handed out, so tests and diagnostics can
/// see what the index still references.
#[derive(Default)]
#[allow(clippy::module_name_repetitions)]
pub struct FileBufferCache {
    files: DashMap<PathBuf, u64, Xxh3Builder>,
    replication: Option<Arc<dyn ReplicationManager>>,
}

impl FileBufferCache {
    /// Creates a new file buffer cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a replication manager.
    #[must_use]
    pub fn with_replication(mut self, manager: Arc<dyn ReplicationManager>) -> Self {
        self.replication = Some(manager);
        self
    }

    /// Number of files currently tracked.
    #[must_use]
    pub fn tracked_files(&self) -> usize {
        self.files.len()
    }
}

impl BufferCache for FileBufferCache {
    fn create_file(&self, file: &FileReference) -> crate::Result<File> {
        log::trace!("buffer cache: creating {file}");

        let handle = File::create(file.path())?;
        self.files.insert(file.path().to_path_buf(), 0);
        Ok(handle)
    }

    fn open_file(&self, file: &FileReference) -> crate::Result<File> {
        let handle = File::open(file.path())?;
        *self.files.entry(file.path().to_path_buf()).or_default() += 1;
        Ok(handle)
    }

    fn delete_file(&self, file: &FileReference) -> crate::Result<()> {
        log::trace!("buffer cache: deleting {file}");

        self.files.remove(file.path());

        match std::fs::remove_file(file.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn file_exists(&self, file: &FileReference) -> bool {
        file.path().try_exists().unwrap_or(false)
    }

    fn replication_manager(&self) -> Option<Arc<dyn ReplicationManager>> {
        self.replication.clone()
    }
}

/// Memory shared by the virtual buffer caches of one or more indexes
#[derive(Clone, Debug)]
pub struct MemoryBudget {
    used: Arc<AtomicU64>,
    limit: u64,
}

impl Default for MemoryBudget {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl MemoryBudget {
    /// Creates a budget of `limit` bytes.
    #[must_use]
    pub fn new(limit: u64) -> Self {
        Self {
            used: Arc::default(),
            limit,
        }
    }

    /// Creates a budget that never runs out.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(u64::MAX)
    }

    /// Bytes currently handed out.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    /// Takes `n` bytes from the budget.
    ///
    /// Returns the counter *after* incrementing.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the budget cannot provide `n` bytes.
    pub fn allocate(&self, n: u64) -> crate::Result<u64> {
        loop {
            let now = self.used.load(Ordering::Acquire);
            let available = self.limit.saturating_sub(now);

            if n > available {
                return Err(Error::CapacityExhausted {
                    requested: n,
                    available,
                });
            }

            if self
                .used
                .compare_exchange(now, now + n, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Ok(now + n);
            }
        }
    }

    /// Gives `n` bytes back to the budget.
    ///
    /// Returns the counter *after* decrementing.
    pub fn free(&self, n: u64) -> u64 {
        loop {
            let now = self.used.load(Ordering::Acquire);
            let subbed = now.saturating_sub(n);

            if self
                .used
                .compare_exchange(now, subbed, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return subbed;
            }
        }
    }
}

/// Memory of a single memory component
pub trait VirtualBufferCache: Send + Sync {
    /// Provisions the memory.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the memory cannot be provided.
    fn open(&self) -> crate::Result<()>;

    /// Gives the memory back.
    fn close(&self);

    /// Forgets all reserved bytes, keeping the memory provisioned.
    fn reset(&self);

    /// Accounts for `bytes` written into the component.
    fn reserve(&self, bytes: u64);

    /// Bytes reserved since the last reset.
    fn usage(&self) -> u64;

    /// Total bytes the cache may hold.
    fn capacity(&self) -> u64;

    /// Returns `true` if the memory is provisioned.
    fn is_open(&self) -> bool;

    /// Returns `true` if the component should be flushed.
    fn is_full(&self) -> bool {
        self.usage() >= self.capacity()
    }
}

/// Virtual buffer cache accounting heap allocations against a [`MemoryBudget`]
#[allow(clippy::module_name_repetitions)]
pub struct HeapVirtualBufferCache {
    capacity: u64,
    used: AtomicU64,
    open: AtomicBool,
    budget: MemoryBudget,
}

impl HeapVirtualBufferCache {
    /// Creates a virtual buffer cache of `capacity` bytes.
    #[must_use]
    pub fn new(capacity: u64, budget: MemoryBudget) -> Self {
        Self {
            capacity,
            used: AtomicU64::default(),
            open: AtomicBool::default(),
            budget,
        }
    }
}

impl VirtualBufferCache for HeapVirtualBufferCache {
    fn open(&self) -> crate::Result<()> {
        if self.open.load(Ordering::Acquire) {
            return Ok(());
        }

        self.budget.allocate(self.capacity)?;
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            self.budget.free(self.capacity);
        }
        self.used.store(0, Ordering::Release);
    }

    fn reset(&self) {
        self.used.store(0, Ordering::Release);
    }

    fn reserve(&self, bytes: u64) {
        self.used.fetch_add(bytes, Ordering::AcqRel);
    }

    fn usage(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn memory_budget_allocate_free() -> crate::Result<()> {
        let budget = MemoryBudget::new(20);
        assert_eq!(5, budget.allocate(5)?);
        assert_eq!(20, budget.allocate(15)?);

        assert!(matches!(
            budget.allocate(1),
            Err(Error::CapacityExhausted {
                requested: 1,
                available: 0
            })
        ));

        assert_eq!(15, budget.free(5));
        assert_eq!(0, budget.free(20));
        Ok(())
    }

    #[test]
    fn heap_vbc_open_close() -> crate::Result<()> {
        let budget = MemoryBudget::new(100);
        let vbc = HeapVirtualBufferCache::new(60, budget.clone());

        vbc.open()?;
        vbc.open()?;
        assert_eq!(60, budget.get());

        vbc.reserve(30);
        assert!(!vbc.is_full());
        vbc.reserve(30);
        assert!(vbc.is_full());

        vbc.reset();
        assert_eq!(0, vbc.usage());

        let other = HeapVirtualBufferCache::new(60, budget.clone());
        assert!(other.open().is_err());

        vbc.close();
        assert_eq!(0, budget.get());
        other.open()?;
        Ok(())
    }

    #[test]
    fn file_buffer_cache_delete_missing() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        let cache = FileBufferCache::new();

        let file = FileReference::new(folder.path().join("a.run"));
        drop(cache.create_file(&file)?);
        assert!(cache.file_exists(&file));
        assert_eq!(1, cache.tracked_files());

        cache.delete_file(&file)?;
        cache.delete_file(&file)?;
        assert!(!cache.file_exists(&file));
        assert_eq!(0, cache.tracked_files());
        Ok(())
    }
}
