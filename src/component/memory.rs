// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{filter::ComponentFilter, id::ComponentId, refs::ComponentRefs};
use crate::{
    buffer_cache::VirtualBufferCache,
    operation::{IndexOperation, SearchPredicate},
    value::{Entry, Slice, UserKey},
    Error,
};
use crossbeam_skiplist::SkipMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

/// Mutable in-memory component
///
/// One slot of the memory component ring. The slot is reused after each
/// flush: it is reset, and activated again once it becomes the current
/// mutable component.
#[allow(clippy::module_name_repetitions)]
pub struct MemoryComponent {
    slot: usize,
    vbc: Arc<dyn VirtualBufferCache>,
    items: SkipMap<UserKey, Entry>,
    filter: ComponentFilter,
    refs: ComponentRefs,
    modified: AtomicBool,
    allocated: AtomicBool,
    requested_activation: AtomicBool,
    flush_id: Mutex<Option<ComponentId>>,
}

impl std::fmt::Debug for MemoryComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MemoryComponent#{}(len={}, modified={}, readable={}, writable={})",
            self.slot,
            self.items.len(),
            self.is_modified(),
            self.refs.is_readable(),
            self.refs.is_writable(),
        )
    }
}

impl MemoryComponent {
    /// Creates an unallocated memory component.
    #[must_use]
    pub fn new(slot: usize, vbc: Arc<dyn VirtualBufferCache>) -> Self {
        Self {
            slot,
            vbc,
            items: SkipMap::new(),
            filter: ComponentFilter::default(),
            refs: ComponentRefs::default(),
            modified: AtomicBool::default(),
            allocated: AtomicBool::default(),
            requested_activation: AtomicBool::default(),
            flush_id: Mutex::default(),
        }
    }

    /// Position of the component in the ring
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Provisions the component's memory.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the virtual buffer cache cannot provide the memory.
    pub fn allocate(&self) -> crate::Result<()> {
        self.vbc.open()?;
        self.allocated.store(true, Ordering::Release);
        Ok(())
    }

    /// Gives the component's memory back and drops its contents.
    pub fn deallocate(&self) {
        self.clear_contents();
        self.refs.set_flags(false, false);
        self.vbc.close();
        self.allocated.store(false, Ordering::Release);
    }

    /// Drops the contents, keeping the memory provisioned.
    ///
    /// The component is neither readable nor writable afterwards.
    pub fn reset(&self) {
        self.clear_contents();
        self.vbc.reset();
        self.refs.set_flags(false, false);
    }

    fn clear_contents(&self) {
        self.items.clear();
        self.filter.reset();
        self.modified.store(false, Ordering::Release);
        *self.flush_id.lock().expect("lock is poisoned") = None;
    }

    /// Checks the component's internal consistency.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the component holds data it should not hold.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.items.is_empty() && !self.is_modified() {
            return Err(Error::InvariantViolation(
                "unmodified memory component holds data",
            ));
        }

        if !self.items.is_empty() && !self.is_allocated() {
            return Err(Error::InvariantViolation(
                "unallocated memory component holds data",
            ));
        }

        Ok(())
    }

    /// Makes the component the writable one.
    pub fn activate(&self) {
        self.requested_activation.store(false, Ordering::Release);
        self.refs.set_flags(true, true);
    }

    /// Marks the component to be activated as soon as it is idle.
    pub fn request_activation(&self) {
        self.requested_activation.store(true, Ordering::Release);
    }

    /// Returns `true` if activation was requested.
    #[must_use]
    pub fn is_activation_requested(&self) -> bool {
        self.requested_activation.load(Ordering::Acquire)
    }

    /// Returns `true` if the component neither accepts readers nor writers.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        !self.refs.is_readable() && !self.refs.is_writable()
    }

    /// Reference counts of the component
    #[must_use]
    pub fn refs(&self) -> &ComponentRefs {
        &self.refs
    }

    /// Min/max filter of the component
    #[must_use]
    pub fn filter(&self) -> &ComponentFilter {
        &self.filter
    }

    /// Returns `true` if the component was written to since the last reset.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::Acquire)
    }

    /// Returns `true` if the memory is provisioned.
    #[must_use]
    pub fn is_allocated(&self) -> bool {
        self.allocated.load(Ordering::Acquire)
    }

    /// Returns `true` if new readers are admitted.
    #[must_use]
    pub fn is_readable(&self) -> bool {
        self.refs.is_readable()
    }

    /// Returns `true` if new writers are admitted.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.refs.is_writable()
    }

    /// Returns `true` if the virtual buffer cache is exhausted.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.vbc.is_full()
    }

    /// Bytes provisioned for the component
    #[must_use]
    pub fn size(&self) -> u64 {
        self.vbc.capacity()
    }

    /// Bytes written since the last reset
    #[must_use]
    pub fn usage(&self) -> u64 {
        self.vbc.usage()
    }

    /// Number of entries, tombstones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the component has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// ID the flushed component will get, once the component is scheduled for flush.
    #[must_use]
    pub fn flush_id(&self) -> Option<ComponentId> {
        *self.flush_id.lock().expect("lock is poisoned")
    }

    /// Assigns the flush ID unless one is assigned already.
    ///
    /// Returns the effective ID.
    pub(crate) fn assign_flush_id(&self, id: impl FnOnce() -> ComponentId) -> ComponentId {
        *self
            .flush_id
            .lock()
            .expect("lock is poisoned")
            .get_or_insert_with(id)
    }

    /// Applies a modification.
    ///
    /// The caller has to be registered as writer.
    pub fn apply(&self, operation: IndexOperation, entry: Entry, filter_value: Option<Slice>) {
        let size = entry.size() as u64;

        if operation == IndexOperation::PhysicalDelete {
            self.items.remove(&entry.key);
        } else {
            self.items.insert(entry.key.clone(), entry);
        }

        if let Some(value) = filter_value {
            self.filter.update(&value);
        }

        self.vbc.reserve(size);
        self.modified.store(true, Ordering::Release);
    }

    /// Point read, tombstones included.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        self.items.get(key).map(|x| x.value().clone())
    }

    /// Entries inside the predicate's key bounds, tombstones included.
    #[must_use]
    pub fn range(&self, predicate: &SearchPredicate) -> Vec<Entry> {
        self.items
            .range((predicate.low.clone(), predicate.high.clone()))
            .map(|x| x.value().clone())
            .collect()
    }

    /// All entries, sorted by key.
    #[must_use]
    pub fn entries(&self) -> Vec<Entry> {
        self.items.iter().map(|x| x.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_cache::{HeapVirtualBufferCache, MemoryBudget};
    use test_log::test;

    fn component(capacity: u64) -> MemoryComponent {
        MemoryComponent::new(
            0,
            Arc::new(HeapVirtualBufferCache::new(capacity, MemoryBudget::unlimited())),
        )
    }

    #[test]
    fn memory_component_apply_and_reset() -> crate::Result<()> {
        let c = component(1_000_000);
        c.allocate()?;
        c.activate();
        assert!(c.is_writable());
        assert!(!c.is_modified());

        c.apply(IndexOperation::Insert, Entry::new("b", "2"), Some("b".into()));
        c.apply(IndexOperation::Insert, Entry::new("a", "1"), Some("a".into()));
        c.apply(IndexOperation::Delete, Entry::new_tombstone("c"), None);

        assert!(c.is_modified());
        assert_eq!(3, c.len());
        assert!(c.get(b"c").is_some_and(|x| x.is_tombstone()));
        assert_eq!(
            Some((Slice::from("a"), Slice::from("b"))),
            c.filter().bounds()
        );
        c.validate()?;

        c.apply(IndexOperation::PhysicalDelete, Entry::new_tombstone("c"), None);
        assert_eq!(2, c.len());

        let keys = c.entries().into_iter().map(|x| x.key).collect::<Vec<_>>();
        assert_eq!(vec![Slice::from("a"), Slice::from("b")], keys);

        c.reset();
        assert!(c.is_empty());
        assert!(!c.is_modified());
        assert!(c.is_idle());
        assert!(c.filter().bounds().is_none());
        Ok(())
    }

    #[test]
    fn memory_component_full() -> crate::Result<()> {
        let c = component(1);
        c.allocate()?;
        assert!(!c.is_full());
        c.apply(IndexOperation::Insert, Entry::new("a", "1"), None);
        assert!(c.is_full());
        Ok(())
    }

    #[test]
    fn memory_component_flush_id_sticks() {
        let c = component(1);
        assert_eq!(None, c.flush_id());
        assert_eq!(
            ComponentId::single(3),
            c.assign_flush_id(|| ComponentId::single(3))
        );
        assert_eq!(
            ComponentId::single(3),
            c.assign_flush_id(|| ComponentId::single(4))
        );
    }
}
