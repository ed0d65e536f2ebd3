// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    buffer_cache::{BufferCache, FileBufferCache, HeapVirtualBufferCache, MemoryBudget, VirtualBufferCache},
    callback::{IoOperationCallback, NoOpIoOperationCallback},
    component::{FilterExtractor, FilterManager, MemoryComponent},
    factory::{ComponentFactory, RunComponentFactory},
    file_manager::{DirectoryFileManager, FileManager},
    index::{IndexParts, IndexVariant, SortedRunVariant},
    io::{IoScheduler, SynchronousScheduler, Tracer},
    merge_policy::{MergePolicy, NoMergePolicy},
    tracker::{FlushingOperationTracker, OperationTracker},
    LsmIndex,
};
use path_absolutize::Absolutize;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Index configuration
///
/// Collaborators that are not set explicitly get working defaults:
/// plain files in the index folder, heap-backed memory components, no merges
/// and IO operations running on the calling thread.
pub struct Config {
    /// Folder path
    pub(crate) path: PathBuf,

    /// Number of memory components in the ring
    ///
    /// Defaults to 2
    pub(crate) memory_component_count: usize,

    /// Capacity of each memory component in bytes
    ///
    /// Defaults to 32 MiB
    pub(crate) memory_component_size: u64,

    /// Shared budget of all memory components
    ///
    /// Defaults to unlimited
    pub(crate) memory_budget: MemoryBudget,

    /// Bloom filter false positive rate
    ///
    /// Defaults to 1%
    pub(crate) bloom_filter_fp_rate: f32,

    /// Sync component files on write
    ///
    /// Defaults to true
    pub(crate) durable: bool,

    /// Keep min/max filters on components
    ///
    /// Defaults to false
    pub(crate) filter: bool,

    pub(crate) filter_extractor: Option<FilterExtractor>,

    /// Primary or secondary index
    ///
    /// Defaults to true
    pub(crate) primary: bool,

    /// Desired size of leveled merge outputs
    ///
    /// Defaults to 64 MiB
    pub(crate) target_component_size: u64,

    pub(crate) trace_category: Option<String>,

    pub(crate) merge_policy: Arc<dyn MergePolicy>,
    pub(crate) io_scheduler: Arc<dyn IoScheduler>,
    pub(crate) io_callback: Arc<dyn IoOperationCallback>,
    pub(crate) operation_tracker: Option<Arc<dyn OperationTracker>>,
    pub(crate) buffer_cache: Option<Arc<dyn BufferCache>>,
    pub(crate) file_manager: Option<Arc<dyn FileManager>>,
    pub(crate) virtual_buffer_caches: Option<Vec<Arc<dyn VirtualBufferCache>>>,
    pub(crate) component_factory: Option<Arc<dyn ComponentFactory>>,
    pub(crate) bulk_load_component_factory: Option<Arc<dyn ComponentFactory>>,
    pub(crate) variant: Arc<dyn IndexVariant>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: ".lsm.data".into(),
            memory_component_count: 2,
            memory_component_size: 32 * 1_024 * 1_024,
            memory_budget: MemoryBudget::default(),
            bloom_filter_fp_rate: 0.01,
            durable: true,
            filter: false,
            filter_extractor: None,
            primary: true,
            target_component_size: 64 * 1_024 * 1_024,
            trace_category: None,
            merge_policy: Arc::new(NoMergePolicy),
            io_scheduler: Arc::new(SynchronousScheduler),
            io_callback: Arc::new(NoOpIoOperationCallback),
            operation_tracker: None,
            buffer_cache: None,
            file_manager: None,
            virtual_buffer_caches: None,
            component_factory: None,
            bulk_load_component_factory: None,
            variant: Arc::new(SortedRunVariant),
        }
    }
}

impl Config {
    /// Initializes a new config
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().into(),
            ..Default::default()
        }
    }

    /// Sets the number of memory components (default: 2)
    ///
    /// # Panics
    ///
    /// Panics if `count` is 0.
    #[must_use]
    pub fn memory_component_count(mut self, count: usize) -> Self {
        assert!(count > 0, "an index needs at least one memory component");

        self.memory_component_count = count;
        self
    }

    /// Sets the capacity of each memory component (default: 32 MiB)
    #[must_use]
    pub fn memory_component_size(mut self, bytes: u64) -> Self {
        self.memory_component_size = bytes;
        self
    }

    /// Sets the budget shared by the memory components (default: unlimited)
    ///
    /// The budget may be shared between indexes.
    #[must_use]
    pub fn memory_budget(mut self, budget: MemoryBudget) -> Self {
        self.memory_budget = budget;
        self
    }

    /// Sets the bloom filter false positive rate (default: 0.01)
    #[must_use]
    pub fn bloom_filter_fp_rate(mut self, rate: f32) -> Self {
        self.bloom_filter_fp_rate = rate;
        self
    }

    /// Syncs component files on write (default: true)
    #[must_use]
    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    /// Keeps min/max filters over the keys of each component (default: false)
    #[must_use]
    pub fn filter(mut self, enabled: bool) -> Self {
        self.filter = enabled;
        self
    }

    /// Keeps min/max filters over a value extracted from each entry
    #[must_use]
    pub fn filter_extractor(mut self, extractor: FilterExtractor) -> Self {
        self.filter = true;
        self.filter_extractor = Some(extractor);
        self
    }

    /// Sets whether the index is primary (default: true)
    ///
    /// Disk component scans are only allowed on primary indexes.
    #[must_use]
    pub fn primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        self
    }

    /// Sets the desired size of leveled merge outputs (default: 64 MiB)
    #[must_use]
    pub fn target_component_size(mut self, bytes: u64) -> Self {
        self.target_component_size = bytes;
        self
    }

    /// Sets the merge policy (default: never merge)
    #[must_use]
    pub fn merge_policy(mut self, policy: Arc<dyn MergePolicy>) -> Self {
        self.merge_policy = policy;
        self
    }

    /// Sets the IO scheduler (default: run on the calling thread)
    #[must_use]
    pub fn io_scheduler(mut self, scheduler: Arc<dyn IoScheduler>) -> Self {
        self.io_scheduler = scheduler;
        self
    }

    /// Sets the default callback of flushes and merges
    #[must_use]
    pub fn io_callback(mut self, callback: Arc<dyn IoOperationCallback>) -> Self {
        self.io_callback = callback;
        self
    }

    /// Sets the operation tracker (default: flush full memory components)
    #[must_use]
    pub fn operation_tracker(mut self, tracker: Arc<dyn OperationTracker>) -> Self {
        self.operation_tracker = Some(tracker);
        self
    }

    /// Sets the buffer cache (default: plain files)
    #[must_use]
    pub fn buffer_cache(mut self, buffer_cache: Arc<dyn BufferCache>) -> Self {
        self.buffer_cache = Some(buffer_cache);
        self
    }

    /// Sets the file manager (default: all files in the index folder)
    #[must_use]
    pub fn file_manager(mut self, file_manager: Arc<dyn FileManager>) -> Self {
        self.file_manager = Some(file_manager);
        self
    }

    /// Sets the virtual buffer caches, one per memory component
    ///
    /// Overrides the memory component count, size and budget.
    #[must_use]
    pub fn virtual_buffer_caches(mut self, caches: Vec<Arc<dyn VirtualBufferCache>>) -> Self {
        self.virtual_buffer_caches = Some(caches);
        self
    }

    /// Sets the factory opening flushed and merged components
    #[must_use]
    pub fn component_factory(mut self, factory: Arc<dyn ComponentFactory>) -> Self {
        self.component_factory = Some(factory);
        self
    }

    /// Sets the factory opening bulk-loaded components
    #[must_use]
    pub fn bulk_load_component_factory(mut self, factory: Arc<dyn ComponentFactory>) -> Self {
        self.bulk_load_component_factory = Some(factory);
        self
    }

    /// Sets the index variant (default: sorted runs)
    #[must_use]
    pub fn variant(mut self, variant: Arc<dyn IndexVariant>) -> Self {
        self.variant = variant;
        self
    }

    /// Logs begin and end of every IO operation under `category`
    #[must_use]
    pub fn trace_category<S: Into<String>>(mut self, category: S) -> Self {
        self.trace_category = Some(category.into());
        self
    }

    /// Builds a read-write index
    ///
    /// The index still has to be created (or activated, if it exists).
    ///
    /// # Errors
    ///
    /// Will return `Err` if the path cannot be resolved.
    pub fn open(self) -> crate::Result<LsmIndex> {
        self.build(false)
    }

    /// Builds a read-only index without memory components
    ///
    /// Data only arrives through bulk loads.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the path cannot be resolved.
    pub fn open_external(self) -> crate::Result<LsmIndex> {
        self.build(true)
    }

    fn build(self, external: bool) -> crate::Result<LsmIndex> {
        let path = self.path.absolutize()?.into_owned();

        log::debug!("opening index at {}", path.display());

        let buffer_cache = self
            .buffer_cache
            .unwrap_or_else(|| Arc::new(FileBufferCache::new()));

        let file_manager = self
            .file_manager
            .unwrap_or_else(|| Arc::new(DirectoryFileManager::new(&path)));

        let component_factory = self
            .component_factory
            .unwrap_or_else(|| Arc::new(RunComponentFactory::new(buffer_cache.clone())));

        let bulk_load_component_factory = self
            .bulk_load_component_factory
            .unwrap_or_else(|| component_factory.clone());

        let memory_components = if external {
            vec![]
        } else {
            let caches = self.virtual_buffer_caches.unwrap_or_else(|| {
                (0..self.memory_component_count)
                    .map(|_| {
                        Arc::new(HeapVirtualBufferCache::new(
                            self.memory_component_size,
                            self.memory_budget.clone(),
                        )) as Arc<dyn VirtualBufferCache>
                    })
                    .collect()
            });

            caches
                .into_iter()
                .enumerate()
                .map(|(slot, vbc)| Arc::new(MemoryComponent::new(slot, vbc)))
                .collect()
        };

        let filter_manager = self.filter.then(|| {
            self.filter_extractor
                .map_or_else(FilterManager::default, FilterManager::new)
        });

        Ok(LsmIndex::from_parts(IndexParts {
            path,
            external,
            durable: self.durable,
            primary: self.primary,
            bloom_filter_fp_rate: self.bloom_filter_fp_rate,
            target_component_size: self.target_component_size,
            buffer_cache,
            file_manager,
            component_factory,
            bulk_load_component_factory,
            io_scheduler: self.io_scheduler,
            io_callback: self.io_callback,
            merge_policy: self.merge_policy,
            operation_tracker: self
                .operation_tracker
                .unwrap_or_else(|| Arc::new(FlushingOperationTracker::default())),
            variant: self.variant,
            filter_manager,
            tracer: self.trace_category.map(Tracer::new),
            memory_components,
        }))
    }
}
