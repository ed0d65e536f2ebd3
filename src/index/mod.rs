// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The LSM index: component lifecycle, selection and installation

mod bulk_load;
mod sorted_run;
mod variant;

pub use bulk_load::BulkLoader;
pub use sorted_run::SortedRunVariant;
pub use variant::IndexVariant;

pub(crate) use sorted_run::compute_filter;

use crate::{
    buffer_cache::BufferCache,
    callback::{BlockingIoOperationCallback, IoOperationCallback},
    component::{
        Component, ComponentId, ComponentIdGenerator, ComponentTarget, DiskComponent,
        FilterManager, IdCompareResult, MemoryComponent,
    },
    error::ErrorCode,
    factory::ComponentFactory,
    file_manager::FileManager,
    harness::Harness,
    io::{IoOperation, IoScheduler, Tracer},
    merge_policy::MergePolicy,
    operation::{IndexOperation, IoOperationType, OperationContext, SearchPredicate},
    replication::{ReplicationExecutionType, ReplicationJob, ReplicationOperation},
    value::{Entry, Slice, UserKey, UserValue},
    Error,
};
use std::{
    collections::{BTreeSet, VecDeque},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Condvar, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
    time::Duration,
};

/// A memory component waiting to be flushed
#[derive(Clone)]
pub(crate) struct PendingFlush {
    pub component: Arc<MemoryComponent>,
    pub operation: IndexOperation,
}

/// Component lists, guarded by the index lock
#[derive(Default)]
pub(crate) struct IndexState {
    /// Newest first
    pub disk_components: Vec<Arc<DiskComponent>>,

    pub inactive_disk_components: Vec<Arc<DiskComponent>>,

    pub levels: Option<Vec<Vec<Arc<DiskComponent>>>>,

    pub ranges_of_levels: Option<Vec<Option<(Slice, Slice)>>>,
}

/// Returns `true` if adjacent components never compare `LessThan` or `Equal`.
#[must_use]
pub fn check_component_ids(components: &[Arc<DiskComponent>]) -> bool {
    components.windows(2).all(|pair| match pair {
        [newer, older] => matches!(
            newer.id().compare(&older.id()),
            IdCompareResult::GreaterThan | IdCompareResult::Unknown
        ),
        _ => true,
    })
}

fn contains_ptr(list: &[Arc<DiskComponent>], c: &Arc<DiskComponent>) -> bool {
    list.iter().any(|x| Arc::ptr_eq(x, c))
}

/// Collaborators and settings an index is built from
pub(crate) struct IndexParts {
    pub path: PathBuf,
    pub external: bool,
    pub durable: bool,
    pub primary: bool,
    pub bloom_filter_fp_rate: f32,
    pub target_component_size: u64,
    pub buffer_cache: Arc<dyn BufferCache>,
    pub file_manager: Arc<dyn FileManager>,
    pub component_factory: Arc<dyn ComponentFactory>,
    pub bulk_load_component_factory: Arc<dyn ComponentFactory>,
    pub io_scheduler: Arc<dyn IoScheduler>,
    pub io_callback: Arc<dyn IoOperationCallback>,
    pub merge_policy: Arc<dyn MergePolicy>,
    pub operation_tracker: Arc<dyn crate::tracker::OperationTracker>,
    pub variant: Arc<dyn IndexVariant>,
    pub filter_manager: Option<FilterManager>,
    pub tracer: Option<Tracer>,
    pub memory_components: Vec<Arc<MemoryComponent>>,
}

#[allow(clippy::module_name_repetitions)]
#[doc(hidden)]
pub struct IndexInner {
    pub(crate) path: PathBuf,
    pub(crate) external: bool,
    pub(crate) durable: bool,
    pub(crate) primary: bool,
    pub(crate) bloom_filter_fp_rate: f32,
    pub(crate) target_component_size: u64,

    pub(crate) buffer_cache: Arc<dyn BufferCache>,
    pub(crate) file_manager: Arc<dyn FileManager>,
    pub(crate) component_factory: Arc<dyn ComponentFactory>,
    pub(crate) bulk_load_component_factory: Arc<dyn ComponentFactory>,
    pub(crate) io_scheduler: Arc<dyn IoScheduler>,
    pub(crate) io_callback: Arc<dyn IoOperationCallback>,
    pub(crate) merge_policy: Arc<dyn MergePolicy>,
    pub(crate) variant: Arc<dyn IndexVariant>,
    pub(crate) filter_manager: Option<FilterManager>,
    pub(crate) tracer: Option<Tracer>,
    pub(crate) harness: Box<dyn Harness>,

    /// Serializes lifecycle verbs
    pub(crate) lifecycle: Mutex<()>,
    pub(crate) is_active: AtomicBool,

    pub(crate) memory_components: Vec<Arc<MemoryComponent>>,
    pub(crate) current_mutable: AtomicUsize,
    pub(crate) flush_requests: Box<[AtomicBool]>,
    pub(crate) memory_components_allocated: AtomicBool,

    pub(crate) state: RwLock<IndexState>,

    /// Memory components sealed for flush, oldest first
    pub(crate) flush_queue: Mutex<VecDeque<PendingFlush>>,

    /// Only one flush installs components at a time
    pub(crate) flush_serializer: Mutex<()>,

    /// Writers waiting for a writable memory component park here
    pub(crate) ring_lock: Mutex<()>,
    pub(crate) ring_cond: Condvar,

    pub(crate) id_generator: ComponentIdGenerator,

    in_flight: Mutex<usize>,
    in_flight_cond: Condvar,
}

/// An LSM index
///
/// Owns a ring of memory components and a newest-first list of disk
/// components. Data-plane operations go through the [`Harness`]; lifecycle
/// verbs are serialized.
///
/// The handle is cheap to clone.
#[derive(Clone)]
pub struct LsmIndex(pub(crate) Arc<IndexInner>);

impl std::ops::Deref for LsmIndex {
    type Target = IndexInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for LsmIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{\"class\" : \"{}\", \"dir\" : \"{}\", \"memory\" : {}, \"disk\" : ",
            self.variant.name(),
            self.path.display(),
            self.memory_components.len(),
        )?;

        // NOTE: Logging happens while the state lock is held, so never block here
        match self.state.try_read() {
            Ok(state) => write!(f, "{}}}", state.disk_components.len()),
            Err(_) => write!(f, "?}}"),
        }
    }
}

impl std::fmt::Debug for LsmIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl LsmIndex {
    pub(crate) fn from_parts(parts: IndexParts) -> Self {
        let levels = parts.merge_policy.max_level().map(|max| max + 1);
        let memory_count = parts.memory_components.len();

        let inner = Arc::new_cyclic(|weak| IndexInner {
            harness: crate::harness::create(
                weak.clone(),
                parts.external,
                levels.is_some(),
                parts.operation_tracker,
                parts.merge_policy.clone(),
            ),
            path: parts.path,
            external: parts.external,
            durable: parts.durable,
            primary: parts.primary,
            bloom_filter_fp_rate: parts.bloom_filter_fp_rate,
            target_component_size: parts.target_component_size,
            buffer_cache: parts.buffer_cache,
            file_manager: parts.file_manager,
            component_factory: parts.component_factory,
            bulk_load_component_factory: parts.bulk_load_component_factory,
            io_scheduler: parts.io_scheduler,
            io_callback: parts.io_callback,
            merge_policy: parts.merge_policy,
            variant: parts.variant,
            filter_manager: parts.filter_manager,
            tracer: parts.tracer,
            lifecycle: Mutex::default(),
            is_active: AtomicBool::default(),
            memory_components: parts.memory_components,
            current_mutable: AtomicUsize::default(),
            flush_requests: (0..memory_count).map(|_| AtomicBool::default()).collect(),
            memory_components_allocated: AtomicBool::default(),
            state: RwLock::new(IndexState {
                levels: levels.map(|n| vec![vec![]; n]),
                ranges_of_levels: levels.map(|n| vec![None; n]),
                ..Default::default()
            }),
            flush_queue: Mutex::default(),
            flush_serializer: Mutex::default(),
            ring_lock: Mutex::default(),
            ring_cond: Condvar::new(),
            id_generator: ComponentIdGenerator::default(),
            in_flight: Mutex::new(0),
            in_flight_cond: Condvar::new(),
        });

        Self(inner)
    }

    pub(crate) fn read_state(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().expect("lock is poisoned")
    }

    pub(crate) fn write_state(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.state.write().expect("lock is poisoned")
    }

    pub(crate) fn enter_io(&self) {
        *self.in_flight.lock().expect("lock is poisoned") += 1;
    }

    pub(crate) fn exit_io(&self) {
        let mut count = self.in_flight.lock().expect("lock is poisoned");
        *count = count.saturating_sub(1);
        self.in_flight_cond.notify_all();
    }

    fn wait_for_in_flight_io(&self) {
        let mut count = self.in_flight.lock().expect("lock is poisoned");

        while *count > 0 {
            log::trace!("{self}: waiting for {} in-flight IO operation(s)", *count);
            count = self
                .in_flight_cond
                .wait(count)
                .expect("lock is poisoned");
        }
    }

    // --- Lifecycle ---

    /// Creates the index directory and starts with no disk components.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the index is active, or an IO error occurs.
    pub fn create(&self) -> crate::Result<()> {
        let _lock = self.lifecycle.lock().expect("lock is poisoned");

        if self.is_active() {
            return Err(ErrorCode::CannotCreateActiveIndex.into());
        }

        log::debug!("{self}: create");

        self.file_manager.create_dirs()?;

        let mut state = self.write_state();
        state.disk_components.clear();
        Self::clear_levels(&mut state);

        Ok(())
    }

    /// Loads the valid disk components and makes the index usable.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the index is active, or an IO error occurs.
    pub fn activate(&self) -> crate::Result<()> {
        let _lock = self.lifecycle.lock().expect("lock is poisoned");

        if self.is_active() {
            return Err(ErrorCode::CannotActivateActiveIndex.into());
        }

        log::debug!("{self}: activate");

        let targets = self.file_manager.cleanup_and_get_valid_files()?;

        let mut components = Vec::with_capacity(targets.len());
        for target in targets {
            let component = self.component_factory.create_component(target)?;
            self.id_generator.observe(component.id().max);
            components.push(component);
        }

        let mut state = self.write_state();
        state.disk_components.clear();
        state.inactive_disk_components.clear();
        Self::clear_levels(&mut state);

        for component in components {
            state.disk_components.push(component.clone());
            Self::insert_into_level(&mut state, component, false);
        }

        self.recompute_ranges_of_levels(&mut state);

        log::debug!(
            "{self}: recovered {} disk component(s)",
            state.disk_components.len()
        );

        debug_assert!(check_component_ids(&state.disk_components));
        drop(state);

        for flag in &*self.flush_requests {
            flag.store(false, Ordering::Release);
        }

        self.is_active.store(true, Ordering::Release);

        Ok(())
    }

    /// Deactivates the index, optionally flushing the memory components first.
    ///
    /// Waits for in-flight IO operations. Disk components keep their files.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the index is inactive, or the flush failed.
    pub fn deactivate(&self, flush: bool) -> crate::Result<()> {
        let _lock = self.lifecycle.lock().expect("lock is poisoned");

        if !self.is_active() {
            return Err(ErrorCode::CannotDeactivateInactiveIndex.into());
        }

        log::debug!("{self}: deactivate (flush={flush})");

        if flush && self.is_memory_components_allocated() {
            let callback = Arc::new(BlockingIoOperationCallback::new(self.io_callback.clone()));

            if self
                .harness
                .schedule_flush(IndexOperation::Flush, callback.clone())?
            {
                callback.wait_for_io()?;
            }
        }

        self.wait_for_in_flight_io();

        {
            let state = self.write_state();
            for component in &state.disk_components {
                component.deactivate();
            }
        }

        if let Err(e) = self.drain_inactive_disk_components() {
            log::warn!("{self}: failed to destroy retired components: {e:?}");
        }

        self.deallocate_memory_components();
        self.is_active.store(false, Ordering::Release);
        self.ring_cond.notify_all();

        Ok(())
    }

    /// Deletes all disk components and the index directory.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the index is active, or an IO error occurs.
    pub fn destroy(&self) -> crate::Result<()> {
        let _lock = self.lifecycle.lock().expect("lock is poisoned");

        if self.is_active() {
            return Err(ErrorCode::CannotDestroyActiveIndex.into());
        }

        log::debug!("{self}: destroy");

        let mut state = self.write_state();

        for component in state
            .disk_components
            .iter()
            .chain(&state.inactive_disk_components)
        {
            component.destroy()?;
        }

        state.disk_components.clear();
        state.inactive_disk_components.clear();
        Self::clear_levels(&mut state);
        drop(state);

        self.file_manager.delete_dirs()
    }

    /// Drops all data, in memory and on disk, keeping the index active.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the index is inactive, or an IO error occurs.
    pub fn clear(&self) -> crate::Result<()> {
        let _lock = self.lifecycle.lock().expect("lock is poisoned");

        if !self.is_active() {
            return Err(ErrorCode::CannotClearInactiveIndex.into());
        }

        log::debug!("{self}: clear");

        self.wait_for_in_flight_io();

        let mut state = self.write_state();

        if self.is_memory_components_allocated() {
            self.flush_queue.lock().expect("lock is poisoned").clear();

            for component in &self.memory_components {
                component.refs().wait_for_writers();
                component.reset();
            }

            if let Some(current) = self.current_memory_component() {
                current.activate();
            }

            self.ring_cond.notify_all();
        }

        for flag in &*self.flush_requests {
            flag.store(false, Ordering::Release);
        }

        for component in &state.disk_components {
            component.deactivate();
            component.destroy()?;
        }

        state.disk_components.clear();
        Self::clear_levels(&mut state);

        Ok(())
    }

    /// Does nothing.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn purge(&self) -> crate::Result<()> {
        Ok(())
    }

    /// Provisions the memory components.
    ///
    /// If one allocation fails, the components allocated so far are released
    /// in reverse order.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the index is inactive, or memory cannot be provided.
    pub fn allocate_memory_components(&self) -> crate::Result<()> {
        let _lock = self.lifecycle.lock().expect("lock is poisoned");

        if !self.is_active() {
            return Err(ErrorCode::CannotAllocateMemoryForInactiveIndex.into());
        }

        if self.is_memory_components_allocated() || self.memory_components.is_empty() {
            return Ok(());
        }

        for (i, component) in self.memory_components.iter().enumerate() {
            let result = component.allocate().and_then(|()| {
                self.io_callback.allocated(component).inspect_err(|_| {
                    component.deallocate();
                })
            });

            if let Err(e) = result {
                log::error!("{self}: failed to allocate memory component #{i}: {e:?}");

                for allocated in self.memory_components.iter().take(i).rev() {
                    allocated.deallocate();
                }

                return Err(e);
            }
        }

        if let Some(current) = self.current_memory_component() {
            current.activate();
        }

        self.memory_components_allocated
            .store(true, Ordering::Release);

        log::debug!("{self}: allocated {} bytes", self.memory_allocation_size());

        Ok(())
    }

    fn deallocate_memory_components(&self) {
        if !self.is_memory_components_allocated() {
            return;
        }

        self.flush_queue.lock().expect("lock is poisoned").clear();

        for component in &self.memory_components {
            component.deallocate();
        }

        self.memory_components_allocated
            .store(false, Ordering::Release);
    }

    /// Checks memory components, disk components and their ordering.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an invariant is broken, or a component file is missing.
    pub fn validate(&self) -> crate::Result<()> {
        if self.is_memory_components_allocated() {
            for component in &self.memory_components {
                component.validate()?;
            }

            let writable = self
                .memory_components
                .iter()
                .filter(|c| c.is_writable())
                .count();

            if writable > 1 {
                return Err(Error::InvariantViolation(
                    "more than one writable memory component",
                ));
            }
        }

        let state = self.read_state();

        for component in &state.disk_components {
            component.validate()?;
        }

        if !check_component_ids(&state.disk_components) {
            return Err(Error::InvariantViolation("disk component IDs out of order"));
        }

        if let Some(levels) = &state.levels {
            let count = levels.iter().map(Vec::len).sum::<usize>();

            let all_installed = levels
                .iter()
                .flatten()
                .all(|c| contains_ptr(&state.disk_components, c));

            if count != state.disk_components.len() || !all_installed {
                return Err(Error::InvariantViolation(
                    "levels do not match disk components",
                ));
            }
        }

        if state
            .inactive_disk_components
            .iter()
            .any(|c| contains_ptr(&state.disk_components, c))
        {
            return Err(Error::InvariantViolation(
                "retired component is still installed",
            ));
        }

        Ok(())
    }

    // --- Selection ---

    /// Fills the context's component holder with the components the
    /// operation has to see, newest first.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the operation does not select components.
    pub fn get_operational_components(&self, ctx: &mut OperationContext) -> crate::Result<()> {
        let state = self.read_state();
        self.select_components(&state, ctx)
    }

    pub(crate) fn select_components(
        &self,
        state: &IndexState,
        ctx: &mut OperationContext,
    ) -> crate::Result<()> {
        let cmc = self.current_memory_component_index();
        ctx.current_mutable_component_id = cmc;
        ctx.component_holder.clear();

        match ctx.operation {
            IndexOperation::Update
            | IndexOperation::PhysicalDelete
            | IndexOperation::Flush
            | IndexOperation::DeleteMemoryComponent
            | IndexOperation::Delete
            | IndexOperation::Upsert => {
                let component = self
                    .memory_components
                    .get(cmc)
                    .ok_or(Error::UnsupportedOperation(ctx.operation))?;

                ctx.component_holder
                    .push(Component::Memory(component.clone()));
            }
            IndexOperation::Insert => {
                if self.memory_components.is_empty() {
                    return Err(Error::UnsupportedOperation(ctx.operation));
                }

                self.add_operational_mutable_components(ctx, cmc, true);

                ctx.component_holder
                    .extend(state.disk_components.iter().cloned().map(Component::Disk));
            }
            IndexOperation::Search => {
                if self.is_memory_components_allocated() {
                    self.add_operational_mutable_components(ctx, cmc, false);
                }

                let (min, max) = ctx
                    .search_predicate
                    .as_ref()
                    .map(|p| (p.min_filter.clone(), p.max_filter.clone()))
                    .unwrap_or_default();

                let use_filter =
                    self.filter_manager.is_some() && (min.is_some() || max.is_some());

                for component in &state.disk_components {
                    if !use_filter
                        || component
                            .filter()
                            .satisfy(min.as_deref(), max.as_deref())
                    {
                        ctx.component_holder
                            .push(Component::Disk(component.clone()));
                    }
                }
            }
            IndexOperation::Merge | IndexOperation::DeleteDiskComponents => {
                let components = ctx
                    .components_to_be_merged
                    .iter()
                    .chain(&ctx.component_picked_to_be_merged_from_prev_level)
                    .cloned()
                    .map(Component::Disk)
                    .collect::<Vec<_>>();

                ctx.component_holder.extend(components);
            }
            IndexOperation::FullMerge | IndexOperation::DiskComponentScan => {
                ctx.component_holder
                    .extend(state.disk_components.iter().cloned().map(Component::Disk));
            }
            IndexOperation::Replicate => {
                let components = ctx
                    .components_to_be_replicated
                    .iter()
                    .cloned()
                    .map(Component::Disk)
                    .collect::<Vec<_>>();

                ctx.component_holder.extend(components);
            }
            IndexOperation::Create | IndexOperation::DiskOrderScan | IndexOperation::NoOp => {
                return Err(Error::UnsupportedOperation(ctx.operation));
            }
        }

        Ok(())
    }

    fn add_operational_mutable_components(
        &self,
        ctx: &mut OperationContext,
        cmc: usize,
        modification: bool,
    ) {
        let count = self.memory_components.len();

        // NOTE: Oldest first, each one is prepended, so the newest ends up in front
        for i in 0..count.saturating_sub(1) {
            if let Some(component) = self.memory_components.get((cmc + i + 1) % count) {
                if component.is_readable() {
                    ctx.component_holder
                        .insert(0, Component::Memory(component.clone()));
                }
            }
        }

        if let Some(component) = self.memory_components.get(cmc) {
            if modification || component.is_readable() {
                ctx.component_holder
                    .insert(0, Component::Memory(component.clone()));
            }
        }
    }

    // --- Mutable component ring ---

    /// Advances the current mutable component to the next ring slot.
    ///
    /// The previous component has to be scheduled for flush already.
    pub fn change_mutable_component(&self) {
        let _state = self.write_state();
        self.advance_mutable_component();
    }

    pub(crate) fn advance_mutable_component(&self) {
        let count = self.memory_components.len();
        if count == 0 {
            return;
        }

        let next = (self.current_memory_component_index() + 1) % count;
        self.current_mutable.store(next, Ordering::Release);

        if let Some(component) = self.memory_components.get(next) {
            let _ring = self.ring_lock.lock().expect("lock is poisoned");

            component.request_activation();

            if component.is_idle() && component.is_allocated() {
                component.activate();
            }
        }

        log::trace!("{self}: current mutable component is now #{next}");

        self.ring_cond.notify_all();
    }

    /// Waits until the current mutable component admits a writer, and enters it.
    pub(crate) fn enter_mutable_component(
        &self,
        operation: IndexOperation,
    ) -> crate::Result<(usize, Arc<MemoryComponent>)> {
        loop {
            let slot = self.current_memory_component_index();

            let component = self
                .memory_components
                .get(slot)
                .ok_or(Error::UnsupportedOperation(operation))?;

            if component.refs().try_enter_writer() {
                return Ok((slot, component.clone()));
            }

            if !self.is_active() || !self.is_memory_components_allocated() {
                return Err(Error::InvariantViolation("index is not active"));
            }

            log::trace!("{self}: waiting for memory component #{slot} to become writable");

            let ring = self.ring_lock.lock().expect("lock is poisoned");
            let _ = self
                .ring_cond
                .wait_timeout(ring, Duration::from_millis(10))
                .expect("lock is poisoned");
        }
    }

    /// Sets or clears the flush request of the current mutable component.
    pub fn change_flush_status_for_current_mutable_component(&self, requested: bool) {
        if let Some(flag) = self
            .flush_requests
            .get(self.current_memory_component_index())
        {
            flag.store(requested, Ordering::Release);
        }
    }

    /// Returns `true` if the current mutable component was asked to flush.
    #[must_use]
    pub fn has_flush_request_for_current_mutable_component(&self) -> bool {
        self.flush_requests
            .get(self.current_memory_component_index())
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    pub(crate) fn request_flush(&self, slot: usize) {
        if let Some(flag) = self.flush_requests.get(slot) {
            flag.store(true, Ordering::Release);
        }
    }

    // --- Scheduling ---

    /// Seals a memory component and queues it for flush, assigning its flush ID.
    pub(crate) fn enqueue_flush(
        &self,
        component: &Arc<MemoryComponent>,
        operation: IndexOperation,
    ) -> ComponentId {
        component.refs().seal();

        let mut queue = self.flush_queue.lock().expect("lock is poisoned");

        // NOTE: IDs are assigned under the queue lock, so queue order matches ID order
        let id =
            component.assign_flush_id(|| ComponentId::single(self.id_generator.next()));

        if !queue
            .iter()
            .any(|x| Arc::ptr_eq(&x.component, component))
        {
            queue.push_back(PendingFlush {
                component: component.clone(),
                operation,
            });
        }

        id
    }

    /// Returns `true` if a sealed memory component waits for its flush.
    #[must_use]
    pub fn has_pending_flush(&self) -> bool {
        !self.flush_queue.lock().expect("lock is poisoned").is_empty()
    }

    pub(crate) fn flush_target(&self, id: ComponentId) -> ComponentTarget {
        ComponentTarget {
            id,
            level: 0,
            files: self.file_manager.flush_file_references(id),
        }
    }

    fn submit(&self, op: IoOperation) -> crate::Result<()> {
        let op = match &self.tracer {
            Some(tracer) => tracer.wrap(op),
            None => op,
        };

        log::trace!("{self}: submitting {op:?}");

        self.io_scheduler.schedule_operation(op)
    }

    /// Schedules a flush of the memory component in the context's holder.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the holder has no memory component, or the
    /// scheduler rejected the operation.
    pub fn schedule_flush(
        &self,
        ctx: &OperationContext,
        callback: Arc<dyn IoOperationCallback>,
    ) -> crate::Result<()> {
        let component = ctx
            .component_holder
            .iter()
            .find_map(Component::as_memory)
            .ok_or(Error::InvariantViolation("flush needs a memory component"))?;

        let id = self.enqueue_flush(component, ctx.operation);

        let mut flush_ctx = self.variant.create_op_context(ctx.operation);
        flush_ctx.component_holder.clone_from(&ctx.component_holder);
        flush_ctx.io_operation_type = IoOperationType::Flush;

        let op = IoOperation::new(
            IoOperationType::Flush,
            flush_ctx,
            vec![self.flush_target(id)],
            false,
            callback,
            self.clone(),
        );

        self.submit(op)
    }

    /// Schedules a merge of the disk components in the context's holder
    /// (newest first).
    ///
    /// # Errors
    ///
    /// Will return `Err` if the holder has no disk components, or the
    /// scheduler rejected the operation.
    pub fn schedule_merge(
        &self,
        ctx: &OperationContext,
        callback: Arc<dyn IoOperationCallback>,
    ) -> crate::Result<()> {
        let mut inputs = ctx.disk_components().cloned().collect::<Vec<_>>();
        if inputs.is_empty() {
            inputs.clone_from(&ctx.components_to_be_merged);
        }

        let (Some(first), Some(last)) = (inputs.first(), inputs.last()) else {
            return Err(Error::InvariantViolation("merge needs disk components"));
        };

        let target = self
            .variant
            .merge_file_references(self.file_manager.as_ref(), first, last);

        let mut merge_ctx = self.variant.create_op_context(ctx.operation);
        merge_ctx.component_holder = inputs.iter().cloned().map(Component::Disk).collect();
        merge_ctx.components_to_be_merged = inputs;
        merge_ctx.io_operation_type = IoOperationType::Merge;

        let op = IoOperation::new(
            IoOperationType::Merge,
            merge_ctx,
            vec![target],
            false,
            callback,
            self.clone(),
        );

        self.submit(op)
    }

    /// Schedules a leveled merge of the components picked from the previous
    /// level into the overlapping components of `ctx.dest_level`.
    ///
    /// The number of outputs follows from the payload size and the target
    /// component size.
    ///
    /// # Errors
    ///
    /// Will return `Err` if there is nothing to merge, or the scheduler
    /// rejected the operation.
    pub fn schedule_leveled_merge(
        &self,
        ctx: &OperationContext,
        callback: Arc<dyn IoOperationCallback>,
    ) -> crate::Result<()> {
        let picked = &ctx.component_picked_to_be_merged_from_prev_level;
        let to_be_merged = &ctx.components_to_be_merged;

        if picked.is_empty() && to_be_merged.is_empty() {
            return Err(Error::InvariantViolation("merge needs disk components"));
        }

        let payload = picked
            .iter()
            .chain(to_be_merged)
            .map(|c| c.run().payload_size())
            .sum::<u64>();

        let output_count = payload
            .div_ceil(self.target_component_size.max(1))
            .max(1);

        #[allow(clippy::cast_possible_truncation)]
        let targets = self.variant.leveled_merge_file_references(
            self.file_manager.as_ref(),
            to_be_merged,
            picked,
            ctx.dest_level,
            output_count as usize,
        );

        log::debug!(
            "{self}: leveled merge of {} + {} component(s) into {} output(s) at L{}",
            picked.len(),
            to_be_merged.len(),
            targets.len(),
            ctx.dest_level
        );

        let mut merge_ctx = self.variant.create_op_context(ctx.operation);
        merge_ctx.component_holder = picked
            .iter()
            .chain(to_be_merged)
            .cloned()
            .map(Component::Disk)
            .collect();
        merge_ctx
            .components_to_be_merged
            .clone_from(to_be_merged);
        merge_ctx
            .component_picked_to_be_merged_from_prev_level
            .clone_from(picked);
        merge_ctx.dest_level = ctx.dest_level;
        merge_ctx.io_operation_type = IoOperationType::Merge;

        let op = IoOperation::new(
            IoOperationType::Merge,
            merge_ctx,
            targets,
            true,
            callback,
            self.clone(),
        );

        self.submit(op)
    }

    /// Submits the physical files of `components` to the replication manager.
    ///
    /// Bulk loads replicate synchronously, everything else asynchronously.
    /// Does nothing if replication is disabled.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the replication manager rejected the job.
    pub fn schedule_replication(
        &self,
        ctx: &OperationContext,
        components: &[Arc<DiskComponent>],
        bulkload: bool,
        operation: ReplicationOperation,
        op_type: IoOperationType,
    ) -> crate::Result<()> {
        let manager = match self.buffer_cache.replication_manager() {
            Some(manager) if manager.is_replication_enabled() => manager,
            _ => {
                log::trace!("{self}: replication is disabled");
                return Ok(());
            }
        };

        let files = components
            .iter()
            .flat_map(|c| c.physical_files())
            .collect::<BTreeSet<_>>();

        log::debug!(
            "{self}: replicating {} file(s) after {} ({:?})",
            files.len(),
            ctx.operation,
            operation
        );

        manager.submit_job(ReplicationJob {
            index_dir: self.path.clone(),
            files,
            operation,
            execution_type: if bulkload {
                ReplicationExecutionType::Sync
            } else {
                ReplicationExecutionType::Async
            },
            op_type,
        })
    }

    // --- Execution ---

    /// Writes the memory component of a flush operation to disk.
    ///
    /// Returns `None` when deleting a memory component.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the flush failed; the output files are deleted.
    pub fn flush(&self, op: &IoOperation) -> crate::Result<Option<Arc<DiskComponent>>> {
        let component = op
            .context()
            .component_holder
            .iter()
            .find_map(Component::as_memory)
            .ok_or(Error::InvariantViolation("flush needs a memory component"))?;

        let target = op
            .targets()
            .first()
            .ok_or(Error::InvariantViolation("flush needs a target"))?;

        self.flush_component(op.context().operation, component, target)
    }

    pub(crate) fn flush_component(
        &self,
        operation: IndexOperation,
        component: &MemoryComponent,
        target: &ComponentTarget,
    ) -> crate::Result<Option<Arc<DiskComponent>>> {
        if operation == IndexOperation::DeleteMemoryComponent {
            log::debug!("{self}: dropping contents of {component:?}");
            return Ok(None);
        }

        log::debug!("{self}: flushing {component:?} into {}", target.id);

        self.variant
            .do_flush(self, component, target)
            .map(Some)
            .map_err(|e| self.cleanup_files(std::slice::from_ref(target), e))
    }

    /// Merges the disk components of a merge operation.
    ///
    /// Returns `None` when deleting disk components.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the merge failed; the output files are deleted.
    pub fn merge(&self, op: &IoOperation) -> crate::Result<Option<Arc<DiskComponent>>> {
        let ctx = op.context();

        if ctx.operation == IndexOperation::DeleteDiskComponents {
            return Ok(None);
        }

        let target = op
            .targets()
            .first()
            .ok_or(Error::InvariantViolation("merge needs a target"))?;

        let drop_tombstones = ctx.operation == IndexOperation::FullMerge;

        log::debug!(
            "{self}: merging {} component(s) into {}",
            ctx.components_to_be_merged.len(),
            target.id
        );

        self.variant
            .do_merge(self, &ctx.components_to_be_merged, target, drop_tombstones)
            .map(Some)
            .map_err(|e| self.cleanup_files(op.targets(), e))
    }

    /// Merges the disk components of a leveled merge operation.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the merge failed; the output files are deleted.
    pub fn leveled_merge(&self, op: &IoOperation) -> crate::Result<Vec<Arc<DiskComponent>>> {
        let ctx = op.context();

        if ctx.operation != IndexOperation::Merge {
            return Ok(vec![]);
        }

        let inputs = Self::leveled_merge_inputs(ctx);

        self.variant
            .do_leveled_merge(self, &inputs, op.targets())
            .map_err(|e| self.cleanup_files(op.targets(), e))
    }

    /// Inputs of a leveled merge, newest first.
    pub(crate) fn leveled_merge_inputs(ctx: &OperationContext) -> Vec<Arc<DiskComponent>> {
        let mut picked = ctx.component_picked_to_be_merged_from_prev_level.clone();
        picked.sort_by(|a, b| b.id().max.cmp(&a.id().max));

        picked
            .into_iter()
            .chain(ctx.components_to_be_merged.iter().cloned())
            .collect()
    }

    /// Deletes the files of failed outputs; cleanup errors are kept as suppressed causes.
    pub(crate) fn cleanup_files(&self, targets: &[ComponentTarget], cause: Error) -> Error {
        log::error!("{self}: IO operation failed: {cause:?}");

        let mut suppressed = vec![];

        for target in targets {
            for file in target.files.iter() {
                if let Err(e) = self.buffer_cache.delete_file(file) {
                    log::error!("{self}: failed to delete {file}: {e:?}");
                    suppressed.push(e);
                }
            }
        }

        Error::operation_failed(cause, suppressed)
    }

    // --- Installation ---

    /// Installs a new disk component as the newest one.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the component breaks the ID ordering, the index is left unchanged.
    pub fn add_disk_component(&self, component: Option<Arc<DiskComponent>>) -> crate::Result<()> {
        let mut state = self.write_state();
        Self::add_disk_component_locked(&mut state, component)
    }

    pub(crate) fn add_disk_component_locked(
        state: &mut IndexState,
        component: Option<Arc<DiskComponent>>,
    ) -> crate::Result<()> {
        let Some(component) = component else {
            return Ok(());
        };

        if let Some(newest) = state.disk_components.first() {
            if !check_component_ids(&[component.clone(), newest.clone()]) {
                log::error!("refusing to install {component:?} in front of {newest:?}");
                return Err(Error::InvariantViolation("disk component IDs out of order"));
            }
        }

        log::trace!("installing {component:?}");

        state.disk_components.insert(0, component.clone());
        Self::insert_into_level(state, component, true);

        Ok(())
    }

    /// Replaces the merged components with the merge output.
    ///
    /// The output takes the position of the newest merged component.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the merged components are not installed, or the output
    /// breaks the ID ordering. The index is left unchanged on error.
    pub fn subsume_merged_components(
        &self,
        new_component: Option<Arc<DiskComponent>>,
        merged: &[Arc<DiskComponent>],
    ) -> crate::Result<()> {
        let mut state = self.write_state();
        self.subsume_locked(&mut state, new_component.into_iter().collect(), merged)
    }

    /// Replaces the merged components with the outputs of a leveled merge.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the merged components are not installed, or the outputs
    /// break the ID ordering. The index is left unchanged on error.
    pub fn subsume_leveled_merged_components(
        &self,
        new_components: Vec<Arc<DiskComponent>>,
        merged: &[Arc<DiskComponent>],
    ) -> crate::Result<()> {
        let mut state = self.write_state();
        self.subsume_locked(&mut state, new_components, merged)
    }

    pub(crate) fn subsume_locked(
        &self,
        state: &mut IndexState,
        new_components: Vec<Arc<DiskComponent>>,
        merged: &[Arc<DiskComponent>],
    ) -> crate::Result<()> {
        let position = state
            .disk_components
            .iter()
            .position(|c| contains_ptr(merged, c))
            .ok_or(Error::InvariantViolation("merged components are not installed"))?;

        if merged
            .iter()
            .any(|c| !contains_ptr(&state.disk_components, c))
        {
            return Err(Error::InvariantViolation("merged components are not installed"));
        }

        let mut candidate = state
            .disk_components
            .iter()
            .filter(|c| !contains_ptr(merged, c))
            .cloned()
            .collect::<Vec<_>>();

        for (offset, component) in new_components.iter().enumerate() {
            candidate.insert(position + offset, component.clone());
        }

        if !check_component_ids(&candidate) {
            return Err(Error::InvariantViolation("disk component IDs out of order"));
        }

        state.disk_components = candidate;

        if let Some(levels) = &mut state.levels {
            for level in levels {
                level.retain(|c| !contains_ptr(merged, c));
            }
        }

        for component in new_components {
            Self::insert_into_level(state, component, false);
        }

        self.recompute_ranges_of_levels(state);

        Ok(())
    }

    fn insert_into_level(state: &mut IndexState, component: Arc<DiskComponent>, newest: bool) {
        let Some(levels) = &mut state.levels else {
            return;
        };

        let max_level = levels.len().saturating_sub(1);
        let level = component.level().min(max_level);

        if level != component.level() {
            log::warn!("{component:?} is deeper than the deepest level, placing it at L{level}");
        }

        let Some(bucket) = levels.get_mut(level) else {
            return;
        };

        if newest || level == 0 {
            bucket.insert(if newest { 0 } else { bucket.len() }, component);
        } else {
            // NOTE: Levels >= 1 are kept sorted by key range
            let key = component.key_range().map(|(min, _)| min);
            let pos = bucket.partition_point(|c| c.key_range().map(|(min, _)| min) <= key);
            bucket.insert(pos, component);
        }
    }

    fn clear_levels(state: &mut IndexState) {
        if let Some(levels) = &mut state.levels {
            for level in levels {
                level.clear();
            }
        }

        if let Some(ranges) = &mut state.ranges_of_levels {
            for range in ranges {
                *range = None;
            }
        }
    }

    fn recompute_ranges_of_levels(&self, state: &mut IndexState) {
        let Some(levels) = &state.levels else {
            return;
        };

        state.ranges_of_levels = Some(
            levels
                .iter()
                .enumerate()
                .map(|(i, level)| {
                    if i == 0 {
                        None
                    } else {
                        self.variant.compute_range_of_level(level)
                    }
                })
                .collect(),
        );
    }

    /// Destroys retired components nobody reads anymore.
    ///
    /// Returns the number of destroyed components.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn drain_inactive_disk_components(&self) -> crate::Result<usize> {
        let idle = {
            let mut state = self.write_state();

            let (idle, busy): (Vec<_>, Vec<_>) = std::mem::take(&mut state.inactive_disk_components)
                .into_iter()
                .partition(|c| c.refs().readers() == 0);

            state.inactive_disk_components = busy;
            idle
        };

        let mut result = Ok(idle.len());

        for component in idle {
            log::trace!("{self}: destroying retired {component:?}");

            if let Err(e) = component.destroy() {
                log::error!("{self}: failed to destroy {component:?}: {e:?}");
                result = Err(e);
            }
        }

        result
    }

    /// Adds a component replaced by a merge, to be destroyed once idle.
    pub fn add_inactive_disk_component(&self, component: Arc<DiskComponent>) {
        component.retire();
        self.write_state().inactive_disk_components.push(component);
    }

    // --- Bulk load ---

    /// Creates a target for a bulk-loaded component, with a fresh ID.
    #[must_use]
    pub fn create_bulk_load_target(&self) -> ComponentTarget {
        self.flush_target(ComponentId::single(self.id_generator.next()))
    }

    /// Starts a bulk load into a new disk component.
    ///
    /// `fill_factor` and `num_elements_hint` size the loader's buffer.
    /// The component ID is taken in [`BulkLoader::end`], so flushes installed
    /// while the loader is open stay older than the loaded component.
    ///
    /// # Errors
    ///
    /// Will return `Err` if `check_if_empty_index` is set and the index holds data,
    /// a flush is pending, or the IO callback rejected the load.
    pub fn create_bulk_loader(
        &self,
        fill_factor: f32,
        verify_input: bool,
        num_elements_hint: usize,
        check_if_empty_index: bool,
    ) -> crate::Result<BulkLoader> {
        if check_if_empty_index && !self.is_empty_index() {
            return Err(ErrorCode::LoadNonEmptyIndex.into());
        }

        // NOTE: A pending flush holds an older ID than any load could install in front of it
        if self.has_pending_flush() {
            log::warn!("{self}: refusing bulk load while a flush is pending");
            return Err(ErrorCode::LoadNonEmptyIndex.into());
        }

        self.io_callback.before_operation(IoOperationType::Load)?;

        Ok(BulkLoader::new(
            self.clone(),
            fill_factor,
            verify_input,
            num_elements_hint,
        ))
    }

    // --- Data plane ---

    /// Inserts a key-value pair.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the index is inactive or read-only, or memory
    /// cannot be provided.
    pub fn insert<K: Into<UserKey>, V: Into<UserValue>>(&self, key: K, value: V) -> crate::Result<()> {
        let mut ctx = self.variant.create_op_context(IndexOperation::Insert);
        self.harness.modify(&mut ctx, Entry::new(key, value))
    }

    /// Inserts or replaces a key-value pair.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the index is inactive or read-only.
    pub fn upsert<K: Into<UserKey>, V: Into<UserValue>>(&self, key: K, value: V) -> crate::Result<()> {
        let mut ctx = self.variant.create_op_context(IndexOperation::Upsert);
        self.harness.modify(&mut ctx, Entry::new(key, value))
    }

    /// Deletes a key by writing a tombstone.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the index is inactive or read-only.
    pub fn delete<K: Into<UserKey>>(&self, key: K) -> crate::Result<()> {
        let mut ctx = self.variant.create_op_context(IndexOperation::Delete);
        self.harness.modify(&mut ctx, Entry::new_tombstone(key))
    }

    /// Removes a key from the current memory component without leaving a tombstone.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the index is inactive or read-only.
    pub fn physical_delete<K: Into<UserKey>>(&self, key: K) -> crate::Result<()> {
        let mut ctx = self.variant.create_op_context(IndexOperation::PhysicalDelete);
        self.harness.modify(&mut ctx, Entry::new_tombstone(key))
    }

    /// Retrieves the live value of a key.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the index is inactive.
    pub fn get<K: AsRef<[u8]>>(&self, key: K) -> crate::Result<Option<UserValue>> {
        Ok(self.harness.get(key.as_ref())?.map(|x| x.value))
    }

    /// Returns the live entries matching the predicate, sorted by key.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the index is inactive.
    pub fn search(&self, predicate: &SearchPredicate) -> crate::Result<Vec<Entry>> {
        let mut ctx = self.variant.create_op_context(IndexOperation::Search);
        self.harness.search(&mut ctx, predicate)
    }

    /// Scans all disk components, see [`Harness::scan_disk_components`].
    ///
    /// # Errors
    ///
    /// Will return `Err` if the index is secondary, or inactive.
    pub fn scan_disk_components(&self) -> crate::Result<Vec<Entry>> {
        let mut ctx = self.variant.create_op_context(IndexOperation::DiskComponentScan);
        self.harness.scan_disk_components(&mut ctx)
    }

    /// Flushes the current memory component and waits for it to be installed.
    ///
    /// Returns `false` if there was nothing to flush.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the flush failed.
    pub fn flush_memory_component(&self) -> crate::Result<bool> {
        self.flush_and_wait(IndexOperation::Flush)
    }

    /// Drops the contents of the current memory component without writing them.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the operation failed.
    pub fn delete_memory_component(&self) -> crate::Result<bool> {
        self.flush_and_wait(IndexOperation::DeleteMemoryComponent)
    }

    fn flush_and_wait(&self, operation: IndexOperation) -> crate::Result<bool> {
        let callback = Arc::new(BlockingIoOperationCallback::new(self.io_callback.clone()));

        if self.harness.schedule_flush(operation, callback.clone())? {
            callback.wait_for_io()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Merges all disk components into one, dropping tombstones, and waits
    /// for the merge to be installed.
    ///
    /// Returns `false` if there was nothing to merge.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the merge failed.
    pub fn full_merge(&self) -> crate::Result<bool> {
        let callback = Arc::new(BlockingIoOperationCallback::new(self.io_callback.clone()));

        if self.harness.schedule_full_merge(callback.clone())? {
            callback.wait_for_io()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    // --- Accessors ---

    /// Index directory
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` if the index is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active.load(Ordering::Acquire)
    }

    /// Returns `true` for read-only indexes over externally produced components.
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.external
    }

    /// Returns `true` for primary indexes.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    /// Returns `true` if component files are synced on write.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        self.durable
    }

    /// Returns `true` if the index has no disk components and no modified
    /// memory component.
    #[must_use]
    pub fn is_empty_index(&self) -> bool {
        self.read_state().disk_components.is_empty()
            && !self.memory_components.iter().any(|c| c.is_modified())
    }

    /// Returns `true` if the current mutable component is unmodified.
    #[must_use]
    pub fn is_current_mutable_component_empty(&self) -> bool {
        self.current_memory_component()
            .map_or(true, |c| !c.is_modified())
    }

    /// Returns `true` if the memory components are provisioned.
    #[must_use]
    pub fn is_memory_components_allocated(&self) -> bool {
        self.memory_components_allocated.load(Ordering::Acquire)
    }

    /// Number of memory components in the ring
    #[must_use]
    pub fn number_of_all_memory_components(&self) -> usize {
        self.memory_components.len()
    }

    /// Bytes provisioned for all memory components
    #[must_use]
    pub fn memory_allocation_size(&self) -> u64 {
        self.memory_components.iter().map(|c| c.size()).sum()
    }

    /// Current mutable component
    #[must_use]
    pub fn current_memory_component(&self) -> Option<&Arc<MemoryComponent>> {
        self.memory_components
            .get(self.current_memory_component_index())
    }

    /// Ring slot of the current mutable component
    #[must_use]
    pub fn current_memory_component_index(&self) -> usize {
        self.current_mutable.load(Ordering::Acquire)
    }

    /// All memory components, in ring order
    #[must_use]
    pub fn memory_components(&self) -> &[Arc<MemoryComponent>] {
        &self.memory_components
    }

    /// Snapshot of the disk components, newest first
    #[must_use]
    pub fn disk_components(&self) -> Vec<Arc<DiskComponent>> {
        self.read_state().disk_components.clone()
    }

    /// Snapshot of the disk components per level, if the index is leveled
    #[must_use]
    pub fn disk_components_in_levels(&self) -> Option<Vec<Vec<Arc<DiskComponent>>>> {
        self.read_state().levels.clone()
    }

    /// Key range of each level, if the index is leveled (L0 has none)
    #[must_use]
    pub fn ranges_of_levels(&self) -> Option<Vec<Option<(Slice, Slice)>>> {
        self.read_state().ranges_of_levels.clone()
    }

    /// Components replaced by merges that still have readers
    #[must_use]
    pub fn inactive_disk_components(&self) -> Vec<Arc<DiskComponent>> {
        self.read_state().inactive_disk_components.clone()
    }

    /// Number of fields the component filters track
    #[must_use]
    pub fn num_of_filter_fields(&self) -> usize {
        usize::from(self.filter_manager.is_some())
    }

    /// False positive rate of component bloom filters
    #[must_use]
    pub fn bloom_filter_fp_rate(&self) -> f32 {
        self.bloom_filter_fp_rate
    }

    /// Desired size of leveled merge outputs
    #[must_use]
    pub fn target_component_size(&self) -> u64 {
        self.target_component_size
    }

    /// Filter manager, if component filters are enabled
    #[must_use]
    pub fn filter_manager(&self) -> Option<&FilterManager> {
        self.filter_manager.as_ref()
    }

    /// Harness, the entry point for data-plane operations
    #[must_use]
    pub fn harness(&self) -> &dyn Harness {
        self.harness.as_ref()
    }

    /// Buffer cache
    #[must_use]
    pub fn buffer_cache(&self) -> &Arc<dyn BufferCache> {
        &self.buffer_cache
    }

    /// File manager
    #[must_use]
    pub fn file_manager(&self) -> &Arc<dyn FileManager> {
        &self.file_manager
    }

    /// Factory opening flushed and merged components
    #[must_use]
    pub fn component_factory(&self) -> &Arc<dyn ComponentFactory> {
        &self.component_factory
    }

    /// Factory opening bulk-loaded components
    #[must_use]
    pub fn bulk_load_component_factory(&self) -> &Arc<dyn ComponentFactory> {
        &self.bulk_load_component_factory
    }

    /// IO scheduler
    #[must_use]
    pub fn io_scheduler(&self) -> &Arc<dyn IoScheduler> {
        &self.io_scheduler
    }

    /// Default callback of flushes and merges
    #[must_use]
    pub fn io_operation_callback(&self) -> &Arc<dyn IoOperationCallback> {
        &self.io_callback
    }

    /// Merge policy
    #[must_use]
    pub fn merge_policy(&self) -> &Arc<dyn MergePolicy> {
        &self.merge_policy
    }

    /// Operation tracker
    #[must_use]
    pub fn operation_tracker(&self) -> &Arc<dyn crate::tracker::OperationTracker> {
        self.harness.operation_tracker()
    }

    /// Index variant
    #[must_use]
    pub fn variant(&self) -> &Arc<dyn IndexVariant> {
        &self.variant
    }
}
