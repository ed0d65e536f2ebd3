// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Core of an LSM index: component lifecycle, flush and merge scheduling,
//! and the concurrency harness around them.
//!
//! An [`LsmIndex`] owns:
//!
//! - a ring of memory components, exactly one of which accepts writers
//! - a newest-first list of immutable disk components (optionally bucketed by level)
//!
//! Writers go into the current mutable component. When it fills up, it is
//! sealed, queued and flushed into a new disk component by an IO scheduler,
//! and the ring advances. Merge policies decide when disk components are
//! merged; merged inputs are retired once their last reader leaves.
//!
//! The physical component format is pluggable through [`IndexVariant`];
//! the crate ships with a sorted-run format.
//!
//! ```
//! use lsm_core::{Config, SearchPredicate};
//! #
//! # let folder = tempfile::tempdir()?;
//!
//! let index = Config::new(&folder).open()?;
//! index.create()?;
//! index.activate()?;
//!
//! index.insert("a", "hello")?;
//! index.insert("b", "world")?;
//!
//! // Write the memory component to disk
//! index.flush_memory_component()?;
//! assert_eq!(1, index.disk_components().len());
//!
//! let item = index.get("a")?;
//! assert_eq!(Some("hello".as_bytes().into()), item);
//!
//! let items = index.search(&SearchPredicate::all())?;
//! assert_eq!(2, items.len());
//!
//! index.deactivate(true)?;
//! #
//! # Ok::<_, lsm_core::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]

mod bloom;

/// Buffer caches and memory budgets
pub mod buffer_cache;

/// IO operation callbacks
pub mod callback;

pub mod component;

mod config;
mod error;

/// Component factories
pub mod factory;

/// Component file naming and recovery
pub mod file_manager;

pub mod harness;
mod index;
pub mod io;
pub mod merge_policy;
mod operation;

/// Replication of component files
pub mod replication;

mod run;

/// Operation trackers
pub mod tracker;

mod value;

pub use {
    buffer_cache::{BufferCache, FileBufferCache, HeapVirtualBufferCache, MemoryBudget, VirtualBufferCache},
    callback::{BlockingIoOperationCallback, IoOperationCallback, NoOpIoOperationCallback},
    component::{
        Component, ComponentFileReferences, ComponentFilter, ComponentId, ComponentTarget,
        DiskComponent, DiskComponentState, FileReference, FilterManager, IdCompareResult,
        MemoryComponent,
    },
    config::Config,
    error::{Error, ErrorCode, ErrorKind, Result},
    factory::{ComponentFactory, RunComponentFactory},
    file_manager::{DirectoryFileManager, FileManager},
    harness::{Harness, PinnedComponents},
    index::{check_component_ids, BulkLoader, IndexVariant, LsmIndex, SortedRunVariant},
    io::{IoOperation, IoScheduler, SynchronousScheduler, ThreadPoolScheduler, Tracer},
    merge_policy::{
        ConstantMergePolicy, LeveledPartitioningPolicy, MergeDecision, MergePolicy, NoMergePolicy,
    },
    operation::{IndexOperation, IoOperationType, OperationContext, SearchPredicate},
    replication::{ReplicationExecutionType, ReplicationJob, ReplicationManager, ReplicationOperation},
    run::{RunWriteOptions, SortedRun},
    tracker::{FlushingOperationTracker, NoOpOperationTracker, OperationTracker},
    value::{Entry, Slice, UserKey, UserValue, ValueType},
};
