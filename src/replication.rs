// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::operation::IoOperationType;
use std::{collections::BTreeSet, path::PathBuf};

/// Whether the submitter waits for the replica
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReplicationExecutionType {
    /// The job is acknowledged by the replica before returning
    Sync,

    /// The job is shipped in the background
    Async,
}

/// What the replica should do with the files
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReplicationOperation {
    /// Copy the files
    Replicate,

    /// Delete the files
    Delete,
}

/// A batch of component files to ship to replicas
#[derive(Clone, Debug)]
pub struct ReplicationJob {
    /// Base directory of the index
    pub index_dir: PathBuf,

    /// Physical files of all components in the job
    pub files: BTreeSet<PathBuf>,

    /// What to do with the files
    pub operation: ReplicationOperation,

    /// Whether the caller waits for the job
    pub execution_type: ReplicationExecutionType,

    /// IO operation that produced the job
    pub op_type: IoOperationType,
}

/// Ships replication jobs to replicas
#[allow(clippy::module_name_repetitions)]
pub trait ReplicationManager: Send + Sync {
    /// Returns `true` if replicas are configured.
    fn is_replication_enabled(&self) -> bool {
        true
    }

    /// Submits a job.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the job cannot be submitted.
    fn submit_job(&self, job: ReplicationJob) -> crate::Result<()>;
}
