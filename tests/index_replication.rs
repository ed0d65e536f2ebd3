use lsm_core::{
    Config, FileBufferCache, IoOperationType, ReplicationExecutionType, ReplicationJob,
    ReplicationManager, ReplicationOperation,
};
use std::{
    collections::BTreeSet,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use test_log::test;

#[derive(Default)]
struct RecordingReplication {
    jobs: Mutex<Vec<ReplicationJob>>,
}

impl RecordingReplication {
    fn take(&self) -> Vec<ReplicationJob> {
        std::mem::take(&mut *self.jobs.lock().expect("lock is poisoned"))
    }
}

impl ReplicationManager for RecordingReplication {
    fn submit_job(&self, job: ReplicationJob) -> lsm_core::Result<()> {
        self.jobs.lock().expect("lock is poisoned").push(job);
        Ok(())
    }
}

fn files_of(components: &[Arc<lsm_core::DiskComponent>]) -> BTreeSet<PathBuf> {
    components.iter().flat_map(|c| c.physical_files()).collect()
}

#[test]
fn index_replication_jobs() -> lsm_core::Result<()> {
    let folder = tempfile::tempdir()?;

    let replication = Arc::new(RecordingReplication::default());
    let cache = FileBufferCache::new().with_replication(replication.clone());

    let index = Config::new(&folder).buffer_cache(Arc::new(cache)).open()?;
    index.create()?;
    index.activate()?;

    // Bulk loads replicate synchronously
    let mut loader = index.create_bulk_loader(1.0, true, 0, true)?;
    loader.add("a", "1")?;
    let loaded = loader.end()?;

    let jobs = replication.take();
    assert_eq!(1, jobs.len());
    let job = jobs.first().expect("should exist");
    assert_eq!(ReplicationExecutionType::Sync, job.execution_type);
    assert_eq!(ReplicationOperation::Replicate, job.operation);
    assert_eq!(IoOperationType::Load, job.op_type);
    assert_eq!(files_of(&[loaded]), job.files);

    // Flushes replicate asynchronously
    index.insert("b", "1")?;
    index.flush_memory_component()?;

    let jobs = replication.take();
    assert_eq!(1, jobs.len());
    let job = jobs.first().expect("should exist");
    assert_eq!(ReplicationExecutionType::Async, job.execution_type);
    assert_eq!(ReplicationOperation::Replicate, job.operation);
    assert_eq!(IoOperationType::Flush, job.op_type);
    assert!(!job.files.is_empty());

    // Merges ship the output and delete the inputs on the replica
    let inputs = index.disk_components();
    let input_files = files_of(&inputs);
    assert!(index.full_merge()?);
    let output_files = files_of(&index.disk_components());

    let jobs = replication.take();
    assert_eq!(2, jobs.len());
    assert!(jobs
        .iter()
        .all(|job| job.execution_type == ReplicationExecutionType::Async
            && job.op_type == IoOperationType::Merge));

    let replicate = jobs
        .iter()
        .find(|job| job.operation == ReplicationOperation::Replicate)
        .expect("should exist");
    assert_eq!(output_files, replicate.files);

    let delete = jobs
        .iter()
        .find(|job| job.operation == ReplicationOperation::Delete)
        .expect("should exist");
    assert_eq!(input_files, delete.files);

    assert!(jobs.iter().all(|job| job.index_dir == index.path()));

    Ok(())
}
