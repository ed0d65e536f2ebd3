use lsm_core::{
    check_component_ids, ComponentTarget, Config, DiskComponent, Error, ErrorCode, ErrorKind,
    IndexVariant, LsmIndex, MemoryComponent, SearchPredicate, SortedRunVariant,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use test_log::test;

/// Writes the component, then fails while `fail` is set
#[derive(Default)]
struct FailingFlush {
    inner: SortedRunVariant,
    fail: AtomicBool,
}

impl IndexVariant for FailingFlush {
    fn name(&self) -> &'static str {
        "FailingFlush"
    }

    fn do_flush(
        &self,
        index: &LsmIndex,
        component: &MemoryComponent,
        target: &ComponentTarget,
    ) -> lsm_core::Result<Arc<DiskComponent>> {
        let written = self.inner.do_flush(index, component, target)?;

        if self.fail.load(Ordering::Acquire) {
            assert!(target.files.insert_index.path().exists());
            return Err(Error::Io(std::io::Error::other("injected")));
        }

        Ok(written)
    }

    fn do_merge(
        &self,
        index: &LsmIndex,
        inputs: &[Arc<DiskComponent>],
        target: &ComponentTarget,
        drop_tombstones: bool,
    ) -> lsm_core::Result<Arc<DiskComponent>> {
        self.inner.do_merge(index, inputs, target, drop_tombstones)
    }

    fn do_leveled_merge(
        &self,
        index: &LsmIndex,
        inputs: &[Arc<DiskComponent>],
        targets: &[ComponentTarget],
    ) -> lsm_core::Result<Vec<Arc<DiskComponent>>> {
        self.inner.do_leveled_merge(index, inputs, targets)
    }
}

#[test]
fn index_flush_failure_cleanup() -> lsm_core::Result<()> {
    let folder = tempfile::tempdir()?;

    let variant = Arc::new(FailingFlush::default());
    variant.fail.store(true, Ordering::Release);

    let index = Config::new(&folder).variant(variant.clone()).open()?;
    index.create()?;
    index.activate()?;

    index.insert("a", "1")?;
    index.insert("b", "2")?;

    let memory = index
        .current_memory_component()
        .cloned()
        .expect("should exist");

    let result = index.flush_memory_component();
    let Err(e) = result else {
        panic!("flush should fail");
    };
    assert!(matches!(e, Error::IoOperationFailed { .. }));
    assert_eq!(ErrorKind::IoFailure, e.kind());
    assert!(e.suppressed().is_empty());

    let id = memory.flush_id().expect("should have flush ID");
    let files = index.file_manager().flush_file_references(id);
    assert!(files.iter().all(|f| !f.path().exists()));

    assert!(index.disk_components().is_empty());
    assert!(memory.is_modified());

    // Data is still readable from the stranded component
    assert_eq!(Some("1".as_bytes().into()), index.get("a")?);

    // The next flush retries the stranded component
    variant.fail.store(false, Ordering::Release);
    assert!(index.flush_memory_component()?);

    assert_eq!(1, index.disk_components().len());
    assert!(!memory.is_modified());
    assert_eq!(2, index.search(&SearchPredicate::all())?.len());
    index.validate()?;

    Ok(())
}

#[test]
fn index_flush_failure_keeps_age_order() -> lsm_core::Result<()> {
    let folder = tempfile::tempdir()?;

    let variant = Arc::new(FailingFlush::default());

    let index = Config::new(&folder)
        .memory_component_count(3)
        .variant(variant.clone())
        .open()?;
    index.create()?;
    index.activate()?;

    variant.fail.store(true, Ordering::Release);
    index.insert("a", "old")?;
    assert!(index.flush_memory_component().is_err());

    variant.fail.store(false, Ordering::Release);
    index.insert("a", "new")?;
    assert!(index.flush_memory_component()?);

    // Both components were installed, oldest first
    let disk = index.disk_components();
    assert_eq!(2, disk.len());
    assert!(check_component_ids(&disk));
    assert_eq!(Some("new".as_bytes().into()), index.get("a")?);

    Ok(())
}

#[test]
fn index_flush_failure_blocks_bulk_load() -> lsm_core::Result<()> {
    let folder = tempfile::tempdir()?;

    let variant = Arc::new(FailingFlush::default());

    let index = Config::new(&folder).variant(variant.clone()).open()?;
    index.create()?;
    index.activate()?;

    variant.fail.store(true, Ordering::Release);
    index.insert("a", "1")?;
    assert!(index.flush_memory_component().is_err());
    assert!(index.has_pending_flush());

    // The stranded flush holds an older ID than the load would get
    let err = index
        .create_bulk_loader(1.0, true, 0, false)
        .expect_err("should fail");
    assert_eq!(Some(ErrorCode::LoadNonEmptyIndex), err.code());
    assert!(index.disk_components().is_empty());

    variant.fail.store(false, Ordering::Release);
    assert!(index.flush_memory_component()?);
    assert!(!index.has_pending_flush());

    let mut loader = index.create_bulk_loader(1.0, true, 0, false)?;
    loader.add("b", "2")?;
    let component = loader.end()?;

    let disk = index.disk_components();
    assert_eq!(2, disk.len());
    assert!(Arc::ptr_eq(disk.first().expect("should exist"), &component));
    assert!(check_component_ids(&disk));
    assert_eq!(2, index.search(&SearchPredicate::all())?.len());
    index.validate()?;

    Ok(())
}

#[test]
fn index_flush_failure_while_bulk_load_open() -> lsm_core::Result<()> {
    let folder = tempfile::tempdir()?;

    let variant = Arc::new(FailingFlush::default());

    let index = Config::new(&folder).variant(variant.clone()).open()?;
    index.create()?;
    index.activate()?;

    let mut loader = index.create_bulk_loader(1.0, true, 0, false)?;
    loader.add("b", "2")?;

    variant.fail.store(true, Ordering::Release);
    index.insert("a", "1")?;
    assert!(index.flush_memory_component().is_err());

    let err = loader.end().expect_err("should fail");
    assert_eq!(Some(ErrorCode::LoadNonEmptyIndex), err.code());
    assert!(index.disk_components().is_empty());

    // The retried flush still installs in order
    variant.fail.store(false, Ordering::Release);
    assert!(index.flush_memory_component()?);

    assert_eq!(1, index.disk_components().len());
    assert_eq!(Some("1".as_bytes().into()), index.get("a")?);
    assert_eq!(None, index.get("b")?);
    index.validate()?;

    Ok(())
}
