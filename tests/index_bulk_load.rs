use lsm_core::{
    check_component_ids, Config, DiskComponent, Error, ErrorCode, ErrorKind, FileReference,
    IndexOperation, IoOperationCallback, IoOperationType, SearchPredicate,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use test_log::test;

/// Rejects loaded components before they are installed
#[derive(Default)]
struct RejectLoad {
    written: Mutex<Vec<FileReference>>,
    failed: AtomicUsize,
}

impl IoOperationCallback for RejectLoad {
    fn after_operation(
        &self,
        op_type: IoOperationType,
        new_components: &[Arc<DiskComponent>],
    ) -> lsm_core::Result<()> {
        if op_type != IoOperationType::Load {
            return Ok(());
        }

        let mut written = self.written.lock().expect("lock is poisoned");
        for component in new_components {
            assert!(component.files().iter().all(|f| f.path().exists()));
            written.extend(component.files().iter().cloned());
        }

        Err(Error::Io(std::io::Error::other("rejected")))
    }

    fn operation_failed(&self, op_type: IoOperationType, _: &Error) {
        if op_type == IoOperationType::Load {
            self.failed.fetch_add(1, Ordering::AcqRel);
        }
    }
}

#[test]
fn index_bulk_load() -> lsm_core::Result<()> {
    let folder = tempfile::tempdir()?;

    let index = Config::new(&folder).open()?;
    index.create()?;
    index.activate()?;

    let mut loader = index.create_bulk_loader(1.0, true, 100, true)?;
    for i in 0..100_u32 {
        loader.add(i.to_be_bytes(), nanoid::nanoid!())?;
    }
    assert_eq!(100, loader.len());

    let component = loader.end()?;
    assert_eq!(100, component.len());
    assert_eq!(1, index.disk_components().len());

    assert!(index.get(42_u32.to_be_bytes())?.is_some());
    assert_eq!(100, index.search(&SearchPredicate::all())?.len());

    // Flushes after the load are newer
    index.insert(0_u32.to_be_bytes(), "new")?;
    index.flush_memory_component()?;
    assert_eq!(Some("new".as_bytes().into()), index.get(0_u32.to_be_bytes())?);
    index.validate()?;

    Ok(())
}

#[test]
fn index_bulk_load_non_empty() -> lsm_core::Result<()> {
    let folder = tempfile::tempdir()?;

    let index = Config::new(&folder).open()?;
    index.create()?;
    index.activate()?;

    index.insert("a", "1")?;

    let err = index
        .create_bulk_loader(1.0, true, 0, true)
        .expect_err("should fail");
    assert_eq!(Some(ErrorCode::LoadNonEmptyIndex), err.code());
    assert_eq!(ErrorKind::LoadNonEmptyIndex, err.kind());

    // Loading without the check is allowed
    let mut loader = index.create_bulk_loader(1.0, true, 0, false)?;
    loader.add("b", "2")?;
    loader.end()?;

    assert_eq!(2, index.search(&SearchPredicate::all())?.len());

    Ok(())
}

#[test]
fn index_bulk_load_with_flush_while_open() -> lsm_core::Result<()> {
    let folder = tempfile::tempdir()?;

    let index = Config::new(&folder).open()?;
    index.create()?;
    index.activate()?;

    let mut loader = index.create_bulk_loader(1.0, true, 0, true)?;
    loader.add("b", "loaded")?;

    // The flush is installed before the loader ends, so it is older
    index.insert("a", "flushed")?;
    index.insert("b", "flushed")?;
    assert!(index.flush_memory_component()?);

    let component = loader.end()?;

    let disk = index.disk_components();
    assert_eq!(2, disk.len());
    assert!(Arc::ptr_eq(disk.first().expect("should exist"), &component));
    assert!(check_component_ids(&disk));

    assert_eq!(Some("loaded".as_bytes().into()), index.get("b")?);
    assert_eq!(Some("flushed".as_bytes().into()), index.get("a")?);
    index.validate()?;

    // Flushes after the load are newer again
    index.insert("c", "1")?;
    assert!(index.flush_memory_component()?);
    assert!(check_component_ids(&index.disk_components()));
    index.validate()?;

    Ok(())
}

#[test]
fn index_bulk_load_rejected_install() -> lsm_core::Result<()> {
    let folder = tempfile::tempdir()?;

    let callback = Arc::new(RejectLoad::default());

    let index = Config::new(&folder).io_callback(callback.clone()).open()?;
    index.create()?;
    index.activate()?;

    let mut loader = index.create_bulk_loader(1.0, true, 0, true)?;
    loader.add("a", "1")?;
    loader.add("b", "2")?;

    let err = loader.end().expect_err("should fail");
    assert!(matches!(err, Error::IoOperationFailed { .. }));
    assert_eq!(1, callback.failed.load(Ordering::Acquire));

    // Written files are deleted, nothing was installed
    let written = callback.written.lock().expect("lock is poisoned").clone();
    assert!(!written.is_empty());
    assert!(written.iter().all(|f| !f.path().exists()));

    assert!(index.disk_components().is_empty());
    assert_eq!(None, index.get("a")?);
    index.validate()?;

    Ok(())
}

#[test]
fn index_bulk_load_unsorted_input() -> lsm_core::Result<()> {
    let folder = tempfile::tempdir()?;

    let index = Config::new(&folder).open()?;
    index.create()?;
    index.activate()?;

    let mut loader = index.create_bulk_loader(1.0, true, 0, true)?;
    loader.add("b", "1")?;
    assert!(matches!(
        loader.add("a", "1"),
        Err(Error::InvariantViolation(_))
    ));

    loader.abort();
    assert!(index.disk_components().is_empty());
    assert!(index.is_empty_index());

    // Without verification, the input is sorted, later entries win
    let mut loader = index.create_bulk_loader(1.0, false, 0, true)?;
    loader.add("b", "1")?;
    loader.add("a", "1")?;
    loader.add("b", "2")?;
    loader.end()?;

    let items = index.search(&SearchPredicate::all())?;
    assert_eq!(2, items.len());
    assert_eq!(Some("2".as_bytes().into()), index.get("b")?);

    Ok(())
}

#[test]
fn index_external_read_only() -> lsm_core::Result<()> {
    let folder = tempfile::tempdir()?;

    let index = Config::new(&folder).open_external()?;
    index.create()?;
    index.activate()?;

    assert!(index.is_external());
    assert_eq!(0, index.number_of_all_memory_components());

    let err = index.insert("a", "1").expect_err("should fail");
    assert!(matches!(
        err,
        Error::UnsupportedOperation(IndexOperation::Insert)
    ));

    assert!(!index.flush_memory_component()?);

    let mut loader = index.create_bulk_loader(1.0, true, 0, true)?;
    loader.add("a", "1")?;
    loader.add("b", "2")?;
    loader.end()?;

    assert_eq!(Some("1".as_bytes().into()), index.get("a")?);
    assert_eq!(2, index.search(&SearchPredicate::all())?.len());

    index.deactivate(true)?;

    Ok(())
}
