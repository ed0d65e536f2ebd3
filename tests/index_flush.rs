use lsm_core::{
    BlockingIoOperationCallback, Component, Config, IdCompareResult, IndexOperation,
    NoOpIoOperationCallback, OperationContext, SearchPredicate,
};
use std::sync::Arc;
use test_log::test;

#[test]
fn index_flush_basic() -> lsm_core::Result<()> {
    let folder = tempfile::tempdir()?;

    let index = Config::new(&folder).memory_component_count(2).open()?;
    index.create()?;
    index.activate()?;

    index.insert("a", "1")?;
    index.insert("b", "2")?;
    index.insert("c", "3")?;
    assert_eq!(0, index.current_memory_component_index());

    let memory = index.memory_components().first().cloned().expect("should exist");
    assert!(memory.is_modified());

    index.change_mutable_component();
    assert_eq!(1, index.current_memory_component_index());

    let mut ctx = OperationContext::new(IndexOperation::Flush);
    ctx.component_holder.push(Component::Memory(memory.clone()));

    let callback = Arc::new(BlockingIoOperationCallback::new(Arc::new(
        NoOpIoOperationCallback,
    )));
    index.schedule_flush(&ctx, callback.clone())?;
    callback.wait_for_io()?;

    let disk = index.disk_components();
    assert_eq!(1, disk.len());
    assert_eq!(3, disk.first().expect("should exist").len());
    assert!(!memory.is_modified());

    let writable = index
        .memory_components()
        .iter()
        .filter(|c| c.is_writable())
        .count();
    assert_eq!(1, writable);

    assert_eq!(Some("2".as_bytes().into()), index.get("b")?);
    index.validate()?;

    Ok(())
}

#[test]
fn index_flush_ids_increase() -> lsm_core::Result<()> {
    let folder = tempfile::tempdir()?;

    let index = Config::new(&folder).open()?;
    index.create()?;
    index.activate()?;

    for round in 0..5 {
        index.insert(format!("key{round}"), nanoid::nanoid!())?;
        assert!(index.flush_memory_component()?);
    }

    let disk = index.disk_components();
    assert_eq!(5, disk.len());

    for pair in disk.windows(2) {
        let [newer, older] = pair else { unreachable!() };
        assert_eq!(IdCompareResult::GreaterThan, newer.id().compare(&older.id()));
    }

    assert_eq!(5, index.search(&SearchPredicate::all())?.len());

    Ok(())
}

#[test]
fn index_flush_nothing_to_flush() -> lsm_core::Result<()> {
    let folder = tempfile::tempdir()?;

    let index = Config::new(&folder).open()?;
    index.create()?;
    index.activate()?;

    assert!(!index.flush_memory_component()?);

    index.insert("a", "1")?;
    assert!(index.flush_memory_component()?);
    assert!(!index.flush_memory_component()?);
    assert_eq!(1, index.disk_components().len());

    Ok(())
}

#[test]
fn index_flush_full_memory_component() -> lsm_core::Result<()> {
    let folder = tempfile::tempdir()?;

    let index = Config::new(&folder)
        .memory_component_count(2)
        .memory_component_size(4_096)
        .open()?;
    index.create()?;
    index.activate()?;

    for i in 0..500_u32 {
        index.insert(i.to_be_bytes(), nanoid::nanoid!())?;
    }

    assert!(!index.disk_components().is_empty());

    for i in 0..500_u32 {
        assert!(index.get(i.to_be_bytes())?.is_some());
    }
    assert_eq!(500, index.search(&SearchPredicate::all())?.len());

    index.validate()?;

    Ok(())
}

#[test]
fn index_flush_shadowing() -> lsm_core::Result<()> {
    let folder = tempfile::tempdir()?;

    let index = Config::new(&folder).open()?;
    index.create()?;
    index.activate()?;

    index.insert("a", "old")?;
    index.insert("b", "old")?;
    index.flush_memory_component()?;

    index.insert("a", "new")?;
    index.delete("b")?;

    assert_eq!(Some("new".as_bytes().into()), index.get("a")?);
    assert_eq!(None, index.get("b")?);

    index.flush_memory_component()?;
    assert_eq!(Some("new".as_bytes().into()), index.get("a")?);
    assert_eq!(None, index.get("b")?);
    assert_eq!(1, index.search(&SearchPredicate::all())?.len());

    // Tombstones are still on disk
    assert_eq!(2, index.scan_disk_components()?.len());

    Ok(())
}

#[test]
fn index_delete_memory_component() -> lsm_core::Result<()> {
    let folder = tempfile::tempdir()?;

    let index = Config::new(&folder).open()?;
    index.create()?;
    index.activate()?;

    index.insert("a", "1")?;
    assert!(index.delete_memory_component()?);

    assert!(index.disk_components().is_empty());
    assert_eq!(None, index.get("a")?);
    assert!(index.is_empty_index());

    Ok(())
}

#[test]
fn index_physical_delete() -> lsm_core::Result<()> {
    let folder = tempfile::tempdir()?;

    let index = Config::new(&folder).open()?;
    index.create()?;
    index.activate()?;

    index.insert("a", "1")?;
    index.physical_delete("a")?;
    assert_eq!(None, index.get("a")?);

    index.flush_memory_component()?;
    assert!(index.scan_disk_components()?.is_empty());

    Ok(())
}
