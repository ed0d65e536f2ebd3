use lsm_core::{
    merge_policy::PolicyView, ComponentId, Config, ConstantMergePolicy, Error, IndexOperation,
    MergeDecision, MergePolicy, OperationContext, SearchPredicate,
};
use std::sync::Arc;
use test_log::test;

#[test]
fn index_full_merge() -> lsm_core::Result<()> {
    let folder = tempfile::tempdir()?;

    let index = Config::new(&folder).open()?;
    index.create()?;
    index.activate()?;

    for key in ["a", "b", "c"] {
        index.insert(key, "1")?;
        index.flush_memory_component()?;
    }

    let merged = index.disk_components();
    assert_eq!(3, merged.len());

    // Hold readers on the disk components
    let mut ctx = OperationContext::new(IndexOperation::DiskComponentScan);
    let pinned = index.harness().pin(&mut ctx)?;
    assert_eq!(3, pinned.components().len());

    assert!(index.full_merge()?);

    let disk = index.disk_components();
    assert_eq!(1, disk.len());

    let new_id = disk.first().expect("should exist").id();
    assert!(new_id.covers(&ComponentId::range(0, 2)));

    assert_eq!(3, index.inactive_disk_components().len());
    assert!(merged
        .iter()
        .all(|c| c.files().iter().all(|f| f.path().exists())));

    drop(pinned);

    assert!(index.inactive_disk_components().is_empty());
    assert!(merged
        .iter()
        .all(|c| c.files().iter().all(|f| !f.path().exists())));

    assert_eq!(3, index.search(&SearchPredicate::all())?.len());
    index.validate()?;

    Ok(())
}

#[test]
fn index_full_merge_drops_tombstones() -> lsm_core::Result<()> {
    let folder = tempfile::tempdir()?;

    let index = Config::new(&folder).open()?;
    index.create()?;
    index.activate()?;

    index.insert("a", "1")?;
    index.insert("b", "1")?;
    index.flush_memory_component()?;

    index.delete("a")?;
    index.flush_memory_component()?;

    assert_eq!(2, index.scan_disk_components()?.len());

    index.full_merge()?;
    assert_eq!(1, index.disk_components().len());
    assert_eq!(1, index.scan_disk_components()?.len());
    assert_eq!(None, index.get("a")?);

    Ok(())
}

#[test]
fn index_constant_merge_policy() -> lsm_core::Result<()> {
    let folder = tempfile::tempdir()?;

    let index = Config::new(&folder)
        .merge_policy(Arc::new(ConstantMergePolicy::new(3)))
        .open()?;
    index.create()?;
    index.activate()?;

    for round in 0..2 {
        index.insert(format!("key{round}"), nanoid::nanoid!())?;
        index.flush_memory_component()?;
    }
    assert_eq!(2, index.disk_components().len());

    index.insert("key2", nanoid::nanoid!())?;
    index.flush_memory_component()?;

    // Third flush triggered a merge of all three components
    assert_eq!(1, index.disk_components().len());
    assert_eq!(3, index.search(&SearchPredicate::all())?.len());

    index.validate()?;

    Ok(())
}

#[test]
fn index_subsume_keeps_position() -> lsm_core::Result<()> {
    let folder = tempfile::tempdir()?;

    let index = Config::new(&folder).open()?;
    index.create()?;
    index.activate()?;

    for key in ["a", "b", "c", "d"] {
        index.insert(key, "1")?;
        index.flush_memory_component()?;
    }

    let disk = index.disk_components();
    let middle = disk.get(1..3).expect("should exist").to_vec();
    assert!(middle.iter().all(|c| c.mark_merging()));

    let mut ctx = OperationContext::new(IndexOperation::Merge);
    ctx.component_holder = middle.iter().cloned().map(Into::into).collect();

    let callback = Arc::new(lsm_core::BlockingIoOperationCallback::new(
        index.io_operation_callback().clone(),
    ));
    index.schedule_merge(&ctx, callback.clone())?;
    callback.wait_for_io()?;

    let after = index.disk_components();
    assert_eq!(3, after.len());
    assert!(Arc::ptr_eq(
        disk.first().expect("should exist"),
        after.first().expect("should exist")
    ));
    assert!(Arc::ptr_eq(
        disk.last().expect("should exist"),
        after.last().expect("should exist")
    ));

    let new = after.get(1).expect("should exist");
    assert_eq!(ComponentId::range(1, 2), new.id());
    assert!(middle
        .iter()
        .all(|m| after.iter().all(|c| !Arc::ptr_eq(c, m))));

    index.validate()?;

    Ok(())
}

/// Deletes all disk components once there are `n` of them
struct DeleteAll(usize);

impl MergePolicy for DeleteAll {
    fn name(&self) -> &'static str {
        "DeleteAll"
    }

    fn choose(&self, view: &PolicyView<'_>) -> MergeDecision {
        if view.is_merging() || view.disk_components.len() < self.0 {
            MergeDecision::DoNothing
        } else {
            MergeDecision::DeleteComponents(view.disk_components.to_vec())
        }
    }
}

#[test]
fn index_delete_disk_components() -> lsm_core::Result<()> {
    let folder = tempfile::tempdir()?;

    let index = Config::new(&folder)
        .merge_policy(Arc::new(DeleteAll(2)))
        .open()?;
    index.create()?;
    index.activate()?;

    index.insert("a", "1")?;
    index.flush_memory_component()?;

    let first = index.disk_components();
    assert_eq!(1, first.len());

    index.insert("b", "1")?;
    index.flush_memory_component()?;

    // Both components are deleted, nothing replaces them
    assert!(index.disk_components().is_empty());
    assert!(index.inactive_disk_components().is_empty());
    assert!(first
        .iter()
        .all(|c| c.files().iter().all(|f| !f.path().exists())));

    assert_eq!(None, index.get("a")?);
    assert!(index.search(&SearchPredicate::all())?.is_empty());
    index.validate()?;

    Ok(())
}

#[test]
fn index_install_out_of_order_is_rejected() -> lsm_core::Result<()> {
    let folder = tempfile::tempdir()?;

    let index = Config::new(&folder).open()?;
    index.create()?;
    index.activate()?;

    for key in ["a", "b", "c"] {
        index.insert(key, "1")?;
        index.flush_memory_component()?;
    }

    let disk = index.disk_components();
    let newest = disk.first().cloned().expect("should exist");
    let oldest = disk.last().cloned().expect("should exist");

    let unchanged = |index: &lsm_core::LsmIndex| {
        let now = index.disk_components();
        now.len() == disk.len() && now.iter().zip(&disk).all(|(a, b)| Arc::ptr_eq(a, b))
    };

    assert!(matches!(
        index.add_disk_component(Some(oldest.clone())),
        Err(Error::InvariantViolation(_))
    ));
    assert!(unchanged(&index));

    // The output would end up in front of a newer component
    assert!(matches!(
        index.subsume_merged_components(Some(oldest.clone()), &[newest.clone()]),
        Err(Error::InvariantViolation(_))
    ));
    assert!(unchanged(&index));

    assert_eq!(3, index.search(&SearchPredicate::all())?.len());
    index.validate()?;

    Ok(())
}

#[test]
fn index_operational_components_selection() -> lsm_core::Result<()> {
    let folder = tempfile::tempdir()?;

    let index = Config::new(&folder).open()?;
    index.create()?;
    index.activate()?;

    for key in ["a", "b", "c"] {
        index.insert(key, "1")?;
        index.flush_memory_component()?;
    }

    let disk = index.disk_components();
    let newest = disk.first().cloned().expect("should exist");
    let middle = disk.get(1).cloned().expect("should exist");
    let oldest = disk.last().cloned().expect("should exist");

    // Merge inputs first, then the components picked from the previous level
    for op in [IndexOperation::Merge, IndexOperation::DeleteDiskComponents] {
        let mut ctx = OperationContext::new(op);
        ctx.components_to_be_merged = vec![oldest.clone()];
        ctx.component_picked_to_be_merged_from_prev_level = vec![newest.clone()];
        index.get_operational_components(&mut ctx)?;

        let selected = ctx.disk_components().cloned().collect::<Vec<_>>();
        assert_eq!(ctx.component_holder.len(), selected.len());
        assert_eq!(2, selected.len());
        assert!(Arc::ptr_eq(selected.first().expect("should exist"), &oldest));
        assert!(Arc::ptr_eq(selected.last().expect("should exist"), &newest));
    }

    let mut ctx = OperationContext::new(IndexOperation::Replicate);
    ctx.components_to_be_replicated = vec![middle.clone()];
    index.get_operational_components(&mut ctx)?;
    assert_eq!(1, ctx.component_holder.len());
    assert!(Arc::ptr_eq(
        ctx.disk_components().next().expect("should exist"),
        &middle
    ));

    for op in [
        IndexOperation::Create,
        IndexOperation::NoOp,
        IndexOperation::DiskOrderScan,
    ] {
        let mut ctx = OperationContext::new(op);
        assert!(matches!(
            index.get_operational_components(&mut ctx),
            Err(Error::UnsupportedOperation(x)) if x == op
        ));
    }

    Ok(())
}
