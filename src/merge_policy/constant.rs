// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{MergeDecision, MergePolicy, PolicyView};

/// Merges all disk components once there are `threshold` of them
///
/// Keeps the number of disk components bounded, at the cost of rewriting
/// the whole index on every merge.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct ConstantMergePolicy {
    threshold: usize,
}

impl ConstantMergePolicy {
    /// Creates a policy merging at `threshold` components.
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(2),
        }
    }
}

impl Default for ConstantMergePolicy {
    fn default() -> Self {
        Self::new(5)
    }
}

impl MergePolicy for ConstantMergePolicy {
    fn name(&self) -> &'static str {
        "ConstantMergePolicy"
    }

    fn choose(&self, view: &PolicyView<'_>) -> MergeDecision {
        if view.is_merging() || view.disk_components.len() < self.threshold {
            return MergeDecision::DoNothing;
        }

        MergeDecision::Merge(view.disk_components.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{component::ComponentId, merge_policy::fixture::component};
    use test_log::test;

    #[test]
    fn constant_policy_threshold() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        let policy = ConstantMergePolicy::new(3);

        let mut components = vec![];
        for id in (0..3).rev() {
            components.push(component(folder.path(), ComponentId::single(id), 0, &["a"])?);
        }

        let view = PolicyView {
            disk_components: components.get(1..).unwrap_or_default(),
            levels: None,
            target_component_size: 0,
        };
        assert!(matches!(policy.choose(&view), MergeDecision::DoNothing));

        let view = PolicyView {
            disk_components: &components,
            levels: None,
            target_component_size: 0,
        };
        assert!(matches!(policy.choose(&view), MergeDecision::Merge(x) if x.len() == 3));

        Ok(())
    }

    #[test]
    fn constant_policy_skips_while_merging() -> crate::Result<()> {
        let folder = tempfile::tempdir()?;
        let policy = ConstantMergePolicy::new(2);

        let components = vec![
            component(folder.path(), ComponentId::single(1), 0, &["a"])?,
            component(folder.path(), ComponentId::single(0), 0, &["b"])?,
        ];
        assert!(components.iter().all(|c| c.mark_merging()));

        let view = PolicyView {
            disk_components: &components,
            levels: None,
            target_component_size: 0,
        };
        assert!(matches!(policy.choose(&view), MergeDecision::DoNothing));

        Ok(())
    }
}
