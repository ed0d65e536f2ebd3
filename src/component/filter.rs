// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::value::{Entry, Slice};
use std::sync::RwLock;

/// Extracts the filter value of an entry
pub type FilterExtractor = fn(&Entry) -> Option<Slice>;

fn extract_key(entry: &Entry) -> Option<Slice> {
    Some(entry.key.clone())
}

/// Decides which value of an entry is tracked by component filters
///
/// If an index has no filter manager, every disk component passes
/// the search filter check.
#[derive(Clone, Debug)]
pub struct FilterManager {
    extractor: FilterExtractor,
}

impl Default for FilterManager {
    fn default() -> Self {
        Self {
            extractor: extract_key,
        }
    }
}

impl FilterManager {
    /// Creates a filter manager with a custom extractor.
    #[must_use]
    pub fn new(extractor: FilterExtractor) -> Self {
        Self { extractor }
    }

    /// Returns the filter value of an entry.
    #[must_use]
    pub fn extract(&self, entry: &Entry) -> Option<Slice> {
        (self.extractor)(entry)
    }
}

/// Min/max filter of a component
///
/// An empty filter (no value seen yet) satisfies every predicate.
#[derive(Debug, Default)]
#[allow(clippy::module_name_repetitions)]
pub struct ComponentFilter(RwLock<Option<(Slice, Slice)>>);

impl ComponentFilter {
    /// Creates a filter with known bounds.
    #[must_use]
    pub fn with_bounds(min: Slice, max: Slice) -> Self {
        Self(RwLock::new(Some((min, max))))
    }

    /// Widens the filter to include `value`.
    pub fn update(&self, value: &Slice) {
        let mut lock = self.0.write().expect("lock is poisoned");

        match &mut *lock {
            Some((min, max)) => {
                if *value < *min {
                    *min = value.clone();
                }
                if *value > *max {
                    *max = value.clone();
                }
            }
            None => {
                *lock = Some((value.clone(), value.clone()));
            }
        }
    }

    /// Returns the filter bounds, if any value was seen.
    #[must_use]
    pub fn bounds(&self) -> Option<(Slice, Slice)> {
        self.0.read().expect("lock is poisoned").clone()
    }

    /// Returns `true` if the component may contain values inside `[min, max]`.
    ///
    /// Missing bounds on either side are treated as unbounded.
    #[must_use]
    pub fn satisfy(&self, min: Option<&[u8]>, max: Option<&[u8]>) -> bool {
        let lock = self.0.read().expect("lock is poisoned");

        let Some((own_min, own_max)) = &*lock else {
            return true;
        };

        if let Some(max) = max {
            if max < &**own_min {
                return false;
            }
        }

        if let Some(min) = min {
            if min > &**own_max {
                return false;
            }
        }

        true
    }

    /// Clears the filter.
    pub fn reset(&self) {
        *self.0.write().expect("lock is poisoned") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn component_filter_empty_satisfies() {
        let filter = ComponentFilter::default();
        assert!(filter.satisfy(Some(&b"a"[..]), Some(&b"z"[..])));
        assert!(filter.satisfy(None, None));
    }

    #[test]
    fn component_filter_update_and_satisfy() {
        let filter = ComponentFilter::default();
        filter.update(&Slice::from("d"));
        filter.update(&Slice::from("b"));
        filter.update(&Slice::from("f"));

        assert_eq!(
            Some((Slice::from("b"), Slice::from("f"))),
            filter.bounds()
        );

        assert!(filter.satisfy(Some(&b"a"[..]), Some(&b"b"[..])));
        assert!(filter.satisfy(Some(&b"c"[..]), Some(&b"e"[..])));
        assert!(filter.satisfy(Some(&b"f"[..]), None));
        assert!(!filter.satisfy(Some(&b"g"[..]), Some(&b"h"[..])));
        assert!(!filter.satisfy(None, Some(&b"a"[..])));

        filter.reset();
        assert!(filter.bounds().is_none());
    }
}
