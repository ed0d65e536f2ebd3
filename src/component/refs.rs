// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::sync::{Condvar, Mutex};

#[derive(Debug, Default)]
struct RefState {
    readers: usize,
    writers: usize,
    readable: bool,
    writable: bool,
}

/// Reader/writer reference counts of a component
///
/// Entering checks the readable/writable flag under the same lock that
/// the flag is flipped under, so once a component is sealed no new writer
/// can get in, and [`ComponentRefs::wait_for_writers`] only has to wait for
/// the ones already inside.
#[derive(Debug, Default)]
pub struct ComponentRefs {
    state: Mutex<RefState>,
    cond: Condvar,
}

impl ComponentRefs {
    /// Creates reference counts with the given flags.
    #[must_use]
    pub fn new(readable: bool, writable: bool) -> Self {
        Self {
            state: Mutex::new(RefState {
                readable,
                writable,
                ..Default::default()
            }),
            cond: Condvar::new(),
        }
    }

    /// Registers a writer if the component is writable.
    pub fn try_enter_writer(&self) -> bool {
        let mut state = self.state.lock().expect("lock is poisoned");

        if state.writable {
            state.writers += 1;
            true
        } else {
            false
        }
    }

    /// Unregisters a writer.
    pub fn exit_writer(&self) {
        let mut state = self.state.lock().expect("lock is poisoned");
        state.writers = state.writers.saturating_sub(1);

        if state.writers == 0 {
            self.cond.notify_all();
        }
    }

    /// Registers a reader if the component is readable.
    pub fn enter_reader(&self) -> bool {
        let mut state = self.state.lock().expect("lock is poisoned");

        if state.readable {
            state.readers += 1;
            true
        } else {
            false
        }
    }

    /// Unregisters a reader.
    ///
    /// Returns the number of readers left.
    pub fn exit_reader(&self) -> usize {
        let mut state = self.state.lock().expect("lock is poisoned");
        state.readers = state.readers.saturating_sub(1);

        if state.readers == 0 {
            self.cond.notify_all();
        }

        state.readers
    }

    /// Number of registered readers
    #[must_use]
    pub fn readers(&self) -> usize {
        self.state.lock().expect("lock is poisoned").readers
    }

    /// Number of registered writers
    #[must_use]
    pub fn writers(&self) -> usize {
        self.state.lock().expect("lock is poisoned").writers
    }

    /// Returns `true` if new readers are admitted.
    #[must_use]
    pub fn is_readable(&self) -> bool {
        self.state.lock().expect("lock is poisoned").readable
    }

    /// Returns `true` if new writers are admitted.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.state.lock().expect("lock is poisoned").writable
    }

    /// Sets both flags at once.
    pub fn set_flags(&self, readable: bool, writable: bool) {
        let mut state = self.state.lock().expect("lock is poisoned");
        state.readable = readable;
        state.writable = writable;
    }

    /// Admits or refuses new readers.
    pub fn set_readable(&self, readable: bool) {
        self.state.lock().expect("lock is poisoned").readable = readable;
    }

    /// Refuses new writers.
    ///
    /// Returns `true` if the component was writable before.
    pub fn seal(&self) -> bool {
        let mut state = self.state.lock().expect("lock is poisoned");
        std::mem::replace(&mut state.writable, false)
    }

    /// Blocks until all writers have left.
    pub fn wait_for_writers(&self) {
        let mut state = self.state.lock().expect("lock is poisoned");

        while state.writers > 0 {
            log::trace!("waiting for {} writer(s) to leave", state.writers);
            state = self.cond.wait(state).expect("lock is poisoned");
        }
    }

    /// Blocks until all readers have left.
    pub fn wait_for_readers(&self) {
        let mut state = self.state.lock().expect("lock is poisoned");

        while state.readers > 0 {
            log::trace!("waiting for {} reader(s) to leave", state.readers);
            state = self.cond.wait(state).expect("lock is poisoned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use test_log::test;

    #[test]
    fn refs_sealed_refuses_writers() {
        let refs = ComponentRefs::new(true, true);
        assert!(refs.try_enter_writer());
        assert!(refs.seal());
        assert!(!refs.try_enter_writer());
        assert!(!refs.seal());
        assert_eq!(1, refs.writers());
        refs.exit_writer();
        refs.wait_for_writers();
        assert_eq!(0, refs.writers());
    }

    #[test]
    fn refs_unreadable_refuses_readers() {
        let refs = ComponentRefs::new(false, false);
        assert!(!refs.enter_reader());

        refs.set_readable(true);
        assert!(refs.enter_reader());
        assert!(refs.enter_reader());
        assert_eq!(1, refs.exit_reader());
        assert_eq!(0, refs.exit_reader());
    }

    #[test]
    fn refs_wait_for_readers_blocks() {
        let refs = Arc::new(ComponentRefs::new(true, false));
        assert!(refs.enter_reader());

        let handle = std::thread::spawn({
            let refs = refs.clone();
            move || {
                refs.wait_for_readers();
                refs.readers()
            }
        });

        std::thread::sleep(std::time::Duration::from_millis(50));
        refs.exit_reader();

        assert_eq!(0, handle.join().expect("should join"));
    }
}
