// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{IoOperation, IoScheduler};
use crate::{operation::IoOperationType, Error};
use std::{
    borrow::Cow,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::JoinHandle,
};
use std_semaphore::Semaphore;

enum WorkerMessage {
    Run(IoOperation),
    Close,
}

impl std::fmt::Debug for WorkerMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Run(op) => Cow::Owned(format!("WorkerMessage:Run({op:?})")),
                Self::Close => Cow::Borrowed("WorkerMessage:Close"),
            }
        )
    }
}

/// RAII guard to catch panics in IO workers
/// and poison the scheduler
struct PoisonDart {
    worker_id: usize,
    signal: Arc<AtomicBool>,
}

impl Drop for PoisonDart {
    fn drop(&mut self) {
        if std::thread::panicking() {
            log::error!(
                "Poisoning IO scheduler because of panic in worker #{}",
                self.worker_id
            );
            self.signal.store(true, Ordering::Release);
        }
    }
}

struct WorkerState {
    worker_id: usize,
    rx: flume::Receiver<WorkerMessage>,
    merge_permits: Arc<Semaphore>,
}

/// Runs IO operations on a pool of worker threads
///
/// Flushes and merges share the pool; the number of merges running at the
/// same time is bounded separately so merges cannot starve flushes.
pub struct ThreadPoolScheduler {
    sender: flume::Sender<WorkerMessage>,
    thread_handles: Mutex<Vec<JoinHandle<()>>>,
    pool_size: usize,
    poisoned: Arc<AtomicBool>,
}

impl ThreadPoolScheduler {
    /// Starts `pool_size` workers, at most `max_concurrent_merges` of which
    /// run merges at the same time.
    ///
    /// # Errors
    ///
    /// Will return `Err` if a thread cannot be spawned.
    pub fn new(pool_size: usize, max_concurrent_merges: usize) -> crate::Result<Self> {
        let pool_size = pool_size.max(1);
        let max_concurrent_merges = max_concurrent_merges.clamp(1, pool_size);

        log::debug!(
            "Starting IO scheduler with {pool_size} threads, {max_concurrent_merges} merge slots"
        );

        let (sender, rx) = flume::bounded(1_000);
        let poisoned = Arc::new(AtomicBool::default());

        #[allow(clippy::cast_possible_wrap)]
        let merge_permits = Arc::new(Semaphore::new(max_concurrent_merges as isize));

        let thread_handles = (0..pool_size)
            .map(|i| {
                let state = WorkerState {
                    worker_id: i,
                    rx: rx.clone(),
                    merge_permits: merge_permits.clone(),
                };

                let signal = poisoned.clone();

                std::thread::Builder::new()
                    .name("lsm:io-worker".to_string())
                    .spawn(move || {
                        log::trace!("Starting IO worker #{i}");

                        let _dart = PoisonDart {
                            worker_id: i,
                            signal,
                        };

                        while !worker_tick(&state) {}

                        log::trace!("IO worker #{i} closes");
                    })
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            sender,
            thread_handles: Mutex::new(thread_handles),
            pool_size,
            poisoned,
        })
    }

    /// Returns `true` if a worker panicked.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    /// Number of operations waiting for a worker
    #[must_use]
    pub fn queued(&self) -> usize {
        self.sender.len()
    }
}

/// Returns `true` if the worker should stop.
fn worker_tick(state: &WorkerState) -> bool {
    let Ok(item) = state.rx.recv() else {
        return true;
    };

    log::trace!("IO worker #{} got message: {item:?}", state.worker_id);

    match item {
        WorkerMessage::Close => true,
        WorkerMessage::Run(op) => {
            let _permit = (op.op_type() == IoOperationType::Merge)
                .then(|| state.merge_permits.access());

            if let Err(e) = op.call() {
                log::error!("IO worker #{}: {op:?} failed: {e:?}", state.worker_id);
            }

            false
        }
    }
}

impl IoScheduler for ThreadPoolScheduler {
    fn schedule_operation(&self, op: IoOperation) -> crate::Result<()> {
        if self.is_poisoned() {
            return Err(Error::InvariantViolation("IO scheduler is poisoned"));
        }

        self.sender
            .send(WorkerMessage::Run(op))
            .map_err(|_| Error::Interrupted)
    }
}

impl Drop for ThreadPoolScheduler {
    fn drop(&mut self) {
        log::trace!("Closing IO scheduler");

        for _ in 0..self.pool_size {
            self.sender.send(WorkerMessage::Close).ok();
        }

        let handles = std::mem::take(&mut *self.thread_handles.lock().expect("lock is poisoned"));

        let current = std::thread::current().id();

        // NOTE: The last index handle may be dropped by an operation running on a worker
        for handle in handles.into_iter().filter(|x| x.thread().id() != current) {
            if handle.join().is_err() {
                log::error!("IO worker panicked");
            }
        }
    }
}
