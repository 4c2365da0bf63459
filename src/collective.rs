//! Worker group collectives
//!
//! Every worker in a run executes the same sequence of steps over its own
//! shard of the catalog. The only points where workers wait on each other
//! are the collectives defined here:
//!
//! - [`WorkerGroup::barrier`]: block until every worker arrives
//! - [`WorkerGroup::broadcast`]: one worker's value becomes everyone's
//! - [`WorkerGroup::all_reduce`]: combine one `u64` from each worker
//!
//! [`ThreadGroup`] implements these for workers that are threads of one
//! process. Every worker must call the same collectives in the same order;
//! a worker that skips one deadlocks the group.

use std::any::Any;
use std::sync::{Arc, Barrier, Mutex, MutexGuard, PoisonError};

/// Combining operation for [`WorkerGroup::all_reduce`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Min,
    Max,
}

impl ReduceOp {
    fn fold(self, values: impl Iterator<Item = u64>) -> u64 {
        match self {
            ReduceOp::Sum => values.fold(0u64, u64::saturating_add),
            ReduceOp::Min => values.min().unwrap_or(u64::MAX),
            ReduceOp::Max => values.max().unwrap_or(0),
        }
    }
}

/// A fixed-size group of workers running in lock step
pub trait WorkerGroup {
    /// This worker's index, `0..size()`
    fn rank(&self) -> usize;

    /// Number of workers in the group
    fn size(&self) -> usize;

    /// Block until every worker in the group has called `barrier`
    fn barrier(&self);

    /// Run `produce` on `root` only and hand its value to every worker
    fn broadcast<T, F>(&self, root: usize, produce: F) -> T
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> T;

    /// Combine one value from each worker; every worker gets the result
    fn all_reduce(&self, value: u64, op: ReduceOp) -> u64;

    /// Rank 0 coordinates lookups and prints reports
    fn is_coordinator(&self) -> bool {
        self.rank() == 0
    }
}

struct Shared {
    size: usize,
    barrier: Barrier,
    slot: Mutex<Option<Box<dyn Any + Send>>>,
    reduce: Mutex<Vec<u64>>,
}

/// Collectives for a group of threads in one process
pub struct ThreadGroup;

impl ThreadGroup {
    /// Create the handles for a group of `size` workers, one per thread.
    ///
    /// Handle `i` has rank `i`.
    pub fn new(size: usize) -> Vec<ThreadWorker> {
        let size = size.max(1);
        let shared = Arc::new(Shared {
            size,
            barrier: Barrier::new(size),
            slot: Mutex::new(None),
            reduce: Mutex::new(vec![0; size]),
        });

        (0..size)
            .map(|rank| ThreadWorker {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

/// One thread's handle into a [`ThreadGroup`]
pub struct ThreadWorker {
    rank: usize,
    shared: Arc<Shared>,
}

// A worker that panicked while holding a lock never reaches the next
// barrier, so the data behind a poisoned lock is still consistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl WorkerGroup for ThreadWorker {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn broadcast<T, F>(&self, root: usize, produce: F) -> T
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> T,
    {
        if self.rank == root {
            *lock(&self.shared.slot) = Some(Box::new(produce()));
        }
        self.barrier();

        let value = lock(&self.shared.slot)
            .as_ref()
            .and_then(|boxed| boxed.downcast_ref::<T>())
            .cloned()
            .expect("broadcast called with different types or roots across workers");

        // Nobody may overwrite the slot until everyone has read it
        self.barrier();
        if self.rank == root {
            *lock(&self.shared.slot) = None;
        }
        value
    }

    fn all_reduce(&self, value: u64, op: ReduceOp) -> u64 {
        lock(&self.shared.reduce)[self.rank] = value;
        self.barrier();

        let result = op.fold(lock(&self.shared.reduce).iter().copied());

        self.barrier();
        result
    }
}

/// A group of one, for single-threaded callers and tests
#[derive(Debug, Default, Clone, Copy)]
pub struct SoloGroup;

impl WorkerGroup for SoloGroup {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn broadcast<T, F>(&self, _root: usize, produce: F) -> T
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> T,
    {
        produce()
    }

    fn all_reduce(&self, value: u64, _op: ReduceOp) -> u64 {
        value
    }
}
