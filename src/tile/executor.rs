//! Bounded worker pool for tile writes.
//!
//! ```text
//! submit ──try_send──▶ [ bounded queue ] ──▶ worker 0..N (encode + write)
//!    │
//!    └── queue full ──▶ run on the submitting thread
//! ```
//!
//! When the queue is full the submitting thread runs the task itself. This
//! bounds queued memory without blocking the caller indefinitely and without
//! dropping work. Each store owns its own pool; there is no global pool.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::error::StoreError;

/// A unit of work for the pool.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

// =============================================================================
// CancellationFlag
// =============================================================================

/// Cooperative cancellation shared between a caller and queued units.
///
/// Units check the flag when they start; a unit already encoding runs to
/// completion.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// =============================================================================
// TileWriteExecutor
// =============================================================================

/// Fixed-size pool draining a bounded queue, with caller-runs backpressure.
pub struct TileWriteExecutor {
    sender: SyncSender<Job>,
    threads: usize,
    queue_capacity: usize,
    caller_runs: AtomicU64,
}

impl TileWriteExecutor {
    /// Default pool size: one less than the available parallelism, at least 1.
    pub fn default_threads() -> usize {
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .saturating_sub(1)
            .max(1)
    }

    /// Start `threads` workers sharing a queue of `queue_capacity` slots.
    pub fn new(threads: usize, queue_capacity: usize) -> Result<Self, StoreError> {
        let threads = threads.max(1);
        let (sender, receiver) = mpsc::sync_channel::<Job>(queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));

        for id in 0..threads {
            let receiver = Arc::clone(&receiver);
            thread::Builder::new()
                .name(format!("tile-write-{}", id))
                .spawn(move || worker_loop(id, receiver))
                .map_err(StoreError::WorkerSpawn)?;
        }

        debug!(threads, queue_capacity, "Started tile write executor");

        Ok(Self {
            sender,
            threads,
            queue_capacity,
            caller_runs: AtomicU64::new(0),
        })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Number of jobs that ran on the submitting thread because the queue was full.
    pub fn caller_runs(&self) -> u64 {
        self.caller_runs.load(Ordering::Relaxed)
    }

    /// Queue a job, or run it on the calling thread if the queue is full.
    pub fn execute(&self, job: Job) {
        match self.sender.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                self.caller_runs.fetch_add(1, Ordering::Relaxed);
                run_guarded(job, "caller");
            }
            Err(TrySendError::Disconnected(job)) => {
                // Workers are gone; keep the work rather than losing it
                run_guarded(job, "caller");
            }
        }
    }

    /// Run every unit on the pool and wait for all of them.
    ///
    /// Results come back in submission order. A unit that panicked yields
    /// `None`; the other units are unaffected.
    pub fn run_all<T, F, I>(&self, units: I) -> Vec<Option<T>>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<(usize, T)>();
        let mut submitted = 0;

        for (slot, unit) in units.into_iter().enumerate() {
            let tx = tx.clone();
            self.execute(Box::new(move || {
                let result = unit();
                let _ = tx.send((slot, result));
            }));
            submitted += 1;
        }
        drop(tx);

        let mut results: Vec<Option<T>> = (0..submitted).map(|_| None).collect();
        for (slot, result) in rx {
            results[slot] = Some(result);
        }
        results
    }
}

fn run_guarded(job: Job, runner: &str) {
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        error!(runner, "Tile write task panicked");
    }
}

fn worker_loop(id: usize, receiver: Arc<Mutex<Receiver<Job>>>) {
    let name = format!("worker-{}", id);
    loop {
        let job = receiver.lock().recv();
        match job {
            Ok(job) => run_guarded(job, &name),
            Err(_) => {
                debug!(worker = id, "Tile write worker shutting down");
                break;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
