use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, warn};
use parking_lot::Mutex;

use crate::error::{ChunkzipError, Result};

type Task = Box<dyn FnOnce() + Send + 'static>;

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// Lifecycle of a [`WorkerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Open,
    Closing,
    Closed,
}

struct PoolShared {
    state: AtomicU8,
    cancelled: AtomicBool,
    submitted: AtomicUsize,
    completed: AtomicUsize,
    skipped: AtomicUsize,
    panicked: AtomicUsize,
}

/// Fixed set of long-lived worker threads fed from one bounded FIFO queue.
///
/// `submit` blocks while the queue is full. Dropping the pool (or calling
/// [`WorkerPool::shutdown`]) stops intake, lets the workers drain the queue and
/// joins them. [`WorkerPool::abort`] does the same but queued tasks are
/// discarded instead of run.
///
/// A pool with zero workers runs each task inline inside `submit`.
pub struct WorkerPool {
    num_workers: usize,
    capacity: usize,
    shared: Arc<PoolShared>,
    sender: Mutex<Option<Sender<Task>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(num_workers: usize, capacity: usize) -> Result<Self> {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded::<Task>(capacity);
        let shared = Arc::new(PoolShared {
            state: AtomicU8::new(OPEN),
            cancelled: AtomicBool::new(false),
            submitted: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            panicked: AtomicUsize::new(0),
        });

        let mut handles = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let rx = rx.clone();
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("chunkzip-worker-{worker_id}"))
                .spawn(move || run_worker_loop(worker_id, rx, shared))
                .map_err(ChunkzipError::io("spawn worker thread"))?;
            handles.push(handle);
        }
        debug!("[pool] started {} workers, queue capacity {}", num_workers, capacity);

        Ok(Self {
            num_workers,
            capacity,
            shared,
            sender: Mutex::new(Some(tx)),
            handles: Mutex::new(handles),
        })
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn state(&self) -> PoolState {
        match self.shared.state.load(Ordering::Acquire) {
            OPEN => PoolState::Open,
            CLOSING => PoolState::Closing,
            _ => PoolState::Closed,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }

    /// Queues a task, blocking while the queue is full.
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.ensure_open()?;

        if self.num_workers == 0 {
            self.shared.submitted.fetch_add(1, Ordering::AcqRel);
            run_task(0, &self.shared, Box::new(task));
            return Ok(());
        }

        // Clone so a blocking send does not hold the lock shutdown needs.
        let sender = self.sender.lock().clone();
        let Some(sender) = sender else {
            return Err(self.closed_error());
        };

        self.shared.submitted.fetch_add(1, Ordering::AcqRel);
        if sender.send(Box::new(task)).is_err() {
            self.shared.submitted.fetch_sub(1, Ordering::AcqRel);
            return Err(self.closed_error());
        }
        Ok(())
    }

    /// Stops intake, waits for every queued task and joins all workers.
    /// Calling it again (or dropping the pool afterwards) is a no-op.
    pub fn shutdown(&self) {
        if self
            .shared
            .state
            .compare_exchange(OPEN, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        drop(self.sender.lock().take());

        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(payload) = handle.join() {
                error!("[pool] worker thread panicked outside a task: {}", panic_message(&*payload));
            }
        }

        self.shared.state.store(CLOSED, Ordering::Release);
        debug!(
            "[pool] shut down: submitted={} completed={} skipped={} panicked={}",
            self.submitted_count(),
            self.completed_count(),
            self.skipped_count(),
            self.panicked_count()
        );
    }

    /// Cancels outstanding work: queued tasks are dropped without running,
    /// tasks already running finish, then workers are joined.
    pub fn abort(&self) {
        if !self.shared.cancelled.swap(true, Ordering::AcqRel) {
            warn!("[pool] aborting; queued tasks will be skipped");
        }
        self.shutdown();
    }

    pub fn submitted_count(&self) -> usize {
        self.shared.submitted.load(Ordering::Acquire)
    }

    pub fn completed_count(&self) -> usize {
        self.shared.completed.load(Ordering::Acquire)
    }

    pub fn skipped_count(&self) -> usize {
        self.shared.skipped.load(Ordering::Acquire)
    }

    pub fn panicked_count(&self) -> usize {
        self.shared.panicked.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state() {
            PoolState::Open => Ok(()),
            _ => Err(self.closed_error()),
        }
    }

    fn closed_error(&self) -> ChunkzipError {
        match self.state() {
            PoolState::Closed => ChunkzipError::PoolClosed,
            _ => ChunkzipError::PoolClosing,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker_loop(worker_id: usize, rx: Receiver<Task>, shared: Arc<PoolShared>) {
    while let Ok(task) = rx.recv() {
        if shared.cancelled.load(Ordering::Acquire) {
            shared.skipped.fetch_add(1, Ordering::AcqRel);
            continue;
        }
        run_task(worker_id, &shared, task);
    }
    debug!("[worker {}] queue closed, exiting", worker_id);
}

fn run_task(worker_id: usize, shared: &PoolShared, task: Task) {
    match catch_unwind(AssertUnwindSafe(task)) {
        Ok(()) => {
            shared.completed.fetch_add(1, Ordering::AcqRel);
        }
        Err(payload) => {
            shared.panicked.fetch_add(1, Ordering::AcqRel);
            error!("[worker {}] task panicked: {}", worker_id, panic_message(&*payload));
        }
    }
}

pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
