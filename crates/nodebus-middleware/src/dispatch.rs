//! The dispatch loop – the only thread that ever runs user callbacks.
//!
//! Producers never call into subscribers directly.  A subscriber whose buffer
//! goes from idle to pending pushes a single [`Job::Drain`] onto one shared
//! job queue; scheduled actions, flush barriers and the stop request travel
//! through the same queue.  The loop blocks on that queue for at most
//! `idle_wait` and, per iteration, takes up to `max_batch` jobs and processes
//! them in three phases:
//!
//! 1. every scheduled action, in submission order;
//! 2. every ready subscriber, each drained completely in FIFO order;
//! 3. every flush barrier, released once the work queued before it is done.
//!
//! Each action, each drain and each callback invocation runs inside its own
//! `catch_unwind`.  A drain that unwinds is rescheduled if values remain, so
//! a subscriber is never left marked as queued with nothing queued for it.
//! The iteration as a whole sits inside one more guard that reschedules any
//! drains it did not reach and releases its barriers.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use nodebus_types::BusError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::config::BusConfig;

/// Name given to the dispatch thread.
pub const DISPATCH_THREAD_NAME: &str = "nodebus-dispatch";

/// A zero-argument closure scheduled onto the dispatch thread.
pub(crate) type Action = Box<dyn FnOnce() + Send + 'static>;

/// Something with buffered values waiting for delivery.
pub(crate) trait Drain: Send + Sync {
    /// Deliver every buffered value, in order, to the owning callback.
    fn drain(&self);

    /// Recover after `drain` unwound or was skipped: queue another drain if
    /// values are still buffered.
    fn reschedule(self: Arc<Self>);
}

pub(crate) enum Job {
    Run(Action),
    Drain(Arc<dyn Drain>),
    Barrier(Sender<()>),
    Stop,
}

/// Lifecycle of the dispatch loop.  `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Running,
    Stopped,
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopState::Running => write!(f, "running"),
            LoopState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Render a panic payload for logging.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handle owned by the bus
// ────────────────────────────────────────────────────────────────────────────

pub(crate) struct Dispatcher {
    jobs: Sender<Job>,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl Dispatcher {
    /// Spawn the dispatch thread.
    pub(crate) fn spawn(config: &BusConfig) -> Result<Self, BusError> {
        let (jobs, rx) = channel::unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let worker = DispatchLoop {
            rx,
            running: Arc::clone(&running),
            idle_wait: config.idle_wait(),
            max_batch: config.effective_batch(),
        };
        let handle = thread::Builder::new()
            .name(DISPATCH_THREAD_NAME.to_string())
            .spawn(move || worker.run())
            .map_err(|e| BusError::Spawn(e.to_string()))?;
        let thread_id = handle.thread().id();
        Ok(Self {
            jobs,
            running,
            thread: Mutex::new(Some(handle)),
            thread_id,
        })
    }

    pub(crate) fn sender(&self) -> Sender<Job> {
        self.jobs.clone()
    }

    pub(crate) fn state(&self) -> LoopState {
        if self.running.load(Ordering::Acquire) {
            LoopState::Running
        } else {
            LoopState::Stopped
        }
    }

    pub(crate) fn is_dispatch_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    pub(crate) fn schedule(&self, action: Action) {
        if self.jobs.send(Job::Run(action)).is_err() {
            debug!("dispatch loop stopped; scheduled action discarded");
        }
    }

    /// Block until every job queued before this call has been processed.
    pub(crate) fn flush(&self) -> Result<(), BusError> {
        if self.is_dispatch_thread() {
            return Err(BusError::ReentrantFlush);
        }
        if self.state() == LoopState::Stopped {
            return Err(BusError::Stopped);
        }
        let (tx, rx) = channel::bounded(1);
        self.jobs
            .send(Job::Barrier(tx))
            .map_err(|_| BusError::Stopped)?;
        // A loop that exits first drops the barrier, which disconnects `rx`.
        rx.recv().map_err(|_| BusError::Stopped)
    }

    /// Move the loop to `Stopped` and wait for the thread to exit.
    ///
    /// Called from the dispatch thread itself this only signals; the loop
    /// exits after the current iteration.
    pub(crate) fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        let _ = self.jobs.send(Job::Stop);
        if self.is_dispatch_thread() {
            return;
        }
        if let Some(handle) = self.thread.lock().take()
            && handle.join().is_err()
        {
            error!("dispatch thread terminated abnormally");
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// The loop itself
// ────────────────────────────────────────────────────────────────────────────

struct DispatchLoop {
    rx: Receiver<Job>,
    running: Arc<AtomicBool>,
    idle_wait: Duration,
    max_batch: usize,
}

impl DispatchLoop {
    fn run(self) {
        debug!(idle_wait = ?self.idle_wait, max_batch = self.max_batch, "dispatch loop started");
        loop {
            let first = match self.rx.recv_timeout(self.idle_wait) {
                Ok(job) => job,
                Err(RecvTimeoutError::Timeout) => {
                    if self.running.load(Ordering::Acquire) {
                        continue;
                    }
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            };

            let mut batch = Batch::default();
            batch.push(first);
            while batch.len < self.max_batch {
                match self.rx.try_recv() {
                    Ok(job) => batch.push(job),
                    Err(_) => break,
                }
            }

            let stop = batch.stop;
            trace!(jobs = batch.len, "dispatch iteration");
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| batch.run())) {
                error!(
                    error = panic_message(payload.as_ref()),
                    "dispatch iteration failed; continuing"
                );
                batch.recover();
            }
            if stop {
                break;
            }
        }
        self.running.store(false, Ordering::Release);
        debug!("dispatch loop stopped");
    }
}

#[derive(Default)]
struct Batch {
    actions: VecDeque<Action>,
    drains: VecDeque<Arc<dyn Drain>>,
    barriers: Vec<Sender<()>>,
    stop: bool,
    len: usize,
}

impl Batch {
    fn push(&mut self, job: Job) {
        self.len += 1;
        match job {
            Job::Run(action) => self.actions.push_back(action),
            Job::Drain(ready) => self.drains.push_back(ready),
            Job::Barrier(done) => self.barriers.push(done),
            Job::Stop => self.stop = true,
        }
    }

    /// Jobs are popped as they run, so whatever is left after an unwind is
    /// exactly the unprocessed part of the batch.
    fn run(&mut self) {
        while let Some(action) = self.actions.pop_front() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(action)) {
                error!(
                    error = panic_message(payload.as_ref()),
                    "scheduled action panicked"
                );
            }
        }
        while let Some(ready) = self.drains.pop_front() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| ready.drain())) {
                error!(
                    error = panic_message(payload.as_ref()),
                    "subscriber drain panicked; rescheduling"
                );
                ready.reschedule();
            }
        }
        self.release_barriers();
    }

    /// Hand unreached drains back to the queue and release every barrier.
    fn recover(&mut self) {
        if !self.actions.is_empty() {
            error!(skipped = self.actions.len(), "scheduled actions lost to a failed iteration");
            self.actions.clear();
        }
        for ready in self.drains.drain(..) {
            ready.reschedule();
        }
        self.release_barriers();
    }

    fn release_barriers(&mut self) {
        for done in self.barriers.drain(..) {
            let _ = done.send(());
        }
    }
}
