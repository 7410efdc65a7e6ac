//! Subscribers: a callback plus the FIFO buffer that feeds it.
//!
//! Any thread may [`enqueue`][SubscriberCore::enqueue] into a buffer; only the
//! dispatch thread drains it.  The `scheduled` flag ensures a buffer is queued
//! for draining at most once at a time: it is set by the enqueue that finds
//! the buffer idle and cleared by the drain *before* it starts popping, so a
//! value that races with a finishing drain always triggers a fresh one.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam::channel::Sender;
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::channel::{Channel, Message};
use crate::config::OverflowPolicy;
use crate::dispatch::{Drain, Job, panic_message};

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) type Callback<T> = Box<dyn FnMut(T) + Send + 'static>;

pub(crate) struct SubscriberCore<T> {
    id: u64,
    type_name: &'static str,
    path: Arc<str>,
    buffer: Mutex<VecDeque<T>>,
    capacity: Option<usize>,
    overflow: OverflowPolicy,
    scheduled: AtomicBool,
    dropped: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    callback: Mutex<Callback<T>>,
    jobs: Sender<Job>,
}

impl<T: Message> SubscriberCore<T> {
    pub(crate) fn new(
        channel: &Channel<T>,
        callback: Callback<T>,
        capacity: Option<usize>,
        overflow: OverflowPolicy,
        jobs: Sender<Job>,
    ) -> Self {
        Self {
            id: NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed),
            type_name: channel.type_name(),
            path: channel.shared_path(),
            buffer: Mutex::new(VecDeque::new()),
            capacity,
            overflow,
            scheduled: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            callback: Mutex::new(callback),
            jobs,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn pending(&self) -> usize {
        self.buffer.lock().len()
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Append `value` to the buffer and make sure a drain is queued.
    pub(crate) fn enqueue(self: &Arc<Self>, value: T) {
        {
            let mut buffer = self.buffer.lock();
            if let Some(capacity) = self.capacity
                && buffer.len() >= capacity
            {
                self.note_overflow(capacity);
                match self.overflow {
                    OverflowPolicy::DropOldest => {
                        buffer.pop_front();
                    }
                    OverflowPolicy::DropNewest => return,
                }
            }
            buffer.push_back(value);
        }
        self.schedule();
    }

    /// Queue a drain unless one is already queued.
    fn schedule(self: &Arc<Self>) {
        if !self.scheduled.swap(true, Ordering::AcqRel) {
            let ready: Arc<dyn Drain> = Arc::clone(self) as Arc<dyn Drain>;
            if self.jobs.send(Job::Drain(ready)).is_err() {
                trace!(path = %self.path, subscriber = self.id, "dispatch loop stopped; value stays buffered");
            }
        }
    }

    fn note_overflow(&self, capacity: usize) {
        let previous = self.dropped.fetch_add(1, Ordering::Relaxed);
        if previous == 0 {
            warn!(
                type_name = self.type_name,
                path = %self.path,
                subscriber = self.id,
                capacity,
                policy = ?self.overflow,
                "subscriber buffer full; dropping values"
            );
        } else {
            trace!(path = %self.path, subscriber = self.id, dropped = previous + 1, "subscriber overflow");
        }
    }

    fn deliver(&self, value: T) {
        let mut callback = self.callback.lock();
        // The copy kept for the failure log is taken inside the guard: a
        // message type's own `Clone` may panic too.
        let mut shown = None;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            shown = Some(value.clone());
            (*callback)(value)
        }));
        match outcome {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(payload) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                let rendered = shown
                    .as_ref()
                    .and_then(|v| panic::catch_unwind(AssertUnwindSafe(|| format!("{v:?}"))).ok())
                    .unwrap_or_else(|| "<unavailable>".to_string());
                error!(
                    type_name = self.type_name,
                    path = %self.path,
                    subscriber = self.id,
                    value = %rendered,
                    error = panic_message(payload.as_ref()),
                    "subscriber callback panicked"
                );
            }
        }
    }
}

impl<T: Message> Drain for SubscriberCore<T> {
    fn drain(&self) {
        self.scheduled.store(false, Ordering::Release);
        loop {
            let Some(value) = self.buffer.lock().pop_front() else {
                break;
            };
            self.deliver(value);
        }
    }

    fn reschedule(self: Arc<Self>) {
        self.scheduled.store(false, Ordering::Release);
        if !self.buffer.lock().is_empty() {
            self.schedule();
        }
    }
}

/// Handle returned by [`MessageBus::subscribe_to`][crate::bus::MessageBus::subscribe_to].
///
/// Dropping the handle does **not** detach the callback; nodes call
/// [`Subscriber::unsubscribe`] from their teardown path.
pub struct Subscriber<T: Message> {
    core: Arc<SubscriberCore<T>>,
    channel: Arc<Channel<T>>,
    attached: AtomicBool,
}

impl<T: Message> Subscriber<T> {
    pub(crate) fn attach(channel: Arc<Channel<T>>, core: Arc<SubscriberCore<T>>) -> Self {
        channel.attach(Arc::clone(&core));
        debug!(type_name = channel.type_name(), path = channel.path(), subscriber = core.id, "subscribed");
        Self {
            core,
            channel,
            attached: AtomicBool::new(true),
        }
    }

    /// Stop receiving values published from now on.
    ///
    /// Idempotent.  Values already buffered may still be delivered.
    pub fn unsubscribe(&self) {
        if self.attached.swap(false, Ordering::AcqRel) {
            self.channel.detach(self.core.id);
            debug!(
                type_name = self.channel.type_name(),
                path = self.channel.path(),
                subscriber = self.core.id,
                "unsubscribed"
            );
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    pub fn id(&self) -> u64 {
        self.core.id
    }

    pub fn path(&self) -> &str {
        self.channel.path()
    }

    /// Values buffered but not yet handed to the callback.
    pub fn pending(&self) -> usize {
        self.core.pending()
    }

    /// Values discarded because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.core.dropped()
    }

    /// Callback invocations that returned normally.
    pub fn delivered(&self) -> u64 {
        self.core.delivered.load(Ordering::Relaxed)
    }

    /// Callback invocations that panicked.
    pub fn failures(&self) -> u64 {
        self.core.failed.load(Ordering::Relaxed)
    }
}

impl<T: Message> fmt::Debug for Subscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("type_name", &self.core.type_name)
            .field("path", &self.channel.path())
            .field("id", &self.core.id)
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}
