//! A single channel: one message type, one path.
//!
//! The channel owns the publisher's latch slot and the current subscriber
//! set behind one mutex.  Publishing, attaching and detaching all take that
//! mutex, which serializes concurrent publishes and guarantees that a
//! subscriber joining a latched channel sees each value exactly once: either
//! through fan-out or through the latch replay, never both.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::introspect::{ChannelSnapshot, PublisherSnapshot};
use crate::subscriber::SubscriberCore;

/// Anything that can travel over the bus.
///
/// Blanket-implemented; a message type only needs to be cloneable (for
/// fan-out and latching), debuggable (for failure logs and the channel
/// viewer) and sendable to the dispatch thread.
pub trait Message: Clone + fmt::Debug + Send + 'static {}

impl<T> Message for T where T: Clone + fmt::Debug + Send + 'static {}

struct ChannelState<T> {
    last: Option<T>,
    subscribers: Vec<Arc<SubscriberCore<T>>>,
}

pub(crate) struct Channel<T> {
    type_name: &'static str,
    path: Arc<str>,
    /// Latch setting of the publisher; unset until a publisher exists.
    latched: OnceLock<bool>,
    state: Mutex<ChannelState<T>>,
    published: AtomicU64,
}

impl<T: Message> Channel<T> {
    pub(crate) fn new(path: &str) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            path: Arc::from(path),
            latched: OnceLock::new(),
            state: Mutex::new(ChannelState {
                last: None,
                subscribers: Vec::new(),
            }),
            published: AtomicU64::new(0),
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn shared_path(&self) -> Arc<str> {
        Arc::clone(&self.path)
    }

    /// Install the publisher with `latched` unless one exists already.
    /// Returns the latch setting in effect.
    pub(crate) fn advertise(&self, latched: bool) -> bool {
        *self.latched.get_or_init(|| latched)
    }

    pub(crate) fn has_publisher(&self) -> bool {
        self.latched.get().is_some()
    }

    pub(crate) fn is_latched(&self) -> bool {
        self.latched.get().copied().unwrap_or(false)
    }

    /// Fan `value` out to every current subscriber, then latch it.
    /// Returns the number of subscribers handed the value.
    pub(crate) fn publish(&self, value: T) -> usize {
        let mut state = self.state.lock();
        for sub in &state.subscribers {
            sub.enqueue(value.clone());
        }
        let handed = state.subscribers.len();
        if self.is_latched() {
            state.last = Some(value);
        }
        self.published.fetch_add(1, Ordering::Relaxed);
        handed
    }

    /// Add `core` to the subscriber set, replaying the latched value first.
    pub(crate) fn attach(&self, core: Arc<SubscriberCore<T>>) {
        let mut state = self.state.lock();
        if self.is_latched()
            && let Some(last) = &state.last
        {
            core.enqueue(last.clone());
        }
        state.subscribers.push(core);
    }

    /// Remove the subscriber with `id`.  Returns whether it was present.
    pub(crate) fn detach(&self, id: u64) -> bool {
        let mut state = self.state.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|s| s.id() != id);
        state.subscribers.len() != before
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    pub(crate) fn latched_value(&self) -> Option<T> {
        self.state.lock().last.clone()
    }

    pub(crate) fn snapshot(&self) -> ChannelSnapshot {
        let state = self.state.lock();
        let publisher = self.latched.get().map(|&latched| PublisherSnapshot {
            latched,
            has_value: state.last.is_some(),
            last_value: state.last.as_ref().map(|v| format!("{v:?}")),
            published: self.published.load(Ordering::Relaxed),
        });
        ChannelSnapshot {
            path: self.path.to_string(),
            publisher,
            subscribers: state.subscribers.len(),
            pending: state.subscribers.iter().map(|s| s.pending()).sum(),
            dropped: state.subscribers.iter().map(|s| s.dropped()).sum(),
        }
    }
}
