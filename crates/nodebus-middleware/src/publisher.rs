//! Publishers: the producing side of a channel.

use std::fmt;
use std::sync::Arc;

use crate::channel::{Channel, Message};

/// Handle bound to one `(type, path)` channel.
///
/// Every [`MessageBus::publish_to`][crate::bus::MessageBus::publish_to] call
/// for the same channel returns a handle to the same underlying publisher;
/// handles are cheap to clone and safe to use from any thread.
pub struct Publisher<T: Message> {
    channel: Arc<Channel<T>>,
}

impl<T: Message> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            channel: Arc::clone(&self.channel),
        }
    }
}

impl<T: Message> Publisher<T> {
    pub(crate) fn new(channel: Arc<Channel<T>>) -> Self {
        Self { channel }
    }

    /// Hand `value` to every subscriber currently on this channel and, when
    /// latched, retain it for subscribers that join later.
    ///
    /// Never blocks on the dispatch loop and never fails; publishing to a
    /// channel without subscribers only updates the latch.  Returns the
    /// number of subscribers the value was handed to.
    pub fn publish(&self, value: T) -> usize {
        self.channel.publish(value)
    }

    pub fn path(&self) -> &str {
        self.channel.path()
    }

    pub fn is_latched(&self) -> bool {
        self.channel.is_latched()
    }

    /// The retained value, if this publisher is latched and has published.
    pub fn latched_value(&self) -> Option<T> {
        self.channel.latched_value()
    }

    pub fn subscriber_count(&self) -> usize {
        self.channel.subscriber_count()
    }
}

impl<T: Message> fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("type_name", &self.channel.type_name())
            .field("path", &self.channel.path())
            .field("latched", &self.is_latched())
            .finish()
    }
}
