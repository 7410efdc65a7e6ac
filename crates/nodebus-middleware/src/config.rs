//! Tunables for a [`MessageBus`][crate::bus::MessageBus] instance.
//!
//! Every field has a default, so an empty `[bus]` table (or no table at all)
//! deserializes to [`BusConfig::default`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What a full subscriber buffer does with an incoming value.  Only
/// consulted when a capacity is configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest buffered value to make room for the new one.
    #[default]
    DropOldest,
    /// Discard the incoming value and keep the buffer as is.
    DropNewest,
}

/// Bus-wide settings, fixed when the bus starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Maximum values buffered per subscriber. `None` (the default) or `0`
    /// leaves buffers unbounded, so a slow subscriber accumulates values
    /// instead of losing them.
    #[serde(default)]
    pub subscriber_capacity: Option<usize>,

    #[serde(default)]
    pub overflow: OverflowPolicy,

    /// Longest time the dispatch loop waits for work before re-checking
    /// whether it has been stopped.
    #[serde(default = "default_idle_wait_ms")]
    pub idle_wait_ms: u64,

    /// Maximum jobs taken from the queue per dispatch iteration.
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
}

fn default_idle_wait_ms() -> u64 {
    50
}
fn default_max_batch() -> usize {
    1024
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: None,
            overflow: OverflowPolicy::default(),
            idle_wait_ms: default_idle_wait_ms(),
            max_batch: default_max_batch(),
        }
    }
}

impl BusConfig {
    /// Buffers capped at `capacity`, shedding values per `overflow`.
    pub fn bounded(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            subscriber_capacity: Some(capacity),
            overflow,
            ..Self::default()
        }
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms.max(1))
    }

    /// Capacity actually applied to buffers.
    pub(crate) fn effective_capacity(&self) -> Option<usize> {
        self.subscriber_capacity.filter(|&c| c > 0)
    }

    pub(crate) fn effective_batch(&self) -> usize {
        self.max_batch.max(1)
    }
}
