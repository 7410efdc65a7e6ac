//! Type registry and per-type channel tables.
//!
//! Each message type gets its own [`ChannelTable`], created the first time
//! the type is referenced and kept for the life of the bus.  Tables are keyed
//! by [`TypeId`], so two types may reuse the same path string without ever
//! seeing each other's traffic.  Creation goes through [`DashMap::entry`],
//! which makes "create if absent" atomic under concurrent first use.

use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;

use crate::channel::{Channel, Message};
use crate::introspect::TypeSnapshot;

/// Type-erased view of one message type's channels.
///
/// Implemented once per concrete message type; lets the bus and diagnostic
/// viewers walk every table without knowing the types involved.
pub trait ChannelTable: Send + Sync {
    /// Fully-qualified name of the message type.
    fn type_name(&self) -> &'static str;

    /// Every path known to this table, sorted.
    fn paths(&self) -> Vec<String>;

    /// Point-in-time description of every channel, sorted by path.
    fn describe(&self) -> TypeSnapshot;

    #[doc(hidden)]
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Path → channel map for message type `T`.
pub(crate) struct TypedTable<T> {
    channels: DashMap<String, Arc<Channel<T>>>,
}

impl<T: Message> TypedTable<T> {
    fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// The channel at `path`, created on first use.
    pub(crate) fn channel(&self, path: &str) -> Arc<Channel<T>> {
        if let Some(existing) = self.channels.get(path) {
            return Arc::clone(existing.value());
        }
        let entry = self
            .channels
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Channel::new(path)));
        Arc::clone(entry.value())
    }

    /// The channel at `path` if anything has referenced it yet.
    pub(crate) fn find(&self, path: &str) -> Option<Arc<Channel<T>>> {
        self.channels.get(path).map(|c| Arc::clone(c.value()))
    }

    fn sorted_channels(&self) -> Vec<Arc<Channel<T>>> {
        // Clone out of the shards first; snapshots take channel locks.
        let mut channels: Vec<_> = self.channels.iter().map(|e| Arc::clone(e.value())).collect();
        channels.sort_by(|a, b| a.path().cmp(b.path()));
        channels
    }
}

impl<T: Message> ChannelTable for TypedTable<T> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }

    fn describe(&self) -> TypeSnapshot {
        TypeSnapshot {
            type_name: self.type_name().to_string(),
            channels: self.sorted_channels().iter().map(|c| c.snapshot()).collect(),
        }
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Process- or bus-wide table of every message type seen so far.
#[derive(Default)]
pub struct TypeRegistry {
    tables: DashMap<TypeId, Arc<dyn ChannelTable>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The channel table for `T`, created on first reference.
    pub(crate) fn table<T: Message>(&self) -> Arc<TypedTable<T>> {
        let table = Arc::clone(
            self.tables
                .entry(TypeId::of::<T>())
                .or_insert_with(|| Arc::new(TypedTable::<T>::new()) as Arc<dyn ChannelTable>)
                .value(),
        );
        // invariant: `tables` is private and only the entry above inserts into
        // it, always a `TypedTable<T>` under `TypeId::of::<T>()`.
        table
            .into_any()
            .downcast::<TypedTable<T>>()
            .unwrap_or_else(|_| unreachable!("channel table stored under a foreign TypeId"))
    }

    /// The channel table for `T` if the type has been referenced.
    pub(crate) fn existing<T: Message>(&self) -> Option<Arc<TypedTable<T>>> {
        let table = Arc::clone(self.tables.get(&TypeId::of::<T>())?.value());
        table.into_any().downcast::<TypedTable<T>>().ok()
    }

    /// Every registered table, sorted by type name.
    pub fn tables(&self) -> Vec<Arc<dyn ChannelTable>> {
        let mut tables: Vec<_> = self.tables.iter().map(|e| Arc::clone(e.value())).collect();
        tables.sort_by_key(|t| t.type_name());
        tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
