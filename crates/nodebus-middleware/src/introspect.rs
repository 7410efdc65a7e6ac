//! Read-only snapshots of the bus for diagnostic viewers.
//!
//! Snapshots are copies; holding one never blocks publishers.  They are for
//! observation only and nothing in the bus reads them back.

use std::fmt;

use serde::Serialize;

use crate::dispatch::LoopState;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublisherSnapshot {
    pub latched: bool,
    pub has_value: bool,
    /// `Debug` rendering of the latched value.
    pub last_value: Option<String>,
    /// Publish calls made so far.
    pub published: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSnapshot {
    pub path: String,
    /// `None` when only subscribers have referenced the path.
    pub publisher: Option<PublisherSnapshot>,
    pub subscribers: usize,
    /// Values buffered across all subscribers, not yet delivered.
    pub pending: usize,
    /// Values discarded by full subscriber buffers.
    pub dropped: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeSnapshot {
    pub type_name: String,
    pub channels: Vec<ChannelSnapshot>,
}

impl TypeSnapshot {
    pub fn channel(&self, path: &str) -> Option<&ChannelSnapshot> {
        self.channels.iter().find(|c| c.path == path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusSnapshot {
    pub state: LoopState,
    /// Sorted by type name; channels within a type are sorted by path.
    pub types: Vec<TypeSnapshot>,
}

impl BusSnapshot {
    pub fn of_type<T: ?Sized>(&self) -> Option<&TypeSnapshot> {
        let name = std::any::type_name::<T>();
        self.types.iter().find(|t| t.type_name == name)
    }

    pub fn channel<T: ?Sized>(&self, path: &str) -> Option<&ChannelSnapshot> {
        self.of_type::<T>()?.channel(path)
    }

    pub fn channel_count(&self) -> usize {
        self.types.iter().map(|t| t.channels.len()).sum()
    }
}

impl fmt::Display for BusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "dispatch loop: {}", self.state)?;
        for t in &self.types {
            writeln!(f, "Channels of {}:", t.type_name)?;
            for c in &t.channels {
                writeln!(f, "  {c}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for ChannelSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = if self.subscribers == 1 { "" } else { "s" };
        match &self.publisher {
            Some(p) => {
                write!(f, "publisher @ {} with {} subscriber{plural}", self.path, self.subscribers)?;
                if p.latched {
                    match &p.last_value {
                        Some(v) => write!(f, " [latched: {v}]")?,
                        None => write!(f, " [latched, empty]")?,
                    }
                }
            }
            None => write!(f, "no publisher @ {} with {} subscriber{plural}", self.path, self.subscribers)?,
        }
        if self.pending > 0 || self.dropped > 0 {
            write!(f, " ({} pending, {} dropped)", self.pending, self.dropped)?;
        }
        Ok(())
    }
}
