//! `nodebus-middleware` – the message bus every node talks through.
//!
//! Nodes (sensors, planners, controllers, viewers) never reference each
//! other.  They exchange values over typed, path-addressed channels and let
//! a single dispatch thread invoke their callbacks.
//!
//! # Modules
//!
//! - [`bus`] – [`MessageBus`]: the entry point.  Declares publishers and
//!   subscribers, schedules actions onto the dispatch thread, and exposes
//!   snapshots for diagnostic viewers.
//! - [`registry`] – [`TypeRegistry`] and the [`ChannelTable`] trait: one
//!   lazily created, isolated path table per message type.
//! - [`publisher`] / [`subscriber`] – the handles nodes hold on to.
//! - [`dispatch`] – the dispatch loop: wake-on-enqueue job queue, scheduled
//!   actions, per-callback failure isolation.
//! - [`introspect`] – serializable snapshots and the channel-viewer text.
//! - [`config`] – [`BusConfig`]: buffer capacity, overflow policy, loop pacing.

pub mod bus;
mod channel;
pub mod config;
pub mod dispatch;
pub mod introspect;
pub mod publisher;
pub mod registry;
pub mod subscriber;

pub use bus::MessageBus;
pub use channel::Message;
pub use config::{BusConfig, OverflowPolicy};
pub use dispatch::{LoopState, panic_message};
pub use introspect::{BusSnapshot, ChannelSnapshot, PublisherSnapshot, TypeSnapshot};
pub use publisher::Publisher;
pub use registry::{ChannelTable, TypeRegistry};
pub use subscriber::Subscriber;
pub use nodebus_types::BusError;
