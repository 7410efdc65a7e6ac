//! `nodebus-kernel` – node bookkeeping.
//!
//! Nothing in here touches the bus.  It answers two questions every hosted
//! node needs answered: "what am I called?" and "is it time to tick?".
//!
//! # Modules
//!
//! - [`node_registry`] – [`NodeRegistry`][node_registry::NodeRegistry]:
//!   process-unique node names, with optional anonymous suffixes so that many
//!   instances of the same node kind can coexist.
//! - [`tick_clock`] – [`TickClock`][tick_clock::TickClock]: converts elapsed
//!   frame time into a whole number of ticks at a configured rate.

pub mod node_registry;
pub mod tick_clock;

pub use node_registry::NodeRegistry;
pub use tick_clock::TickClock;
