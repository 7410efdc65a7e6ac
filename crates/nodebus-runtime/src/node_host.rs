//! [`NodeHost`] – drives node lifecycles against a [`MessageBus`].
//!
//! A node declares its publishers and subscribers in [`Node::on_enable`],
//! releases its subscribers in [`Node::on_disable`], and does periodic work
//! in [`Node::tick`] at its own [`Node::rate`].  Ticks run on the thread that
//! calls [`NodeHost::update`]; bus callbacks run on the dispatch thread, so a
//! node sharing state between the two wraps it in a lock.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use nodebus_kernel::{NodeRegistry, TickClock};
use nodebus_middleware::{MessageBus, panic_message};
use nodebus_types::BusError;
use tracing::{debug, error, info};

/// A unit of robot behaviour wired to the bus.
pub trait Node: Send {
    /// Base name used for registration.
    fn name(&self) -> &str;

    /// Register as `name-<uuid>` so several instances can coexist.
    fn anonymous(&self) -> bool {
        false
    }

    /// Ticks per second.
    fn rate(&self) -> f32 {
        1.0
    }

    /// Declare publishers and subscribe callbacks.
    fn on_enable(&mut self, bus: &MessageBus);

    /// Unsubscribe everything subscribed in `on_enable`.
    fn on_disable(&mut self) {}

    fn tick(&mut self) {}
}

struct HostedNode {
    name: String,
    node: Box<dyn Node>,
    clock: TickClock,
    enabled: bool,
}

/// Totals reported by [`NodeHost::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub ticks: u64,
}

/// Owns a set of nodes and the registry that names them.
pub struct NodeHost {
    bus: MessageBus,
    registry: NodeRegistry,
    nodes: Vec<HostedNode>,
}

impl NodeHost {
    pub fn new(bus: MessageBus) -> Self {
        Self {
            bus,
            registry: NodeRegistry::new(),
            nodes: Vec::new(),
        }
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Register `node` and return the name it was given.  The node starts
    /// disabled.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::DuplicateNode`] when the name is taken.
    pub fn add(&mut self, node: impl Node + 'static) -> Result<String, BusError> {
        let name = self.registry.register(node.name(), node.anonymous())?;
        let clock = TickClock::new(node.rate());
        self.nodes.push(HostedNode {
            name: name.clone(),
            node: Box::new(node),
            clock,
            enabled: false,
        });
        Ok(name)
    }

    /// Names of every hosted node, in insertion order.
    pub fn names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.nodes.iter().any(|n| n.name == name && n.enabled)
    }

    /// Enable `name`.  Returns `false` for unknown or already enabled nodes.
    pub fn enable(&mut self, name: &str) -> bool {
        let bus = &self.bus;
        match self.nodes.iter_mut().find(|n| n.name == name) {
            Some(hosted) => Self::enable_node(bus, hosted),
            None => false,
        }
    }

    pub fn enable_all(&mut self) {
        let bus = &self.bus;
        for hosted in &mut self.nodes {
            Self::enable_node(bus, hosted);
        }
    }

    /// Disable `name`.  Returns `false` for unknown or already disabled nodes.
    pub fn disable(&mut self, name: &str) -> bool {
        match self.nodes.iter_mut().find(|n| n.name == name) {
            Some(hosted) => Self::disable_node(hosted),
            None => false,
        }
    }

    pub fn disable_all(&mut self) {
        for hosted in &mut self.nodes {
            Self::disable_node(hosted);
        }
    }

    /// Disable and unregister `name`.  Returns whether it was hosted.
    pub fn remove(&mut self, name: &str) -> bool {
        let Some(index) = self.nodes.iter().position(|n| n.name == name) else {
            return false;
        };
        let mut hosted = self.nodes.remove(index);
        Self::disable_node(&mut hosted);
        self.registry.unregister(&hosted.name);
        true
    }

    /// Advance every enabled node's clock by `dt` and run the ticks due.
    /// Returns the number of ticks run.
    pub fn update(&mut self, dt: Duration) -> u64 {
        let mut total = 0;
        for hosted in self.nodes.iter_mut().filter(|n| n.enabled) {
            for _ in 0..hosted.clock.advance(dt) {
                total += 1;
                let node = &mut hosted.node;
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| node.tick())) {
                    let message = panic_message(payload.as_ref());
                    error!(node = %hosted.name, error = message, "node tick panicked");
                }
            }
        }
        total
    }

    /// Call [`NodeHost::update`] once per `frame` until `limit` has elapsed
    /// (if given) or `shutdown` is set.
    pub fn run(&mut self, frame: Duration, limit: Option<Duration>, shutdown: &AtomicBool) -> RunSummary {
        let started = Instant::now();
        let mut last = started;
        let mut summary = RunSummary::default();
        info!(nodes = self.nodes.len(), ?frame, ?limit, "node host running");
        loop {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            if let Some(limit) = limit
                && started.elapsed() >= limit
            {
                break;
            }
            thread::sleep(frame);
            let now = Instant::now();
            summary.ticks += self.update(now - last);
            summary.frames += 1;
            last = now;
        }
        info!(frames = summary.frames, ticks = summary.ticks, "node host stopped");
        summary
    }

    fn enable_node(bus: &MessageBus, hosted: &mut HostedNode) -> bool {
        if hosted.enabled {
            return false;
        }
        hosted.node.on_enable(bus);
        hosted.clock.reset();
        hosted.enabled = true;
        debug!(node = %hosted.name, "node enabled");
        true
    }

    fn disable_node(hosted: &mut HostedNode) -> bool {
        if !hosted.enabled {
            return false;
        }
        hosted.node.on_disable();
        hosted.enabled = false;
        debug!(node = %hosted.name, "node disabled");
        true
    }
}

impl Drop for NodeHost {
    fn drop(&mut self) {
        self.disable_all();
    }
}
