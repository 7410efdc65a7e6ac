//! The demo node graph run by the `nodebus` binary.
//!
//! ```text
//! SweepScanner ──scan──▶ NearestHit ──nearest (latched)──▶ MarkerLog
//! ```
//!
//! The scanner sweeps a fake room whose walls wobble over time, the nearest
//! hit of every sweep becomes a red sphere marker, and the log node reports
//! the latest marker on each of its ticks.

use std::f32::consts::TAU;
use std::sync::Arc;

use nodebus_middleware::{MessageBus, Publisher, Subscriber};
use nodebus_runtime::Node;
use nodebus_types::{Header, LaserLine, LaserScanData, Marker, MarkerKind, Rgba, Vec3};
use parking_lot::Mutex;
use tracing::{debug, info};

/// Longest ray the scanner reports as a hit.
pub const MAX_RANGE: f32 = 3.5;

/// Publishes a [`LaserScanData`] sweep on every tick.
pub struct SweepScanner {
    channel: String,
    rate: f32,
    beams: usize,
    header: Header,
    phase: f32,
    publisher: Option<Publisher<LaserScanData>>,
}

impl SweepScanner {
    pub fn new(channel: impl Into<String>, rate: f32, beams: usize) -> Self {
        Self {
            channel: channel.into(),
            rate,
            beams: beams.max(1),
            header: Header::new("base_scan"),
            phase: 0.0,
            publisher: None,
        }
    }

    fn sweep(&self) -> Vec<LaserLine> {
        (0..self.beams)
            .map(|i| {
                let angle = TAU * i as f32 / self.beams as f32;
                let direction = Vec3::new(angle.cos(), 0.0, angle.sin());
                let wall = 2.0 + 1.8 * (3.0 * angle + self.phase).sin();
                LaserLine {
                    origin: Vec3::ZERO,
                    direction,
                    distance: wall.min(MAX_RANGE),
                    hit: wall < MAX_RANGE,
                }
            })
            .collect()
    }
}

impl Node for SweepScanner {
    fn name(&self) -> &str {
        "sweep_scanner"
    }

    fn anonymous(&self) -> bool {
        true
    }

    fn rate(&self) -> f32 {
        self.rate
    }

    fn on_enable(&mut self, bus: &MessageBus) {
        self.publisher = Some(bus.publish_to_with(&self.channel, false));
    }

    fn tick(&mut self) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        let scan = LaserScanData {
            header: self.header.clone(),
            lines: self.sweep(),
        };
        let delivered = publisher.publish(scan);
        debug!(seq = self.header.seq, delivered, "sweep published");
        self.header = self.header.next();
        self.phase = (self.phase + 0.35) % TAU;
    }
}

/// Turns each sweep's nearest hit into a latched marker.
pub struct NearestHit {
    scan_channel: String,
    nearest_channel: String,
    subscriber: Option<Subscriber<LaserScanData>>,
}

impl NearestHit {
    pub fn new(scan_channel: impl Into<String>, nearest_channel: impl Into<String>) -> Self {
        Self {
            scan_channel: scan_channel.into(),
            nearest_channel: nearest_channel.into(),
            subscriber: None,
        }
    }
}

/// Marker placed at the end of `line`.
pub fn hit_marker(line: &LaserLine) -> Marker {
    Marker {
        point: line.end(),
        size: Vec3::ONE.scale(0.2),
        color: Rgba::RED,
        kind: MarkerKind::Sphere,
    }
}

impl Node for NearestHit {
    fn name(&self) -> &str {
        "nearest_hit"
    }

    fn on_enable(&mut self, bus: &MessageBus) {
        let out: Publisher<Marker> = bus.publish_to(&self.nearest_channel);
        self.subscriber = Some(bus.subscribe_to(&self.scan_channel, move |scan: LaserScanData| {
            if let Some(line) = scan.nearest_hit() {
                out.publish(hit_marker(line));
            }
        }));
    }

    fn on_disable(&mut self) {
        if let Some(sub) = self.subscriber.take() {
            sub.unsubscribe();
        }
    }
}

/// What [`MarkerLog`] has seen so far.
#[derive(Debug, Clone, Default)]
pub struct MarkerStats {
    pub received: u64,
    pub last: Option<Marker>,
}

/// Counts nearest-hit markers and logs the latest one on each tick.
pub struct MarkerLog {
    channel: String,
    stats: Arc<Mutex<MarkerStats>>,
    subscriber: Option<Subscriber<Marker>>,
}

impl MarkerLog {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            stats: Arc::new(Mutex::new(MarkerStats::default())),
            subscriber: None,
        }
    }

    /// Shared view of the counters, readable after the node is handed to a host.
    pub fn stats(&self) -> Arc<Mutex<MarkerStats>> {
        Arc::clone(&self.stats)
    }
}

impl Node for MarkerLog {
    fn name(&self) -> &str {
        "marker_log"
    }

    fn on_enable(&mut self, bus: &MessageBus) {
        let stats = Arc::clone(&self.stats);
        self.subscriber = Some(bus.subscribe_to(&self.channel, move |marker: Marker| {
            let mut stats = stats.lock();
            stats.received += 1;
            stats.last = Some(marker);
        }));
    }

    fn on_disable(&mut self) {
        if let Some(sub) = self.subscriber.take() {
            sub.unsubscribe();
        }
    }

    fn tick(&mut self) {
        let stats = self.stats.lock();
        if let Some(marker) = &stats.last {
            let distance = marker.point.distance(Vec3::ZERO);
            info!(received = stats.received, distance, "nearest obstacle");
        }
    }
}
