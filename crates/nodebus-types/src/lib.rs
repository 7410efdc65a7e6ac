use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A point or direction in world space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };
    pub const ONE: Vec3 = Vec3 { x: 1.0, y: 1.0, z: 1.0 };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn add(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn scale(self, k: f32) -> Vec3 {
        Vec3::new(self.x * k, self.y * k, self.z * k)
    }

    pub fn distance(self, other: Vec3) -> f32 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Straight-alpha colour used by visual markers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const GREEN: Rgba = Rgba { r: 0.0, g: 1.0, b: 0.0, a: 1.0 };
    pub const RED: Rgba = Rgba { r: 1.0, g: 0.0, b: 0.0, a: 1.0 };
    /// Translucent grey, the default marker colour.
    pub const GHOST: Rgba = Rgba { r: 0.5, g: 0.5, b: 0.5, a: 0.5 };
}

/// Stamped frame information carried by sensor and map messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Name of the coordinate frame, e.g. `"map"` or `"base_scan"`.
    pub frame: String,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
}

impl Header {
    /// A fresh header at sequence 0, stamped now.
    pub fn new(frame: impl Into<String>) -> Self {
        Self {
            frame: frame.into(),
            seq: 0,
            timestamp: Utc::now(),
        }
    }

    /// The header for the following message in the same frame.
    pub fn next(&self) -> Self {
        Self {
            frame: self.frame.clone(),
            seq: self.seq + 1,
            timestamp: Utc::now(),
        }
    }
}

/// Geometry of an [`OccupancyGrid`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridInfo {
    pub width: usize,
    pub height: usize,
    /// Cell edge length in metres.
    pub resolution: f32,
    /// World position of cell (0, 0).
    pub origin: Vec3,
}

impl GridInfo {
    pub fn size(&self) -> usize {
        self.width * self.height
    }

    /// Half the grid's world-space footprint, on the XZ plane.
    pub fn extents(&self) -> Vec3 {
        Vec3::new(self.width as f32, 0.0, self.height as f32).scale(self.resolution / 2.0)
    }

    pub fn center(&self) -> Vec3 {
        self.origin.add(self.extents())
    }
}

/// Row-major 2-D occupancy map.
///
/// Cells hold `-1` for unknown, `0` for free and `100` for occupied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancyGrid {
    pub header: Header,
    pub info: GridInfo,
    pub data: Vec<i8>,
}

impl OccupancyGrid {
    pub const UNKNOWN: i8 = -1;
    pub const FREE: i8 = 0;
    pub const OCCUPIED: i8 = 100;

    pub fn new(header: Header, info: GridInfo, data: Vec<i8>) -> Self {
        Self { header, info, data }
    }

    /// A grid of the given geometry with every cell unknown.
    pub fn unknown(header: Header, info: GridInfo) -> Self {
        let data = vec![Self::UNKNOWN; info.size()];
        Self { header, info, data }
    }

    /// Cell value at `(x, y)`, or `None` outside the grid.
    pub fn get(&self, x: usize, y: usize) -> Option<i8> {
        if x >= self.info.width || y >= self.info.height {
            return None;
        }
        self.data.get(y * self.info.width + x).copied()
    }
}

/// One ray of a laser sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LaserLine {
    pub origin: Vec3,
    /// Unit direction of the ray.
    pub direction: Vec3,
    pub distance: f32,
    /// Whether the ray struck something before its maximum range.
    pub hit: bool,
}

impl LaserLine {
    pub fn end(&self) -> Vec3 {
        self.origin.add(self.direction.scale(self.distance))
    }
}

/// A full laser sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaserScanData {
    pub header: Header,
    pub lines: Vec<LaserLine>,
}

impl LaserScanData {
    /// The shortest ray that hit something, if any did.
    pub fn nearest_hit(&self) -> Option<&LaserLine> {
        self.lines
            .iter()
            .filter(|l| l.hit)
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    Sphere,
    #[default]
    Cube,
}

/// A visual annotation placed in the world by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub point: Vec3,
    pub size: Vec3,
    pub color: Rgba,
    pub kind: MarkerKind,
}

impl Default for Marker {
    fn default() -> Self {
        Self {
            point: Vec3::ZERO,
            size: Vec3::ONE,
            color: Rgba::GHOST,
            kind: MarkerKind::Cube,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Markers(pub Vec<Marker>);

/// A polyline through world space, e.g. a planned route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub points: Vec<Vec3>,
    pub color: Option<Rgba>,
}

impl Path {
    pub fn new(points: Vec<Vec3>) -> Self {
        Self { points, color: None }
    }

    /// Total length of all segments.
    pub fn length(&self) -> f32 {
        self.points.windows(2).map(|w| w[0].distance(w[1])).sum()
    }
}

/// Error type shared by the bus, the node kernel and the runtime.
///
/// Publish, subscribe and unsubscribe never produce one of these; they are
/// reserved for strict variants, lifecycle helpers and node bookkeeping.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusError {
    #[error("Latch Conflict on {type_name} @ {path}: publisher is latched={existing}, requested latched={requested}")]
    LatchConflict {
        type_name: String,
        path: String,
        existing: bool,
        requested: bool,
    },

    #[error("Dispatch loop is stopped")]
    Stopped,

    #[error("flush() called from the dispatch thread would wait on itself")]
    ReentrantFlush,

    #[error("Failed to spawn dispatch thread: {0}")]
    Spawn(String),

    #[error("Node named {0} already registered")]
    DuplicateNode(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}
