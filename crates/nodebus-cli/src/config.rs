//! Reads `~/.nodebus/config.toml` and applies `NODEBUS_*` overrides.

use nodebus_middleware::BusConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings for the `nodebus` demo process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Bus tunables, read from the `[bus]` table.
    #[serde(default)]
    pub bus: BusConfig,

    /// How long the demo runs.  `0` runs until Ctrl-C.
    #[serde(default = "default_run_seconds")]
    pub run_seconds: u64,

    /// Host frame length in milliseconds.
    #[serde(default = "default_frame_ms")]
    pub frame_ms: u64,

    /// Sweeps per second produced by the scanner node.
    #[serde(default = "default_scan_rate")]
    pub scan_rate: f32,

    /// Rays per sweep.
    #[serde(default = "default_beams")]
    pub beams: usize,

    #[serde(default = "default_scan_channel")]
    pub scan_channel: String,

    #[serde(default = "default_nearest_channel")]
    pub nearest_channel: String,
}

fn default_run_seconds() -> u64 {
    3
}
fn default_frame_ms() -> u64 {
    20
}
fn default_scan_rate() -> f32 {
    5.0
}
fn default_beams() -> usize {
    36
}
fn default_scan_channel() -> String {
    "scan".to_string()
}
fn default_nearest_channel() -> String {
    "nearest".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            run_seconds: default_run_seconds(),
            frame_ms: default_frame_ms(),
            scan_rate: default_scan_rate(),
            beams: default_beams(),
            scan_channel: default_scan_channel(),
            nearest_channel: default_nearest_channel(),
        }
    }
}

/// Return the path to `~/.nodebus/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".nodebus").join("config.toml")
}

/// Load the config file, falling back to defaults when it does not exist,
/// then apply environment overrides.
pub fn load() -> Result<Config, String> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Parse the config at `path`.  Returns `None` if the file does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `NODEBUS_*` environment variable overrides to `cfg`.  Values that do
/// not parse are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `NODEBUS_RUN_SECONDS` | `run_seconds` |
/// | `NODEBUS_FRAME_MS` | `frame_ms` |
/// | `NODEBUS_SCAN_RATE` | `scan_rate` |
/// | `NODEBUS_BEAMS` | `beams` |
/// | `NODEBUS_SCAN_CHANNEL` | `scan_channel` |
/// | `NODEBUS_NEAREST_CHANNEL` | `nearest_channel` |
/// | `NODEBUS_SUBSCRIBER_CAPACITY` | `bus.subscriber_capacity` (`0` = unbounded) |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Some(v) = parsed_var("NODEBUS_RUN_SECONDS") {
        cfg.run_seconds = v;
    }
    if let Some(v) = parsed_var("NODEBUS_FRAME_MS") {
        cfg.frame_ms = v;
    }
    if let Some(v) = parsed_var("NODEBUS_SCAN_RATE") {
        cfg.scan_rate = v;
    }
    if let Some(v) = parsed_var("NODEBUS_BEAMS") {
        cfg.beams = v;
    }
    if let Ok(v) = std::env::var("NODEBUS_SCAN_CHANNEL") {
        cfg.scan_channel = v;
    }
    if let Ok(v) = std::env::var("NODEBUS_NEAREST_CHANNEL") {
        cfg.nearest_channel = v;
    }
    if let Some(v) = parsed_var::<usize>("NODEBUS_SUBSCRIBER_CAPACITY") {
        cfg.bus.subscriber_capacity = Some(v);
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}
