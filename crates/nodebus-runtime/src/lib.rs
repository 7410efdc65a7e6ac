//! `nodebus-runtime` – hosting nodes on the bus.
//!
//! # Modules
//!
//! - [`node_host`] – the [`Node`][node_host::Node] trait and
//!   [`NodeHost`][node_host::NodeHost], which names nodes through the
//!   kernel's [`NodeRegistry`][nodebus_kernel::NodeRegistry], enables and
//!   disables them against a [`MessageBus`][nodebus_middleware::MessageBus],
//!   and ticks each one at its own rate.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   installs the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable export.

pub mod node_host;
pub mod telemetry;

pub use node_host::{Node, NodeHost, RunSummary};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
