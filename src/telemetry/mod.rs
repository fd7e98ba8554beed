//! Executor counters.
//!
//! Always-on atomic counters for what the workers did, plus a run latency
//! histogram when the `telemetry` feature is enabled.

pub mod metrics;

pub use metrics::{Metrics, MetricsSnapshot};
