//! System utilities and monitoring
//!
//! Prometheus metrics for the coordinator and lock table.

pub mod metrics;

pub use metrics::{collect_metrics, VaultMetrics};
