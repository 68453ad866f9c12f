//! Metrics collection for Player Vaults
//!
//! Counters and gauges live in a crate-owned Prometheus registry so embedding
//! hosts can expose them next to their own metrics without name clashes.

use crate::core::error::Result;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, HistogramVec,
    IntCounter, IntCounterVec, IntGauge, Registry,
};

/// Registry holding every vault metric
static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static INSTANCE: Lazy<Option<VaultMetrics>> = Lazy::new(|| match VaultMetrics::new(&REGISTRY) {
    Ok(metrics) => Some(metrics),
    Err(e) => {
        tracing::warn!(error = %e, "vault metrics disabled");
        None
    }
});

/// Coordinator and lock table metrics
pub struct VaultMetrics {
    /// Completed operations by `operation` (open, save, delete) and `outcome`
    /// (ok, not_found, error)
    pub operations: IntCounterVec,
    /// Worker time per operation in seconds
    pub operation_duration: HistogramVec,
    /// Requests refused because the vault was in use
    pub busy_rejections: IntCounter,
    /// Saves refused because the caller did not hold the lock
    pub not_held_rejections: IntCounter,
    /// Locks taken over after their lease ran out
    pub lease_evictions: IntCounter,
    /// Currently held vault locks
    pub locks_held: IntGauge,
    /// Operations dispatched to workers and not yet completed
    pub in_flight: IntGauge,
}

impl VaultMetrics {
    /// Register a fresh set of metrics in `registry`
    pub fn new(registry: &Registry) -> Result<Self> {
        Ok(Self {
            operations: register_int_counter_vec_with_registry!(
                "pv_operations_total",
                "Completed vault operations",
                &["operation", "outcome"],
                registry
            )?,
            operation_duration: register_histogram_vec_with_registry!(
                "pv_operation_duration_seconds",
                "Duration of vault storage operations in seconds",
                &["operation"],
                vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0],
                registry
            )?,
            busy_rejections: register_int_counter_with_registry!(
                "pv_busy_rejections_total",
                "Requests refused because the vault was in use",
                registry
            )?,
            not_held_rejections: register_int_counter_with_registry!(
                "pv_not_held_rejections_total",
                "Saves refused because the lock was not held",
                registry
            )?,
            lease_evictions: register_int_counter_with_registry!(
                "pv_lease_evictions_total",
                "Vault locks evicted after their lease expired",
                registry
            )?,
            locks_held: register_int_gauge_with_registry!(
                "pv_locks_held",
                "Currently held vault locks",
                registry
            )?,
            in_flight: register_int_gauge_with_registry!(
                "pv_operations_in_flight",
                "Vault operations waiting on storage",
                registry
            )?,
        })
    }
}

/// Global metrics instance, `None` if registration failed
pub fn global() -> Option<&'static VaultMetrics> {
    INSTANCE.as_ref()
}

/// Registry for serving metrics to monitoring systems
pub fn registry() -> &'static Registry {
    &REGISTRY
}

/// Collect all vault metrics in the Prometheus text format
pub fn collect_metrics() -> String {
    let _ = global();
    let encoder = prometheus::TextEncoder::new();
    let metric_families = registry().gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}
