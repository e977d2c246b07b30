//! Prometheus metrics for the registry service.

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

pub struct RegistryMetrics {
    registry: Registry,
    /// Operation counter, labeled by operation and outcome.
    pub ops: IntCounterVec,
    /// Operation latency, labeled by operation.
    pub op_latency: HistogramVec,
    /// Currently registered services.
    pub services: IntGauge,
    pub cache_hits: IntCounter,
    pub cache_misses: IntCounter,
    /// Records transitioned to critical by the health reaper.
    pub reaper_transitions: IntCounter,
}

impl RegistryMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let ops = IntCounterVec::new(
            Opts::new("aegis_registry_ops_total", "Registry operations by outcome"),
            &["op", "outcome"],
        )
        .expect("valid metric opts");
        let op_latency = HistogramVec::new(
            HistogramOpts::new("aegis_registry_op_seconds", "Registry operation latency"),
            &["op"],
        )
        .expect("valid metric opts");
        let services = IntGauge::new("aegis_registry_services", "Registered services")
            .expect("valid metric opts");
        let cache_hits =
            IntCounter::new("aegis_registry_cache_hits_total", "Read-cache hits").expect("valid");
        let cache_misses = IntCounter::new("aegis_registry_cache_misses_total", "Read-cache misses")
            .expect("valid");
        let reaper_transitions = IntCounter::new(
            "aegis_registry_reaper_transitions_total",
            "Records marked critical by the health reaper",
        )
        .expect("valid");

        registry.register(Box::new(ops.clone())).expect("register");
        registry
            .register(Box::new(op_latency.clone()))
            .expect("register");
        registry
            .register(Box::new(services.clone()))
            .expect("register");
        registry
            .register(Box::new(cache_hits.clone()))
            .expect("register");
        registry
            .register(Box::new(cache_misses.clone()))
            .expect("register");
        registry
            .register(Box::new(reaper_transitions.clone()))
            .expect("register");

        Self {
            registry,
            ops,
            op_latency,
            services,
            cache_hits,
            cache_misses,
            reaper_transitions,
        }
    }

    pub fn observe(&self, op: &str, outcome: &str, latency: std::time::Duration) {
        self.ops.with_label_values(&[op, outcome]).inc();
        self.op_latency
            .with_label_values(&[op])
            .observe(latency.as_secs_f64());
    }

    /// Render the Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let metrics = self.registry.gather();
        TextEncoder::new()
            .encode_to_string(&metrics)
            .unwrap_or_default()
    }
}

impl Default for RegistryMetrics {
    fn default() -> Self {
        Self::new()
    }
}
