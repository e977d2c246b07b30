//! Prometheus metrics for the I/O plane.

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

pub struct GatewayMetrics {
    registry: Registry,
    /// Classified events accepted, by channel kind.
    pub events: IntCounterVec,
    /// Payloads that failed to parse, by channel kind.
    pub parse_failures: IntCounterVec,
    /// Webhook handling latency, by channel kind.
    pub webhook_latency: HistogramVec,
    /// Queue rejections, by direction.
    pub queue_drops: IntCounterVec,
    /// Executed commands, by kind and outcome.
    pub commands: IntCounterVec,
    /// Controller stream re-dials.
    pub stream_reconnects: IntCounter,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let events = IntCounterVec::new(
            Opts::new("aegis_gateway_events_total", "Classified events accepted"),
            &["kind"],
        )
        .expect("valid metric opts");
        let parse_failures = IntCounterVec::new(
            Opts::new("aegis_gateway_parse_failures_total", "Dropped unparseable payloads"),
            &["kind"],
        )
        .expect("valid metric opts");
        let webhook_latency = HistogramVec::new(
            HistogramOpts::new("aegis_gateway_webhook_seconds", "Webhook handling latency"),
            &["kind"],
        )
        .expect("valid metric opts");
        let queue_drops = IntCounterVec::new(
            Opts::new("aegis_gateway_queue_drops_total", "Queue rejections"),
            &["direction"],
        )
        .expect("valid metric opts");
        let commands = IntCounterVec::new(
            Opts::new("aegis_gateway_commands_total", "Executed output commands"),
            &["kind", "outcome"],
        )
        .expect("valid metric opts");
        let stream_reconnects = IntCounter::new(
            "aegis_gateway_stream_reconnects_total",
            "Controller stream re-dials",
        )
        .expect("valid metric opts");

        for collector in [
            Box::new(events.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(parse_failures.clone()),
            Box::new(webhook_latency.clone()),
            Box::new(queue_drops.clone()),
            Box::new(commands.clone()),
            Box::new(stream_reconnects.clone()),
        ] {
            registry.register(collector).expect("register");
        }

        Self {
            registry,
            events,
            parse_failures,
            webhook_latency,
            queue_drops,
            commands,
            stream_reconnects,
        }
    }

    pub fn encode(&self) -> String {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .unwrap_or_default()
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}
