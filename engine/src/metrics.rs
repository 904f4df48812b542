use prometheus_client::{
    metrics::{counter::Counter, gauge::Gauge},
    registry::Registry,
};

/// Counters and gauges maintained by the [crate::Engine].
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    pub requests_posted: Counter,
    pub commits: Counter,
    pub reveals: Counter,
    pub requests_expired: Counter,
    pub requests_tallied: Counter,
    /// 1 while data request processing is halted.
    pub flow_halted: Gauge,
}

impl Metrics {
    /// Create and register all metrics.
    pub fn init(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "requests_posted",
            "Number of data requests posted",
            metrics.requests_posted.clone(),
        );
        registry.register(
            "commits",
            "Number of accepted commitments",
            metrics.commits.clone(),
        );
        registry.register(
            "reveals",
            "Number of accepted reveals",
            metrics.reveals.clone(),
        );
        registry.register(
            "requests_expired",
            "Number of data requests whose commit or reveal phase timed out",
            metrics.requests_expired.clone(),
        );
        registry.register(
            "requests_tallied",
            "Number of data requests finalized",
            metrics.requests_tallied.clone(),
        );
        registry.register(
            "flow_halted",
            "Whether data request processing is halted",
            metrics.flow_halted.clone(),
        );
        metrics
    }
}
