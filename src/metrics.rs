use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::time::Instant;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Analysis metrics
    pub static ref ANALYSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("analyses_total", "Total number of completed analyses"),
        &["backend"]
    ).unwrap();

    pub static ref ANALYSIS_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("analysis_failures_total", "Total number of failed analyses"),
        &["kind"]
    ).unwrap();

    pub static ref FALLBACKS_TOTAL: IntCounter = IntCounter::new(
        "fallbacks_total",
        "Total number of analyses that fell back to the simulated backend"
    ).unwrap();

    pub static ref PERSISTENCE_FAILURES: IntCounter = IntCounter::new(
        "persistence_failures_total",
        "Total number of non-fatal result persistence failures"
    ).unwrap();

    pub static ref BATCH_REQUESTS: IntCounter = IntCounter::new(
        "batch_requests_total",
        "Total number of batch analysis requests"
    ).unwrap();

    // Latency metrics (in seconds)
    pub static ref ANALYSIS_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "analysis_duration_seconds",
            "End-to-end analysis latency in seconds"
        )
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["backend"]
    ).unwrap();

    pub static ref HEALTH_PROBE_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "health_probe_duration_seconds",
            "Remote analyzer health probe latency in seconds"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0])
    ).unwrap();

    // Backend availability gauges
    pub static ref REMOTE_HEALTHY: IntGauge = IntGauge::new(
        "remote_backend_healthy",
        "Whether the remote analyzer passed its last health check (1/0)"
    ).unwrap();

    pub static ref LOCAL_MODEL_READY: IntGauge = IntGauge::new(
        "local_model_ready",
        "Whether the in-process model finished initialization (1/0)"
    ).unwrap();

    // Storage metrics
    pub static ref STORED_ANALYSES: IntCounter = IntCounter::new(
        "stored_analyses_total",
        "Total number of analysis records persisted"
    ).unwrap();
}

/// Register all metrics with the registry. Call once at startup.
pub fn init_metrics() {
    let registry = &REGISTRY;

    registry.register(Box::new(ANALYSES_TOTAL.clone())).ok();
    registry.register(Box::new(ANALYSIS_FAILURES.clone())).ok();
    registry.register(Box::new(FALLBACKS_TOTAL.clone())).ok();
    registry.register(Box::new(PERSISTENCE_FAILURES.clone())).ok();
    registry.register(Box::new(BATCH_REQUESTS.clone())).ok();
    registry.register(Box::new(ANALYSIS_LATENCY.clone())).ok();
    registry.register(Box::new(HEALTH_PROBE_LATENCY.clone())).ok();
    registry.register(Box::new(REMOTE_HEALTHY.clone())).ok();
    registry.register(Box::new(LOCAL_MODEL_READY.clone())).ok();
    registry.register(Box::new(STORED_ANALYSES.clone())).ok();
}

/// Export all metrics in Prometheus text format.
pub fn export_metrics() -> String {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}

/// Simple scope timer that observes a histogram on drop.
pub struct Timer {
    start: Instant,
    histogram: Histogram,
}

impl Timer {
    pub fn new(histogram: Histogram) -> Self {
        Self {
            start: Instant::now(),
            histogram,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_contains_registered_metrics() {
        init_metrics();
        ANALYSES_TOTAL.with_label_values(&["simulated"]).inc();
        let exported = export_metrics();
        assert!(exported.contains("analyses_total"));
    }
}
