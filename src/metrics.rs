//! Metrics collection and export module

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Counters
    pub flows_total: IntCounter,
    pub flows_succeeded: IntCounter,
    pub flows_failed: IntCounter,
    pub cycles_total: IntCounter,
    pub retries_total: IntCounter,
    pub expired_windows: IntCounter,
    pub reconnects: IntCounter,

    // Gauges
    pub active_flows: IntGauge,

    // Histograms
    pub cycle_latency: Histogram,
    pub confirm_latency: Histogram,
    pub compose_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let flows_total = IntCounter::with_opts(Opts::new(
            "flows_total",
            "Total number of flow executions started",
        ))?;

        let flows_succeeded = IntCounter::with_opts(Opts::new(
            "flows_succeeded",
            "Number of flow executions that confirmed",
        ))?;

        let flows_failed = IntCounter::with_opts(Opts::new(
            "flows_failed",
            "Number of flow executions that ended fatally",
        ))?;

        let cycles_total = IntCounter::with_opts(Opts::new(
            "cycles_total",
            "Total probe-compose-assemble-submit cycles run",
        ))?;

        let retries_total = IntCounter::with_opts(Opts::new(
            "retries_total",
            "Number of cycles re-run after a retryable failure",
        ))?;

        let expired_windows = IntCounter::with_opts(Opts::new(
            "expired_windows",
            "Number of recency windows that closed without confirmation",
        ))?;

        let reconnects = IntCounter::with_opts(Opts::new(
            "reconnects",
            "Number of in-place RPC connection replacements",
        ))?;

        let active_flows = IntGauge::with_opts(Opts::new(
            "active_flows",
            "Number of flow executions currently in progress",
        ))?;

        let cycle_latency = Histogram::with_opts(
            HistogramOpts::new("cycle_latency_seconds", "Full cycle latency")
                .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 15.0, 30.0, 60.0]),
        )?;

        let confirm_latency = Histogram::with_opts(
            HistogramOpts::new("confirm_latency_seconds", "Submit-to-confirm latency")
                .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 15.0, 30.0, 60.0]),
        )?;

        let compose_latency = Histogram::with_opts(
            HistogramOpts::new("compose_latency_seconds", "Probe + compose + sign latency")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(flows_total.clone()))?;
        registry.register(Box::new(flows_succeeded.clone()))?;
        registry.register(Box::new(flows_failed.clone()))?;
        registry.register(Box::new(cycles_total.clone()))?;
        registry.register(Box::new(retries_total.clone()))?;
        registry.register(Box::new(expired_windows.clone()))?;
        registry.register(Box::new(reconnects.clone()))?;
        registry.register(Box::new(active_flows.clone()))?;
        registry.register(Box::new(cycle_latency.clone()))?;
        registry.register(Box::new(confirm_latency.clone()))?;
        registry.register(Box::new(compose_latency.clone()))?;

        Ok(Self {
            registry,
            flows_total,
            flows_succeeded,
            flows_failed,
            cycles_total,
            retries_total,
            expired_windows,
            reconnects,
            active_flows,
            cycle_latency,
            confirm_latency,
            compose_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.start.elapsed().as_secs_f64());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_cleanly() {
        let m = Metrics::new().expect("fresh registry");
        m.flows_total.inc();
        m.cycles_total.inc();
        assert_eq!(m.flows_total.get(), 1);
        assert!(!m.registry().gather().is_empty());
    }

    #[test]
    fn timer_observes() {
        let m = Metrics::new().expect("fresh registry");
        let t = Timer::new();
        t.observe_duration(&m.cycle_latency);
        assert!(t.elapsed_secs() >= 0.0);
    }
}
