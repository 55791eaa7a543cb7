//! Prometheus metrics for the refresh endpoint.
//!
//! Metrics live in a per-instance [`Registry`] rather than the process-global
//! default so several routers can coexist in one process.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

/// Outcome label recorded for successful refreshes
pub const OUTCOME_INVALIDATED: &str = "invalidated";

/// Refresh endpoint metrics
#[derive(Debug, Clone)]
pub struct RefreshMetrics {
    registry: Registry,
    requests_total: IntCounterVec,
    duration_seconds: Histogram,
    keys_removed_total: IntCounter,
}

impl RefreshMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new(
                "config_refresh_requests_total",
                "Refresh webhook requests by outcome",
            ),
            &["outcome"],
        )?;
        let duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "config_refresh_duration_seconds",
                "Refresh pipeline processing time",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        let keys_removed_total = IntCounter::new(
            "config_refresh_keys_removed_total",
            "Cache entries removal was issued for",
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(duration_seconds.clone()))?;
        registry.register(Box::new(keys_removed_total.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            duration_seconds,
            keys_removed_total,
        })
    }

    /// Count one request with the given outcome label
    pub fn record_outcome(&self, outcome: &str) {
        self.requests_total.with_label_values(&[outcome]).inc();
    }

    /// Observe the time one pipeline run took
    pub fn observe_duration(&self, seconds: f64) {
        self.duration_seconds.observe(seconds);
    }

    /// Count removed cache entries
    pub fn record_keys_removed(&self, count: u64) {
        self.keys_removed_total.inc_by(count);
    }

    /// Requests recorded so far for `outcome`
    pub fn outcome_count(&self, outcome: &str) -> u64 {
        self.requests_total.with_label_values(&[outcome]).get()
    }

    /// Prometheus text exposition of every metric
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
