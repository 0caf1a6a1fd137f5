use std::time::Duration;

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters for the authorization guard and its key-set source.
///
/// Guard decisions and key-set fetches are separate families so an upstream
/// JWKS outage never reads as a spike in rejected credentials.
#[derive(Clone)]
pub struct AuthMetrics {
    registry: Registry,
    decisions: IntCounterVec,
    key_set_fetches: IntCounterVec,
    key_set_fetch_seconds: Histogram,
}

impl AuthMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let decisions = IntCounterVec::new(
            Opts::new(
                "auth_guard_decisions_total",
                "Authorization guard outcomes grouped by failure kind",
            ),
            &["outcome", "kind"],
        )?;
        registry.register(Box::new(decisions.clone()))?;

        let key_set_fetches = IntCounterVec::new(
            Opts::new(
                "auth_key_set_fetch_total",
                "Signing key set fetch attempts grouped by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(key_set_fetches.clone()))?;

        let key_set_fetch_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "auth_key_set_fetch_duration_seconds",
                "Latency of signing key set fetches",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;
        registry.register(Box::new(key_set_fetch_seconds.clone()))?;

        Ok(Self {
            registry,
            decisions,
            key_set_fetches,
            key_set_fetch_seconds,
        })
    }

    pub fn record_decision(&self, outcome: &str, kind: &str) {
        self.decisions.with_label_values(&[outcome, kind]).inc();
    }

    pub fn decision_count(&self, outcome: &str, kind: &str) -> u64 {
        self.decisions.with_label_values(&[outcome, kind]).get()
    }

    pub fn record_key_set_fetch(&self, outcome: &str, elapsed: Duration) {
        self.key_set_fetches.with_label_values(&[outcome]).inc();
        self.key_set_fetch_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn key_set_fetch_count(&self, outcome: &str) -> u64 {
        self.key_set_fetches.with_label_values(&[outcome]).get()
    }

    /// Text exposition format for a `/metrics` endpoint.
    pub fn render(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|err| prometheus::Error::Msg(err.to_string()))
    }
}
