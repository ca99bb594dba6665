//! # Prometheus Metrics
//!
//! Counters and histograms for the payment flow, registered in a dedicated
//! [`prometheus::Registry`] under the `academy` namespace so that embedding
//! applications can merge or expose them however they like.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Metric handles shared by the session manager, gateway, verifier and
/// orchestrator. Components take an `Option<Arc<PaymentMetrics>>`.
#[derive(Clone)]
pub struct PaymentMetrics {
    registry: Registry,
    /// Refresh round-trips started (waiters that join one are not counted).
    pub refresh_attempts_total: IntCounter,
    /// Refresh round-trips that ended with purged credentials.
    pub refresh_failures_total: IntCounter,
    /// Requests replayed after a 401.
    pub gateway_replays_total: IntCounter,
    /// Finished purchase attempts by final status (`paid`, `failed`).
    pub purchases_total: IntCounterVec,
    /// Wall time of the combined native + token balance read.
    pub balance_query_seconds: Histogram,
}

impl PaymentMetrics {
    /// Creates and registers every metric.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("academy".into()), None)?;

        let refresh_attempts_total = IntCounter::new(
            "refresh_attempts_total",
            "Credential refresh round-trips started",
        )?;
        registry.register(Box::new(refresh_attempts_total.clone()))?;

        let refresh_failures_total = IntCounter::new(
            "refresh_failures_total",
            "Credential refreshes that purged the stored pair",
        )?;
        registry.register(Box::new(refresh_failures_total.clone()))?;

        let gateway_replays_total = IntCounter::new(
            "gateway_replays_total",
            "Requests replayed once after an authorization failure",
        )?;
        registry.register(Box::new(gateway_replays_total.clone()))?;

        let purchases_total = IntCounterVec::new(
            Opts::new("purchases_total", "Finished purchase attempts by status"),
            &["status"],
        )?;
        registry.register(Box::new(purchases_total.clone()))?;

        let balance_query_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "balance_query_seconds",
                "Latency of the native and token balance reads",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;
        registry.register(Box::new(balance_query_seconds.clone()))?;

        Ok(Self {
            registry,
            refresh_attempts_total,
            refresh_failures_total,
            gateway_replays_total,
            purchases_total,
            balance_query_seconds,
        })
    }

    /// Text exposition format of every registered metric.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|err| prometheus::Error::Msg(err.to_string()))
    }
}

impl std::fmt::Debug for PaymentMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposition_contains_namespaced_metrics() {
        let metrics = PaymentMetrics::new().unwrap();
        metrics.refresh_attempts_total.inc();
        metrics.purchases_total.with_label_values(&["paid"]).inc();

        let text = metrics.encode().unwrap();
        assert!(text.contains("academy_refresh_attempts_total 1"));
        assert!(text.contains(r#"academy_purchases_total{status="paid"} 1"#));
    }
}
