//! Prometheus metrics for wagering operations
//!
//! Amount counters are f64 and exist for dashboards only; no money logic
//! ever reads them back.

use crate::errors::WageringError;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, CounterVec, Opts, Registry, TextEncoder,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::time::Duration;

#[derive(Clone)]
pub struct WageringMetrics {
    registry: Registry,
    operations: IntCounterVec,
    security_events: IntCounterVec,
    commit_seconds: Histogram,
    amounts: CounterVec,
}

impl WageringMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let operations = IntCounterVec::new(
            Opts::new("wagering_operations_total", "Wagering operations by outcome"),
            &["operation", "outcome"],
        )?;
        let security_events = IntCounterVec::new(
            Opts::new("wagering_security_events_total", "Security events raised"),
            &["kind"],
        )?;
        let commit_seconds = Histogram::with_opts(
            HistogramOpts::new("wagering_commit_seconds", "Unit of work commit latency")
                .buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25]),
        )?;
        let amounts = CounterVec::new(
            Opts::new("wagering_amount_total", "Money staked and paid out"),
            &["direction"],
        )?;

        registry.register(Box::new(operations.clone()))?;
        registry.register(Box::new(security_events.clone()))?;
        registry.register(Box::new(commit_seconds.clone()))?;
        registry.register(Box::new(amounts.clone()))?;

        Ok(Self {
            registry,
            operations,
            security_events,
            commit_seconds,
            amounts,
        })
    }

    pub fn record_success(&self, operation: &str) {
        self.operations.with_label_values(&[operation, "ok"]).inc();
    }

    pub fn record_failure(&self, operation: &str, error: &WageringError) {
        self.operations
            .with_label_values(&[operation, error.code()])
            .inc();
    }

    pub fn record_security_event(&self, kind: &str) {
        self.security_events.with_label_values(&[kind]).inc();
    }

    pub fn observe_commit(&self, elapsed: Duration) {
        self.commit_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn add_staked(&self, amount: Decimal) {
        self.add_amount("staked", amount);
    }

    pub fn add_paid_out(&self, amount: Decimal) {
        self.add_amount("paid_out", amount);
    }

    pub fn add_refunded(&self, amount: Decimal) {
        self.add_amount("refunded", amount);
    }

    fn add_amount(&self, direction: &str, amount: Decimal) {
        if let Some(v) = amount.to_f64() {
            if v > 0.0 {
                self.amounts.with_label_values(&[direction]).inc_by(v);
            }
        }
    }

    pub fn operation_count(&self, operation: &str, outcome: &str) -> u64 {
        self.operations
            .with_label_values(&[operation, outcome])
            .get()
    }

    /// Text exposition format for `/metrics`
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_counters_render() {
        let metrics = WageringMetrics::new().unwrap();
        metrics.record_success("bet");
        metrics.record_failure("bet", &WageringError::SessionNotFound);
        metrics.record_security_event("FRAUD_ATTEMPT");
        metrics.add_staked(dec!(10.00));
        metrics.observe_commit(Duration::from_micros(300));

        assert_eq!(metrics.operation_count("bet", "ok"), 1);
        assert_eq!(metrics.operation_count("bet", "SESSION_NOT_FOUND"), 1);

        let text = metrics.render();
        assert!(text.contains("wagering_operations_total"));
        assert!(text.contains("wagering_security_events_total{kind=\"FRAUD_ATTEMPT\"} 1"));
        assert!(text.contains("wagering_amount_total{direction=\"staked\"} 10"));
        assert!(text.contains("wagering_commit_seconds_bucket"));
    }
}
