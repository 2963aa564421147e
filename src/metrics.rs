//! Prometheus metrics for the engine and the HTTP surface.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    pub http_requests_total: IntCounter,
    pub http_requests_in_flight: IntGauge,
    pub http_request_duration_seconds: Histogram,
    pub signals_generated_total: IntCounter,
    pub poll_errors_total: IntCounter,
    pub notifications_sent_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = IntCounter::new(
            "pipsentry_http_requests_total",
            "Total HTTP requests served",
        )?;
        let http_requests_in_flight = IntGauge::new(
            "pipsentry_http_requests_in_flight",
            "HTTP requests currently being processed",
        )?;
        let http_request_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "pipsentry_http_request_duration_seconds",
            "HTTP request latency",
        ))?;
        let signals_generated_total = IntCounter::new(
            "pipsentry_signals_generated_total",
            "Trade signals stored by symbol workers",
        )?;
        let poll_errors_total = IntCounter::new(
            "pipsentry_poll_errors_total",
            "Transient market data fetch failures in worker loops",
        )?;
        let notifications_sent_total = IntCounter::new(
            "pipsentry_notifications_sent_total",
            "Batch notifications dispatched",
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_requests_in_flight.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(signals_generated_total.clone()))?;
        registry.register(Box::new(poll_errors_total.clone()))?;
        registry.register(Box::new(notifications_sent_total.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_requests_in_flight,
            http_request_duration_seconds,
            signals_generated_total,
            poll_errors_total,
            notifications_sent_total,
        })
    }

    /// Render the registry in the Prometheus text format
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
