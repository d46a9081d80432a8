//! Prometheus Metrics Definitions
//!
//! Every metric lives in a registry owned by [`IngestMetrics`], so tests and
//! embedded uses can build as many independent sets as they like.

use super::TelemetryError;
use crate::consumer::{Outcome, OutcomeObserver};
use crate::poison::ReprocessReport;
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Message processing latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s, 30s
const PROCESSING_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Container for all ingest metrics.
#[derive(Clone)]
pub struct IngestMetrics {
    registry: Registry,

    /// Messages by outcome - labels: result
    pub messages_total: CounterVec,

    /// Fetch-to-commit duration - labels: result
    pub message_processing_duration_seconds: HistogramVec,

    /// 1 while the consumer loop is attached to the bus
    pub consumer_ready: Gauge,

    /// Handler failures whose document could not be written to the poison file
    pub poison_persist_failures_total: Counter,

    /// Reprocessed poison lines - labels: result (recovered/retained)
    pub reprocess_lines_total: CounterVec,
}

fn register<C>(registry: &Registry, name: &'static str, collector: C) -> Result<C, TelemetryError>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|e| TelemetryError::Metrics {
            name,
            reason: e.to_string(),
        })?;
    Ok(collector)
}

fn metric_error(name: &'static str) -> impl Fn(prometheus::Error) -> TelemetryError {
    move |e| TelemetryError::Metrics {
        name,
        reason: e.to_string(),
    }
}

impl IngestMetrics {
    /// Create all metrics in a fresh registry.
    pub fn new() -> Result<Self, TelemetryError> {
        let registry = Registry::new();

        #[cfg(target_os = "linux")]
        {
            let process = prometheus::process_collector::ProcessCollector::for_self();
            registry
                .register(Box::new(process))
                .map_err(metric_error("process"))?;
        }

        let messages_total = CounterVec::new(
            Opts::new("pokesync_messages_total", "Total bus messages by outcome"),
            &["result"],
        )
        .map_err(metric_error("pokesync_messages_total"))?;

        let message_processing_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "pokesync_message_processing_duration_seconds",
                "Time from fetch to commit decision in seconds",
            )
            .buckets(PROCESSING_LATENCY_BUCKETS.to_vec()),
            &["result"],
        )
        .map_err(metric_error("pokesync_message_processing_duration_seconds"))?;

        let consumer_ready = Gauge::new(
            "pokesync_consumer_ready",
            "Whether the consumer loop is attached to the bus",
        )
        .map_err(metric_error("pokesync_consumer_ready"))?;

        let poison_persist_failures_total = Counter::new(
            "pokesync_poison_persist_failures_total",
            "Failed documents that could not be written to the poison file",
        )
        .map_err(metric_error("pokesync_poison_persist_failures_total"))?;

        let reprocess_lines_total = CounterVec::new(
            Opts::new(
                "pokesync_reprocess_lines_total",
                "Poison lines retried by the reprocessor",
            ),
            &["result"],
        )
        .map_err(metric_error("pokesync_reprocess_lines_total"))?;

        Ok(Self {
            messages_total: register(&registry, "pokesync_messages_total", messages_total)?,
            message_processing_duration_seconds: register(
                &registry,
                "pokesync_message_processing_duration_seconds",
                message_processing_duration_seconds,
            )?,
            consumer_ready: register(&registry, "pokesync_consumer_ready", consumer_ready)?,
            poison_persist_failures_total: register(
                &registry,
                "pokesync_poison_persist_failures_total",
                poison_persist_failures_total,
            )?,
            reprocess_lines_total: register(
                &registry,
                "pokesync_reprocess_lines_total",
                reprocess_lines_total,
            )?,
            registry,
        })
    }

    /// Record one processed message.
    pub fn record_message(&self, outcome: Outcome, elapsed: Duration) {
        let label = outcome.as_label();
        self.messages_total.with_label_values(&[label]).inc();
        self.message_processing_duration_seconds
            .with_label_values(&[label])
            .observe(elapsed.as_secs_f64());
    }

    /// Record the result of one reprocessing pass.
    pub fn record_reprocess(&self, report: &ReprocessReport) {
        self.reprocess_lines_total
            .with_label_values(&["recovered"])
            .inc_by(report.succeeded as f64);
        self.reprocess_lines_total
            .with_label_values(&["retained"])
            .inc_by(report.failed as f64);
    }

    /// Encode the registry in the Prometheus text format.
    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

impl OutcomeObserver for IngestMetrics {
    fn observe(&self, outcome: Outcome, elapsed: Duration) {
        self.record_message(outcome, elapsed);
    }

    fn poison_persist_failed(&self) {
        self.poison_persist_failures_total.inc();
    }

    fn consumer_ready(&self, ready: bool) {
        self.consumer_ready.set(if ready { 1.0 } else { 0.0 });
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler(State(metrics): State<IngestMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
