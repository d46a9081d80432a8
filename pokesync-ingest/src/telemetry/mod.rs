//! PokeSync Telemetry - Observability Infrastructure
//!
//! Tracing subscriber setup, Prometheus metrics for the consumer loop and
//! the reprocessor, and the small HTTP surface (`/healthz`, `/readyz`,
//! `/metrics`) that operators scrape.

pub mod metrics;
pub mod server;
pub mod tracer;

pub use metrics::{metrics_handler, IngestMetrics};
pub use server::{router, serve, ServerState};
pub use tracer::{init_tracer, LogFormat, TelemetryConfig};

use thiserror::Error;

/// Failures while setting up or running the observability layer.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to register metric {name}: {reason}")]
    Metrics { name: &'static str, reason: String },

    #[error("Failed to init subscriber: {0}")]
    Subscriber(String),

    #[error("HTTP server error: {0}")]
    Server(String),
}
