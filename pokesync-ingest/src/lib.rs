//! PokeSync Ingest - Event Ingestion and Reconciliation
//!
//! Consumes gzip-compressed user documents from the message bus and applies
//! them to the relational store: users, owned Pokémon instances, the
//! per-user registration ledger, tag links and trades. Documents the handler
//! rejects are parked in a poison file and retried by a background job.

pub mod config;
pub mod constants;
pub mod consumer;
pub mod handler;
pub mod health;
pub mod jobs;
pub mod poison;
pub mod relations;
pub mod telemetry;

// Re-export commonly used types
pub use config::{BusConfig, IngestConfig};
pub use consumer::{
    process_message, run_consumer_loop, BusMessage, Consumer, ConsumerFactory, NoopObserver,
    Outcome, OutcomeObserver,
};
pub use handler::{DocumentHandler, HandleSummary, InstanceOutcome, MessageHandler, TradeOutcome};
pub use health::Readiness;
pub use jobs::{reprocess_task, ReprocessConfig, ReprocessMetrics};
pub use poison::{PoisonStore, ReprocessReport};
pub use relations::{RelationReport, RelationSync, TagSyncReport};
pub use telemetry::{IngestMetrics, TelemetryConfig, TelemetryError};
