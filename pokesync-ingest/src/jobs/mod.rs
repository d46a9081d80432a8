//! Background Jobs for PokeSync ingestion
//!
//! - `reprocess`: periodically retries documents held in the poison store
//! - `backfill`: one-shot repair pass over every stored instance
//!
//! # Usage
//!
//! ```ignore
//! use pokesync_ingest::jobs::{reprocess_task, ReprocessConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let handle = tokio::spawn(reprocess_task(
//!     Arc::clone(&poison),
//!     Arc::clone(&handler),
//!     ReprocessConfig::from_env(),
//!     None,
//!     shutdown_rx,
//! ));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! let metrics = handle.await?;
//! ```

pub mod backfill;
pub mod reprocess;

pub use backfill::{run_backfill, BackfillConfig, BackfillReport};
pub use reprocess::{reprocess_task, ReprocessConfig, ReprocessMetrics, ReprocessSnapshot};
