//! Constants for PokeSync ingestion
//!
//! Defaults for every setting resolved at startup.

// ============================================================================
// MESSAGE BUS
// ============================================================================

/// Default consumer group
pub const DEFAULT_BUS_GROUP_ID: &str = "event_group";

/// Default backoff after a failed fetch, in seconds
pub const DEFAULT_BUS_RETRY_INTERVAL_SECS: u64 = 3;

/// Default number of consecutive fetch errors before the reader is recreated
pub const DEFAULT_BUS_MAX_RETRIES: u32 = 5;

// ============================================================================
// POISON STORE / REPROCESSOR
// ============================================================================

/// Default poison file path
pub const DEFAULT_POISON_FILE: &str = "failed_messages.jsonl";

/// Default period between reprocessing passes (5 minutes)
pub const DEFAULT_REPROCESS_INTERVAL_SECS: u64 = 300;

// ============================================================================
// HTTP
// ============================================================================

/// Default bind address for the health/metrics listener
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:3004";

// ============================================================================
// BACKFILL
// ============================================================================

/// Default number of instances fetched per backfill page
pub const DEFAULT_BACKFILL_BATCH_SIZE: usize = 500;
