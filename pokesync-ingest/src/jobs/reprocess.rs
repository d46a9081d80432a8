//! Poison Reprocessing Background Task
//!
//! Periodically hands every document held by the [`PoisonStore`] back to the
//! handler. Documents that now apply are removed from the file; the rest stay
//! verbatim for the next pass. The consumer loop keeps appending meanwhile;
//! the store serializes the two.
//!
//! # Configuration
//!
//! ```rust
//! use pokesync_ingest::jobs::ReprocessConfig;
//! use std::time::Duration;
//!
//! let config = ReprocessConfig {
//!     interval: Duration::from_secs(300), // Retry every 5 minutes
//!     log_passes: true,                   // Log every non-empty pass
//! };
//! ```

use crate::constants::DEFAULT_REPROCESS_INTERVAL_SECS;
use crate::handler::DocumentHandler;
use crate::poison::{PoisonStore, ReprocessReport};
use crate::telemetry::IngestMetrics;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the reprocessing background task.
#[derive(Debug, Clone, PartialEq)]
pub struct ReprocessConfig {
    /// Time between passes (default: 300 seconds)
    pub interval: Duration,

    /// Whether to log each pass that found lines (default: true)
    pub log_passes: bool,
}

impl Default for ReprocessConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_REPROCESS_INTERVAL_SECS),
            log_passes: true,
        }
    }
}

impl ReprocessConfig {
    /// Create ReprocessConfig from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// # Environment Variables
    /// - `POKESYNC_REPROCESS_INTERVAL_SECS`: Time between passes (default: 300, 0 means default)
    /// - `POKESYNC_REPROCESS_LOG_PASSES`: Whether to log passes (default: true)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let interval = Duration::from_secs(
            lookup("POKESYNC_REPROCESS_INTERVAL_SECS")
                .and_then(|s| s.trim().parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .unwrap_or(DEFAULT_REPROCESS_INTERVAL_SECS),
        );

        let log_passes = lookup("POKESYNC_REPROCESS_LOG_PASSES")
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);

        Self {
            interval,
            log_passes,
        }
    }

    /// Short interval for local development.
    pub fn development() -> Self {
        Self {
            interval: Duration::from_secs(15),
            log_passes: true,
        }
    }

    pub fn production() -> Self {
        Self::default()
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for reprocessing activity since startup.
#[derive(Debug, Default)]
pub struct ReprocessMetrics {
    /// Passes completed
    pub passes: AtomicU64,

    /// Lines that applied and were removed
    pub lines_recovered: AtomicU64,

    /// Lines that failed again and were kept
    pub lines_retained: AtomicU64,

    /// Passes that could not read or rewrite the file
    pub pass_errors: AtomicU64,
}

impl ReprocessMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> ReprocessSnapshot {
        ReprocessSnapshot {
            passes: self.passes.load(Ordering::Relaxed),
            lines_recovered: self.lines_recovered.load(Ordering::Relaxed),
            lines_retained: self.lines_retained.load(Ordering::Relaxed),
            pass_errors: self.pass_errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of reprocessing metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReprocessSnapshot {
    pub passes: u64,
    pub lines_recovered: u64,
    pub lines_retained: u64,
    pub pass_errors: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Background task that retries poisoned documents every `config.interval`.
///
/// The first pass runs one full interval after start. Runs until the
/// shutdown signal is received and returns the metrics it collected.
pub async fn reprocess_task<H>(
    poison: Arc<PoisonStore>,
    handler: Arc<H>,
    config: ReprocessConfig,
    prometheus: Option<IngestMetrics>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<ReprocessMetrics>
where
    H: DocumentHandler + ?Sized + 'static,
{
    let metrics = Arc::new(ReprocessMetrics::new());

    let mut pass_interval = interval(config.interval);
    pass_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // Consume the immediate first tick.
    pass_interval.tick().await;

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        path = %poison.path().display(),
        "Reprocess task started"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Reprocess task shutting down");
                    break;
                }
            }

            _ = pass_interval.tick() => {
                run_pass(&poison, handler.as_ref(), &config, &metrics, prometheus.as_ref()).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        passes = snapshot.passes,
        lines_recovered = snapshot.lines_recovered,
        lines_retained = snapshot.lines_retained,
        pass_errors = snapshot.pass_errors,
        "Reprocess task completed"
    );

    metrics
}

/// Perform one reprocessing pass.
pub async fn run_pass<H>(
    poison: &PoisonStore,
    handler: &H,
    config: &ReprocessConfig,
    metrics: &ReprocessMetrics,
    prometheus: Option<&IngestMetrics>,
) -> Option<ReprocessReport>
where
    H: DocumentHandler + ?Sized,
{
    metrics.passes.fetch_add(1, Ordering::Relaxed);

    let report = match poison.reprocess(handler).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "Reprocess pass failed");
            metrics.pass_errors.fetch_add(1, Ordering::Relaxed);
            return None;
        }
    };

    metrics
        .lines_recovered
        .fetch_add(report.succeeded as u64, Ordering::Relaxed);
    metrics
        .lines_retained
        .fetch_add(report.failed as u64, Ordering::Relaxed);
    if let Some(prometheus) = prometheus {
        prometheus.record_reprocess(&report);
    }

    if report.attempted > 0 && config.log_passes {
        tracing::info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            appended = report.appended,
            remaining = report.remaining,
            "Reprocess pass completed"
        );
    } else {
        tracing::trace!("Reprocess pass found nothing to retry");
    }

    Some(report)
}
