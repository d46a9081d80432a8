//! Consumer Loop
//!
//! Drives one fetch → decode → handle → commit cycle at a time against a
//! [`Consumer`]. Handler failures are written to the [`PoisonStore`] and
//! committed anyway so one bad document never blocks its partition. Decode
//! failures are not committed; they come back after a consumer restart.
//!
//! ```text
//! connecting → consuming → (fetch error) → backoff → consuming
//!                                              └─ (max_retries reached) → reconnecting
//! ```

#[cfg(feature = "kafka")]
pub mod kafka;

#[cfg(feature = "kafka")]
pub use kafka::{KafkaConsumer, KafkaConsumerFactory};

use crate::config::BusConfig;
use crate::handler::DocumentHandler;
use crate::health::Readiness;
use crate::poison::PoisonStore;
use async_trait::async_trait;
use pokesync_core::{decode, BusError, DecodeStage};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

// ============================================================================
// CAPABILITY
// ============================================================================

/// One message fetched from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    /// Gzip-compressed JSON document
    pub payload: Vec<u8>,
}

/// A connected bus reader with explicit commits.
#[async_trait]
pub trait Consumer: Send {
    /// Wait for the next message.
    async fn fetch(&mut self) -> Result<BusMessage, BusError>;

    /// Commit the position just past `message`.
    async fn commit(&mut self, message: &BusMessage) -> Result<(), BusError>;

    async fn close(&mut self);
}

/// Creates [`Consumer`]s; used for the first connection and for every
/// recreation after repeated fetch failures.
#[async_trait]
pub trait ConsumerFactory: Send + Sync {
    type Consumer: Consumer;

    async fn connect(&self) -> Result<Self::Consumer, BusError>;
}

// ============================================================================
// OUTCOMES
// ============================================================================

/// Terminal result of processing one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Processed,
    DecompressFailed,
    UnmarshalFailed,
    /// Handler failed; document written to the poison store (or the write
    /// was attempted and counted) and the offset committed.
    HandleFailedPersisted,
    HandleFailedCommitFailed,
    CommitFailed,
}

impl Outcome {
    pub fn as_label(&self) -> &'static str {
        match self {
            Outcome::Processed => "processed",
            Outcome::DecompressFailed => "decompress_failed",
            Outcome::UnmarshalFailed => "unmarshal_failed",
            Outcome::HandleFailedPersisted => "handle_failed_persisted",
            Outcome::HandleFailedCommitFailed => "handle_failed_commit_failed",
            Outcome::CommitFailed => "commit_failed",
        }
    }

    /// Whether the offset was committed.
    pub fn committed(&self) -> bool {
        matches!(self, Outcome::Processed | Outcome::HandleFailedPersisted)
    }
}

/// Per-outcome hook consumed by a metrics exporter.
pub trait OutcomeObserver: Send + Sync {
    fn observe(&self, outcome: Outcome, elapsed: Duration);

    fn poison_persist_failed(&self) {}

    fn consumer_ready(&self, _ready: bool) {}
}

/// Observer that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl OutcomeObserver for NoopObserver {
    fn observe(&self, _outcome: Outcome, _elapsed: Duration) {}
}

// ============================================================================
// PROCESSING
// ============================================================================

/// Decode, handle and commit one message.
pub async fn process_message<C, H>(
    message: &BusMessage,
    consumer: &mut C,
    handler: &H,
    poison: &PoisonStore,
    observer: &dyn OutcomeObserver,
) -> Outcome
where
    C: Consumer + ?Sized,
    H: DocumentHandler + ?Sized,
{
    let start = Instant::now();
    let outcome = decode_and_handle(message, consumer, handler, poison, observer).await;
    observer.observe(outcome, start.elapsed());
    outcome
}

async fn decode_and_handle<C, H>(
    message: &BusMessage,
    consumer: &mut C,
    handler: &H,
    poison: &PoisonStore,
    observer: &dyn OutcomeObserver,
) -> Outcome
where
    C: Consumer + ?Sized,
    H: DocumentHandler + ?Sized,
{
    let document = match decode(&message.payload) {
        Ok(document) => document,
        Err(e) => {
            tracing::error!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                error = %e,
                "Failed to decode message, leaving offset uncommitted"
            );
            return match e.stage() {
                DecodeStage::Decompress => Outcome::DecompressFailed,
                DecodeStage::Unmarshal => Outcome::UnmarshalFailed,
            };
        }
    };

    let handle_error = match handler.handle(&document).await {
        Ok(_) => None,
        Err(e) => Some(e),
    };

    if let Some(e) = &handle_error {
        tracing::error!(
            partition = message.partition,
            offset = message.offset,
            error = %e,
            "Handler failed, persisting document for reprocessing"
        );
        match poison.append(&document).await {
            Ok(()) => tracing::info!(path = %poison.path().display(), "Document saved for reprocessing"),
            Err(pe) => {
                observer.poison_persist_failed();
                tracing::error!(error = %pe, "Failed to persist poisoned document");
            }
        }
    }

    match (consumer.commit(message).await, handle_error) {
        (Ok(()), None) => Outcome::Processed,
        (Ok(()), Some(_)) => Outcome::HandleFailedPersisted,
        (Err(e), None) => {
            tracing::error!(partition = message.partition, offset = message.offset, error = %e, "Commit failed");
            Outcome::CommitFailed
        }
        (Err(e), Some(_)) => {
            tracing::error!(
                partition = message.partition,
                offset = message.offset,
                error = %e,
                "Commit after handler failure failed"
            );
            Outcome::HandleFailedCommitFailed
        }
    }
}

// ============================================================================
// LOOP
// ============================================================================

/// Sleep for `duration` unless cancelled first. Returns false on cancel.
async fn backoff(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

fn set_attached(readiness: &Readiness, observer: &dyn OutcomeObserver, attached: bool) {
    readiness.set_consumer_attached(attached);
    observer.consumer_ready(attached);
}

/// Run the consumer loop until `cancel` fires.
///
/// Cancellation is the only way out: connect failures and fetch failures are
/// retried every `config.retry_interval`, and after `config.max_retries`
/// consecutive fetch failures the consumer is closed and recreated.
pub async fn run_consumer_loop<F, H>(
    factory: &F,
    config: &BusConfig,
    handler: &H,
    poison: &PoisonStore,
    observer: &dyn OutcomeObserver,
    readiness: &Readiness,
    cancel: CancellationToken,
) where
    F: ConsumerFactory + ?Sized,
    H: DocumentHandler + ?Sized,
{
    tracing::info!(
        topic = %config.topic,
        group_id = %config.group_id,
        retry_interval_secs = config.retry_interval.as_secs(),
        max_retries = config.max_retries,
        "Consumer loop starting"
    );

    'connect: loop {
        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => break 'connect,
            connected = factory.connect() => connected,
        };

        let mut consumer = match connected {
            Ok(consumer) => consumer,
            Err(e) => {
                tracing::error!(error = %e, "Failed to connect consumer");
                if !backoff(config.retry_interval, &cancel).await {
                    break 'connect;
                }
                continue 'connect;
            }
        };

        set_attached(readiness, observer, true);
        tracing::info!(topic = %config.topic, "Consumer subscribed");

        let mut consecutive_errors: u32 = 0;
        loop {
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                fetched = consumer.fetch() => Some(fetched),
            };
            let Some(fetched) = fetched else {
                consumer.close().await;
                break 'connect;
            };

            match fetched {
                Ok(message) => {
                    consecutive_errors = 0;
                    let outcome =
                        process_message(&message, &mut consumer, handler, poison, observer).await;
                    tracing::debug!(
                        partition = message.partition,
                        offset = message.offset,
                        result = outcome.as_label(),
                        "Message processed"
                    );
                }
                Err(e) => {
                    consecutive_errors += 1;
                    tracing::error!(
                        error = %e,
                        retry = consecutive_errors,
                        max_retries = config.max_retries,
                        "Failed to fetch message"
                    );

                    if consecutive_errors >= config.max_retries {
                        tracing::warn!("Fetch retries exhausted, recreating consumer");
                        consumer.close().await;
                        set_attached(readiness, observer, false);
                        if !backoff(config.retry_interval, &cancel).await {
                            break 'connect;
                        }
                        continue 'connect;
                    }

                    if !backoff(config.retry_interval, &cancel).await {
                        consumer.close().await;
                        break 'connect;
                    }
                }
            }
        }
    }

    set_attached(readiness, observer, false);
    tracing::info!("Consumer loop shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandleSummary;
    use pokesync_core::{Document, PipelineResult, ValidationError};
    use pokesync_test_utils::gzip_bytes as gzip;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingConsumer {
        commits: Vec<i64>,
        fail_commit: bool,
    }

    #[async_trait]
    impl Consumer for RecordingConsumer {
        async fn fetch(&mut self) -> Result<BusMessage, BusError> {
            Err(BusError::Closed)
        }

        async fn commit(&mut self, message: &BusMessage) -> Result<(), BusError> {
            if self.fail_commit {
                return Err(BusError::Commit {
                    topic: message.topic.clone(),
                    partition: message.partition,
                    offset: message.offset,
                    reason: "broker gone".to_string(),
                });
            }
            self.commits.push(message.offset);
            Ok(())
        }

        async fn close(&mut self) {}
    }

    struct FixedHandler {
        fail: bool,
    }

    #[async_trait]
    impl DocumentHandler for FixedHandler {
        async fn handle(&self, _document: &Document) -> PipelineResult<HandleSummary> {
            if self.fail {
                return Err(ValidationError::RequiredFieldMissing {
                    field: "user_id".to_string(),
                }
                .into());
            }
            Ok(HandleSummary::default())
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Outcome>>);

    impl OutcomeObserver for Recorder {
        fn observe(&self, outcome: Outcome, _elapsed: Duration) {
            if let Ok(mut seen) = self.0.lock() {
                seen.push(outcome);
            }
        }
    }

    fn message(offset: i64, payload: Vec<u8>) -> BusMessage {
        BusMessage {
            topic: "events".to_string(),
            partition: 0,
            offset,
            key: None,
            payload,
        }
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(Outcome::Processed.as_label(), "processed");
        assert_eq!(Outcome::UnmarshalFailed.as_label(), "unmarshal_failed");
        assert_eq!(
            Outcome::HandleFailedCommitFailed.as_label(),
            "handle_failed_commit_failed"
        );
        assert!(Outcome::HandleFailedPersisted.committed());
        assert!(!Outcome::DecompressFailed.committed());
    }

    #[tokio::test]
    async fn test_decode_failures_are_not_committed() {
        let dir = tempfile::tempdir().unwrap();
        let poison = PoisonStore::new(dir.path().join("failed.jsonl"));
        let mut consumer = RecordingConsumer::default();
        let handler = FixedHandler { fail: false };
        let recorder = Recorder::default();

        let bad_gzip = message(1, b"plain text".to_vec());
        let bad_json = message(2, gzip(b"[1, 2]"));
        assert_eq!(
            process_message(&bad_gzip, &mut consumer, &handler, &poison, &recorder).await,
            Outcome::DecompressFailed
        );
        assert_eq!(
            process_message(&bad_json, &mut consumer, &handler, &poison, &recorder).await,
            Outcome::UnmarshalFailed
        );
        assert!(consumer.commits.is_empty());
        assert_eq!(recorder.0.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_handler_failure_persists_and_commits() {
        let dir = tempfile::tempdir().unwrap();
        let poison = PoisonStore::new(dir.path().join("failed.jsonl"));
        let mut consumer = RecordingConsumer::default();
        let handler = FixedHandler { fail: true };

        let outcome = process_message(
            &message(7, gzip(br#"{"username":"ash"}"#)),
            &mut consumer,
            &handler,
            &poison,
            &NoopObserver,
        )
        .await;

        assert_eq!(outcome, Outcome::HandleFailedPersisted);
        assert_eq!(consumer.commits, vec![7]);
        assert_eq!(poison.lines().await.unwrap(), vec![r#"{"username":"ash"}"#]);
    }

    #[tokio::test]
    async fn test_commit_failures_are_labelled() {
        let dir = tempfile::tempdir().unwrap();
        let poison = PoisonStore::new(dir.path().join("failed.jsonl"));
        let mut consumer = RecordingConsumer {
            fail_commit: true,
            ..Default::default()
        };
        let payload = gzip(br#"{"user_id":"u1","username":"ash"}"#);

        let ok = FixedHandler { fail: false };
        let outcome =
            process_message(&message(1, payload.clone()), &mut consumer, &ok, &poison, &NoopObserver)
                .await;
        assert_eq!(outcome, Outcome::CommitFailed);

        let failing = FixedHandler { fail: true };
        let outcome =
            process_message(&message(2, payload), &mut consumer, &failing, &poison, &NoopObserver)
                .await;
        assert_eq!(outcome, Outcome::HandleFailedCommitFailed);
    }
}
