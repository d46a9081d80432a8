//! Kafka-backed [`Consumer`] over an `rdkafka` `StreamConsumer`.
//!
//! Auto-commit is off; offsets are committed one message at a time,
//! synchronously, as `offset + 1` on the message's partition. The blocking
//! commit runs on the blocking pool. A fresh group starts from the earliest
//! offset.

use super::{BusMessage, Consumer, ConsumerFactory};
use crate::config::BusConfig;
use async_trait::async_trait;
use pokesync_core::BusError;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer as _, StreamConsumer};
use rdkafka::{Message, Offset, TopicPartitionList};
use std::sync::Arc;

/// Session timeout handed to the broker.
const SESSION_TIMEOUT_MS: &str = "10000";

/// Builds subscribed [`KafkaConsumer`]s from a [`BusConfig`].
#[derive(Debug, Clone)]
pub struct KafkaConsumerFactory {
    config: BusConfig,
}

impl KafkaConsumerFactory {
    pub fn new(config: BusConfig) -> Self {
        Self { config }
    }

    fn client_config(&self) -> ClientConfig {
        let mut client = ClientConfig::new();
        client
            .set("bootstrap.servers", &self.config.brokers)
            .set("group.id", &self.config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", SESSION_TIMEOUT_MS);
        client
    }
}

#[async_trait]
impl ConsumerFactory for KafkaConsumerFactory {
    type Consumer = KafkaConsumer;

    async fn connect(&self) -> Result<KafkaConsumer, BusError> {
        let inner: StreamConsumer =
            self.client_config()
                .create()
                .map_err(|e| BusError::Connect {
                    reason: e.to_string(),
                })?;
        inner
            .subscribe(&[self.config.topic.as_str()])
            .map_err(|e| BusError::Connect {
                reason: e.to_string(),
            })?;

        tracing::debug!(
            brokers = %self.config.brokers,
            topic = %self.config.topic,
            group_id = %self.config.group_id,
            "Kafka consumer created"
        );
        Ok(KafkaConsumer {
            inner: Arc::new(inner),
        })
    }
}

fn commit_error(message: &BusMessage, reason: String) -> BusError {
    BusError::Commit {
        topic: message.topic.clone(),
        partition: message.partition,
        offset: message.offset,
        reason,
    }
}

/// Offset to commit after `message`: the next one on its partition.
fn commit_list(message: &BusMessage) -> Result<TopicPartitionList, BusError> {
    let mut tpl = TopicPartitionList::new();
    tpl.add_partition_offset(
        &message.topic,
        message.partition,
        Offset::Offset(message.offset + 1),
    )
    .map_err(|e| commit_error(message, e.to_string()))?;
    Ok(tpl)
}

pub struct KafkaConsumer {
    inner: Arc<StreamConsumer>,
}

#[async_trait]
impl Consumer for KafkaConsumer {
    async fn fetch(&mut self) -> Result<BusMessage, BusError> {
        let message = self.inner.recv().await.map_err(|e| BusError::Fetch {
            reason: e.to_string(),
        })?;
        Ok(BusMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        })
    }

    async fn commit(&mut self, message: &BusMessage) -> Result<(), BusError> {
        let tpl = commit_list(message)?;
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.commit(&tpl, CommitMode::Sync))
            .await
            .map_err(|e| commit_error(message, format!("commit task failed: {}", e)))?
            .map_err(|e| commit_error(message, e.to_string()))
    }

    async fn close(&mut self) {
        self.inner.unsubscribe();
        tracing::debug!("Kafka consumer unsubscribed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_disables_auto_commit() {
        let factory = KafkaConsumerFactory::new(BusConfig::new("localhost:9092", "events"));
        let client = factory.client_config();
        assert_eq!(client.get("enable.auto.commit"), Some("false"));
        assert_eq!(client.get("auto.offset.reset"), Some("earliest"));
        assert_eq!(client.get("group.id"), Some("event_group"));
        assert_eq!(client.get("bootstrap.servers"), Some("localhost:9092"));
    }

    #[test]
    fn test_commit_list_targets_next_offset() {
        let message = BusMessage {
            topic: "events".to_string(),
            partition: 3,
            offset: 41,
            key: None,
            payload: Vec::new(),
        };
        let tpl = commit_list(&message).unwrap();
        let entry = tpl.find_partition("events", 3).unwrap();
        assert_eq!(entry.offset(), Offset::Offset(42));
        assert_eq!(tpl.count(), 1);
    }
}
