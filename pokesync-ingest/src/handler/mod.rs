//! Message Handler
//!
//! Applies one decoded document to the store: user upsert, then the instance
//! batch, then the trade batch. A document whose username contradicts the
//! stored identity is ignored as a whole. Rows are independent statements; a
//! row that fails is logged and skipped. Only faults that make the rest of the
//! document pointless (invalid user identity, store unreachable) are
//! returned as errors, which sends the document to the poison store.

mod instances;
mod trades;

pub use instances::InstanceOutcome;
pub use trades::TradeOutcome;

use crate::relations::RelationSync;
use async_trait::async_trait;
use pokesync_core::{
    instance_updates, trade_updates, Document, PipelineError, PipelineResult, User, UserRecord,
    DEFAULT_UNOWNED_FIELD,
};
use pokesync_storage::IngestStore;
use std::sync::Arc;

/// Applies decoded documents. Implemented by [`MessageHandler`]; the consumer
/// loop and the reprocessor depend only on this.
#[async_trait]
pub trait DocumentHandler: Send + Sync {
    async fn handle(&self, document: &Document) -> PipelineResult<HandleSummary>;
}

#[async_trait]
impl<T: DocumentHandler + ?Sized> DocumentHandler for Arc<T> {
    async fn handle(&self, document: &Document) -> PipelineResult<HandleSummary> {
        (**self).handle(document).await
    }
}

/// Per-document counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleSummary {
    pub user_created: bool,
    /// Stored username differed; nothing in the document was applied.
    pub user_identity_conflict: bool,
    pub instances_created: u64,
    pub instances_updated: u64,
    pub instances_deleted: u64,
    pub instances_skipped: u64,
    pub trades_created: u64,
    pub trades_updated: u64,
    pub trades_dropped: u64,
    pub trades_skipped: u64,
}

impl HandleSummary {
    fn record_instance(&mut self, outcome: InstanceOutcome) {
        match outcome {
            InstanceOutcome::Created => self.instances_created += 1,
            InstanceOutcome::Updated => self.instances_updated += 1,
            InstanceOutcome::Deleted => self.instances_deleted += 1,
            InstanceOutcome::Absent | InstanceOutcome::Stale | InstanceOutcome::Foreign => {
                self.instances_skipped += 1
            }
        }
    }

    fn record_trade(&mut self, outcome: TradeOutcome) {
        match outcome {
            TradeOutcome::Created => self.trades_created += 1,
            TradeOutcome::Updated => self.trades_updated += 1,
            TradeOutcome::Dropped => self.trades_dropped += 1,
            TradeOutcome::Absent | TradeOutcome::Stale | TradeOutcome::InvalidTransition => {
                self.trades_skipped += 1
            }
        }
    }
}

/// Store-backed [`DocumentHandler`].
pub struct MessageHandler<S> {
    store: Arc<S>,
    relations: RelationSync<S>,
    unowned_field: String,
}

impl<S: IngestStore> MessageHandler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_unowned_field(store, DEFAULT_UNOWNED_FIELD)
    }

    /// `unowned_field` names the payload key that forces an instance unowned.
    pub fn with_unowned_field(store: Arc<S>, unowned_field: impl Into<String>) -> Self {
        Self {
            relations: RelationSync::new(Arc::clone(&store)),
            store,
            unowned_field: unowned_field.into(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Create the user, update its location, or skip on identity conflict.
    async fn upsert_user(
        &self,
        record: &UserRecord,
        summary: &mut HandleSummary,
    ) -> PipelineResult<()> {
        let Some(existing) = self.store.user_get(&record.user_id).await? else {
            let (latitude, longitude) = record.location.unzip();
            self.store
                .user_insert(&User {
                    user_id: record.user_id.clone(),
                    username: record.username.clone(),
                    latitude,
                    longitude,
                })
                .await?;
            summary.user_created = true;
            tracing::info!(user_id = %record.user_id, username = %record.username, "User created");
            return Ok(());
        };

        if existing.username != record.username {
            summary.user_identity_conflict = true;
            tracing::warn!(
                user_id = %record.user_id,
                stored_username = %existing.username,
                incoming_username = %record.username,
                "Username mismatch, skipping document"
            );
            return Ok(());
        }

        if let Some((latitude, longitude)) = record.location {
            self.store
                .user_update_location(&record.user_id, latitude, longitude)
                .await?;
        }
        Ok(())
    }
}

/// A row-level error escalates only when the store itself is gone.
fn escalates(err: &PipelineError) -> bool {
    matches!(err, PipelineError::Storage(e) if e.is_unavailable())
}

#[async_trait]
impl<S: IngestStore + 'static> DocumentHandler for MessageHandler<S> {
    async fn handle(&self, document: &Document) -> PipelineResult<HandleSummary> {
        let user = UserRecord::parse(document)?;
        let mut summary = HandleSummary::default();

        self.upsert_user(&user, &mut summary).await?;
        if summary.user_identity_conflict {
            return Ok(summary);
        }

        for (index, item) in instance_updates(document).iter().enumerate() {
            match self.apply_instance(&user.user_id, item).await {
                Ok(outcome) => summary.record_instance(outcome),
                Err(e) if escalates(&e) => return Err(e),
                Err(e) => {
                    summary.instances_skipped += 1;
                    tracing::warn!(user_id = %user.user_id, index, error = %e, "Instance update skipped");
                }
            }
        }

        for (index, item) in trade_updates(document).iter().enumerate() {
            match self.apply_trade(user.trace_id.as_deref(), item).await {
                Ok(outcome) => summary.record_trade(outcome),
                Err(e) if escalates(&e) => return Err(e),
                Err(e) => {
                    summary.trades_skipped += 1;
                    tracing::warn!(user_id = %user.user_id, index, error = %e, "Trade update skipped");
                }
            }
        }

        tracing::info!(
            user_id = %user.user_id,
            trace_id = user.trace_id.as_deref().unwrap_or(""),
            instances_created = summary.instances_created,
            instances_updated = summary.instances_updated,
            instances_deleted = summary.instances_deleted,
            instances_skipped = summary.instances_skipped,
            trades_created = summary.trades_created,
            trades_updated = summary.trades_updated,
            trades_dropped = summary.trades_dropped,
            trades_skipped = summary.trades_skipped,
            "Document applied"
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pokesync_core::{StorageError, ValidationError};
    use pokesync_storage::MockStore;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[tokio::test]
    async fn test_missing_user_id_is_handler_error() {
        let handler = MessageHandler::new(Arc::new(MockStore::new()));
        let err = handler
            .handle(&doc(json!({"username": "ash"})))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Validation(ValidationError::RequiredFieldMissing { .. })
        ));
    }

    #[tokio::test]
    async fn test_user_created_then_location_updated() {
        let store = Arc::new(MockStore::new());
        let handler = MessageHandler::new(Arc::clone(&store));

        let summary = handler
            .handle(&doc(json!({"user_id": "u1", "username": "ash"})))
            .await
            .unwrap();
        assert!(summary.user_created);
        let user = store.user_get("u1").await.unwrap().unwrap();
        assert_eq!(user.latitude, None);

        handler
            .handle(&doc(json!({
                "user_id": "u1", "username": "ash",
                "location": {"latitude": 35.6, "longitude": 139.7}
            })))
            .await
            .unwrap();
        let user = store.user_get("u1").await.unwrap().unwrap();
        assert_eq!(user.latitude, Some(35.6));
        assert_eq!(user.longitude, Some(139.7));
    }

    #[tokio::test]
    async fn test_username_conflict_skips_whole_document() {
        let store = Arc::new(MockStore::new());
        let handler = MessageHandler::new(Arc::clone(&store));
        handler
            .handle(&doc(json!({"user_id": "u1", "username": "ash"})))
            .await
            .unwrap();

        let summary = handler
            .handle(&doc(json!({
                "user_id": "u1", "username": "impostor",
                "location": {"latitude": 1.0, "longitude": 2.0},
                "pokemonUpdates": [{
                    "key": "i9", "pokemon_id": 25, "is_caught": true, "last_update": 10
                }],
                "tradeUpdates": [{
                    "key": "t9",
                    "tradeData": {"trade_status": "proposed", "username_proposed": "ash", "last_update": 10}
                }]
            })))
            .await
            .unwrap();

        assert!(summary.user_identity_conflict);
        assert_eq!(summary.instances_created, 0);
        assert_eq!(summary.trades_created, 0);
        assert!(store.instance_get("i9").await.unwrap().is_none());
        assert!(store.trade_get("t9").await.unwrap().is_none());
        let user = store.user_get("u1").await.unwrap().unwrap();
        assert_eq!(user.username, "ash");
        assert_eq!(user.latitude, None);
    }

    #[tokio::test]
    async fn test_store_unavailable_is_handler_error() {
        let store = Arc::new(MockStore::new());
        store.set_unavailable(true);
        let handler = MessageHandler::new(Arc::clone(&store));
        let err = handler
            .handle(&doc(json!({"user_id": "u1", "username": "ash"})))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Storage(StorageError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_row_failure_does_not_abort_batch() {
        let store = Arc::new(MockStore::new());
        store.fail_writes_for("bad");
        let handler = MessageHandler::new(Arc::clone(&store));

        let summary = handler
            .handle(&doc(json!({
                "user_id": "u1", "username": "ash",
                "pokemonUpdates": [
                    {"key": "bad", "pokemon_id": 1, "is_caught": true, "last_update": 5},
                    {"key": "no-species", "is_caught": true, "last_update": 5},
                    {"key": "good", "pokemon_id": 4, "is_caught": true, "last_update": 5}
                ]
            })))
            .await
            .unwrap();

        assert_eq!(summary.instances_created, 1);
        assert_eq!(summary.instances_skipped, 2);
        assert!(store.instance_get("good").await.unwrap().is_some());
        assert!(store.instance_get("no-species").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_arc_handler_delegates() {
        let handler: Arc<dyn DocumentHandler> =
            Arc::new(MessageHandler::new(Arc::new(MockStore::new())));
        let summary = handler
            .handle(&doc(json!({"user_id": "u1", "username": "ash"})))
            .await
            .unwrap();
        assert!(summary.user_created);
    }
}
