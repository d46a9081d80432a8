//! Instance upsert/delete.

use super::MessageHandler;
use chrono::Utc;
use pokesync_core::{InstanceRecord, PipelineResult};
use pokesync_storage::IngestStore;
use serde_json::Value;

/// What happened to one instance update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceOutcome {
    Created,
    Updated,
    Deleted,
    /// Delete for an instance that does not exist.
    Absent,
    /// Stored `last_update` is not older than the incoming one.
    Stale,
    /// Stored row belongs to another user.
    Foreign,
}

impl<S: IngestStore> MessageHandler<S> {
    pub(super) async fn apply_instance(
        &self,
        user_id: &str,
        item: &Value,
    ) -> PipelineResult<InstanceOutcome> {
        let record = InstanceRecord::parse(item, &self.unowned_field)?;
        let flags = record.flags.normalized();

        if flags.is_unowned() {
            return self.delete_instance(user_id, &record).await;
        }

        let existing = self.store.instance_get(&record.instance_id).await?;

        let instance = match existing {
            None => {
                let instance = record.to_instance(user_id, flags, Utc::now())?;
                if !self.store.instance_insert_if_absent(&instance).await? {
                    tracing::debug!(instance_id = %record.instance_id, "Instance inserted concurrently, skipping");
                    return Ok(InstanceOutcome::Stale);
                }
                self.relations.sync_instance(&instance).await?;
                return Ok(InstanceOutcome::Created);
            }
            Some(stored) if stored.user_id != user_id => {
                tracing::warn!(
                    instance_id = %record.instance_id,
                    owner = %stored.user_id,
                    user_id,
                    "Instance owned by another user, skipping"
                );
                return Ok(InstanceOutcome::Foreign);
            }
            Some(stored) if stored.last_update >= record.last_update => {
                return Ok(InstanceOutcome::Stale);
            }
            Some(stored) => {
                let mut instance = record.to_instance(user_id, flags, stored.date_added)?;
                if instance.variant_id.is_none() {
                    instance.variant_id = stored.variant_id;
                }
                instance
            }
        };

        if !self.store.instance_update_if_newer(&instance).await? {
            return Ok(InstanceOutcome::Stale);
        }
        self.relations.sync_instance(&instance).await?;
        Ok(InstanceOutcome::Updated)
    }

    /// Remove an instance whose flags resolved to nothing owned.
    ///
    /// A delete older than the stored row loses, like any other update.
    /// The registration ledger is left as it is; the variant is resolved
    /// first so the ledger check still runs against the right key.
    async fn delete_instance(
        &self,
        user_id: &str,
        record: &InstanceRecord<'_>,
    ) -> PipelineResult<InstanceOutcome> {
        let Some(stored) = self.store.instance_get(&record.instance_id).await? else {
            tracing::debug!(instance_id = %record.instance_id, "Delete for unknown instance");
            return Ok(InstanceOutcome::Absent);
        };

        if stored.user_id != user_id {
            tracing::warn!(
                instance_id = %record.instance_id,
                owner = %stored.user_id,
                user_id,
                "Delete for instance owned by another user, skipping"
            );
            return Ok(InstanceOutcome::Foreign);
        }

        if stored.last_update >= record.last_update {
            tracing::debug!(
                instance_id = %record.instance_id,
                stored = stored.last_update,
                incoming = record.last_update,
                "Stale delete, keeping instance"
            );
            return Ok(InstanceOutcome::Stale);
        }

        let variant_id = record
            .variant_id
            .clone()
            .or_else(|| stored.variant().map(str::to_string));

        self.store.instance_delete(&record.instance_id).await?;
        let links_removed = self.relations.clear_tags(&record.instance_id).await?;
        self.relations
            .sync_registration(user_id, variant_id.as_deref())
            .await?;

        tracing::debug!(
            instance_id = %record.instance_id,
            variant_id = variant_id.as_deref().unwrap_or(""),
            links_removed,
            "Instance deleted"
        );
        Ok(InstanceOutcome::Deleted)
    }
}
