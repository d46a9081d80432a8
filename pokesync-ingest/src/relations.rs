//! Relation Synchronizer
//!
//! Reconciles the two structures derived from an instance:
//!
//! - the registration ledger, which only ever grows
//! - tag links, which converge to explicit tag ids plus the system tags
//!   selected by the instance's flags, filtered to tags the owner has

use chrono::Utc;
use pokesync_core::{
    merge_unique, system_tag_kind, Instance, InstanceTag, PipelineResult, Registration, Tag,
    SYSTEM_TAGS,
};
use pokesync_storage::IngestStore;
use std::collections::HashSet;
use std::sync::Arc;

/// Tag link changes made by one synchronization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagSyncReport {
    pub links_removed: u64,
    pub links_upserted: u64,
}

/// Result of synchronizing both relations for one instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelationReport {
    pub registration_added: bool,
    pub tags: TagSyncReport,
}

/// Registration and tag linkage synchronizer.
pub struct RelationSync<S> {
    store: Arc<S>,
}

impl<S> Clone for RelationSync<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: IngestStore> RelationSync<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Run registration and tag synchronization for an instance's final state.
    pub async fn sync_instance(&self, instance: &Instance) -> PipelineResult<RelationReport> {
        let registration_added = self
            .sync_registration(&instance.user_id, instance.variant())
            .await?;
        let tags = self.sync_tags(instance).await?;
        Ok(RelationReport {
            registration_added,
            tags,
        })
    }

    /// Add `(user_id, variant_id)` to the ledger when the user holds at least
    /// one caught or registered instance of the variant. Never removes rows.
    ///
    /// Returns whether a ledger row was added.
    pub async fn sync_registration(
        &self,
        user_id: &str,
        variant_id: Option<&str>,
    ) -> PipelineResult<bool> {
        let Some(variant_id) = variant_id.map(str::trim).filter(|v| !v.is_empty()) else {
            return Ok(false);
        };

        let count = self
            .store
            .instance_count_registered(user_id, variant_id)
            .await?;
        if count == 0 {
            return Ok(false);
        }

        let added = self
            .store
            .registration_insert_if_absent(&Registration {
                user_id: user_id.to_string(),
                variant_id: variant_id.to_string(),
            })
            .await?;
        if added {
            tracing::debug!(user_id, variant_id, "Registration recorded");
        }
        Ok(added)
    }

    /// Converge the instance's tag links to the valid tag set.
    pub async fn sync_tags(&self, instance: &Instance) -> PipelineResult<TagSyncReport> {
        let flags = instance.tag_flags();

        let system_ids = if flags.any() {
            let system_tags = self.ensure_system_tags(&instance.user_id).await?;
            system_tags
                .iter()
                .filter(|tag| {
                    system_tag_kind(tag.parent, &tag.name).is_some_and(|kind| flags.selects(kind))
                })
                .map(|tag| tag.tag_id.clone())
                .collect()
        } else {
            Vec::new()
        };

        let requested = merge_unique([instance.explicit_tag_ids(), system_ids]);
        let owned: HashSet<String> = self
            .store
            .tag_filter_owned(&instance.user_id, &requested)
            .await?
            .into_iter()
            .collect();
        let valid: Vec<String> = requested
            .into_iter()
            .filter(|id| owned.contains(id))
            .collect();

        if valid.is_empty() {
            let links_removed = self.clear_tags(&instance.instance_id).await?;
            return Ok(TagSyncReport {
                links_removed,
                links_upserted: 0,
            });
        }

        let links_removed = self
            .store
            .instance_tag_delete_except(&instance.instance_id, &valid)
            .await?;

        let mut links_upserted = 0;
        for tag_id in &valid {
            let link = InstanceTag {
                tag_id: tag_id.clone(),
                instance_id: instance.instance_id.clone(),
                user_id: instance.user_id.clone(),
                created_at: Utc::now(),
            };
            if self.store.instance_tag_upsert(&link).await? {
                links_upserted += 1;
            }
        }

        Ok(TagSyncReport {
            links_removed,
            links_upserted,
        })
    }

    /// Remove every tag link of an instance.
    pub async fn clear_tags(&self, instance_id: &str) -> PipelineResult<u64> {
        self.store.instance_tag_delete_all(instance_id).await
    }

    /// Create any system tag the user is missing and return the live set.
    pub async fn ensure_system_tags(&self, user_id: &str) -> PipelineResult<Vec<Tag>> {
        let existing = self.store.tag_list_system(user_id).await?;
        let present: HashSet<_> = existing
            .iter()
            .filter_map(|tag| system_tag_kind(tag.parent, &tag.name))
            .collect();

        let mut created = 0usize;
        for (kind, def) in SYSTEM_TAGS.iter() {
            if present.contains(kind) {
                continue;
            }
            if self
                .store
                .tag_insert_if_absent(&Tag::system(user_id, def))
                .await?
            {
                created += 1;
            }
        }

        if created == 0 && present.len() == SYSTEM_TAGS.len() {
            return Ok(existing);
        }

        tracing::debug!(user_id, created, "System tags ensured");
        self.store.tag_list_system(user_id).await
    }
}
