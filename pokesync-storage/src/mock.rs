//! In-memory mock store for testing.

use crate::IngestStore;
use async_trait::async_trait;
use pokesync_core::{
    system_tag_kind, EntityType, Instance, InstanceTag, PipelineResult, Registration,
    StorageError, Tag, Trade, User,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-memory store with the same conditional-write semantics as [`crate::PgStore`].
///
/// Two failure switches exist for tests: `set_unavailable` makes every call
/// fail as if the pool were down, `fail_writes_for` makes writes to one
/// instance id fail with a row-level error.
#[derive(Debug, Default, Clone)]
pub struct MockStore {
    users: Arc<RwLock<HashMap<String, User>>>,
    instances: Arc<RwLock<BTreeMap<String, Instance>>>,
    trades: Arc<RwLock<HashMap<String, Trade>>>,
    registrations: Arc<RwLock<HashSet<Registration>>>,
    tags: Arc<RwLock<HashMap<String, Tag>>>,
    // keyed by (tag_id, instance_id)
    instance_tags: Arc<RwLock<HashMap<(String, String), InstanceTag>>>,
    unavailable: Arc<AtomicBool>,
    failing_instances: Arc<RwLock<HashSet<String>>>,
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StorageError> {
    lock.read().map_err(|_| StorageError::LockPoisoned)
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StorageError> {
    lock.write().map_err(|_| StorageError::LockPoisoned)
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated store outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make every write touching `instance_id` fail.
    pub fn fail_writes_for(&self, instance_id: &str) {
        if let Ok(mut failing) = self.failing_instances.write() {
            failing.insert(instance_id.to_string());
        }
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable {
                reason: "mock store marked unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn check_instance_write(&self, instance_id: &str) -> Result<(), StorageError> {
        self.check_available()?;
        if read(&self.failing_instances)?.contains(instance_id) {
            return Err(StorageError::UpdateFailed {
                entity_type: EntityType::Instance,
                id: instance_id.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    // ========================================================================
    // INSPECTION HELPERS
    // ========================================================================

    pub fn user_count(&self) -> usize {
        self.users.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn trade_count(&self) -> usize {
        self.trades.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn registration_exists(&self, user_id: &str, variant_id: &str) -> bool {
        self.registrations
            .read()
            .map(|set| {
                set.contains(&Registration {
                    user_id: user_id.to_string(),
                    variant_id: variant_id.to_string(),
                })
            })
            .unwrap_or(false)
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Sorted tag ids linked to an instance.
    pub fn linked_tag_ids(&self, instance_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .instance_tags
            .read()
            .map(|links| {
                links
                    .keys()
                    .filter(|(_, inst)| inst == instance_id)
                    .map(|(tag, _)| tag.clone())
                    .collect()
            })
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// All tags (live or deleted) owned by a user.
    pub fn tags_for_user(&self, user_id: &str) -> Vec<Tag> {
        let mut tags: Vec<Tag> = self
            .tags
            .read()
            .map(|m| m.values().filter(|t| t.user_id == user_id).cloned().collect())
            .unwrap_or_default();
        tags.sort_by_key(|t| t.sort);
        tags
    }

    /// Seed a tag row directly.
    pub fn put_tag(&self, tag: Tag) {
        if let Ok(mut tags) = self.tags.write() {
            tags.insert(tag.tag_id.clone(), tag);
        }
    }

    /// Seed an instance row directly, bypassing conditional-write rules.
    pub fn put_instance(&self, instance: Instance) {
        if let Ok(mut instances) = self.instances.write() {
            instances.insert(instance.instance_id.clone(), instance);
        }
    }
}

#[async_trait]
impl IngestStore for MockStore {
    async fn ping(&self) -> PipelineResult<()> {
        self.check_available()?;
        Ok(())
    }

    // === User Operations ===

    async fn user_get(&self, user_id: &str) -> PipelineResult<Option<User>> {
        self.check_available()?;
        Ok(read(&self.users)?.get(user_id).cloned())
    }

    async fn user_insert(&self, user: &User) -> PipelineResult<()> {
        self.check_available()?;
        let mut users = write(&self.users)?;
        let taken = users.contains_key(&user.user_id)
            || users.values().any(|u| u.username == user.username);
        if taken {
            return Err(StorageError::InsertFailed {
                entity_type: EntityType::User,
                reason: "duplicate user_id or username".to_string(),
            }
            .into());
        }
        users.insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    async fn user_update_location(
        &self,
        user_id: &str,
        latitude: f64,
        longitude: f64,
    ) -> PipelineResult<()> {
        self.check_available()?;
        let mut users = write(&self.users)?;
        let user = users.get_mut(user_id).ok_or_else(|| StorageError::NotFound {
            entity_type: EntityType::User,
            id: user_id.to_string(),
        })?;
        user.latitude = Some(latitude);
        user.longitude = Some(longitude);
        Ok(())
    }

    async fn user_id_for_username(&self, username: &str) -> PipelineResult<Option<String>> {
        self.check_available()?;
        Ok(read(&self.users)?
            .values()
            .find(|u| u.username == username)
            .map(|u| u.user_id.clone()))
    }

    // === Instance Operations ===

    async fn instance_get(&self, instance_id: &str) -> PipelineResult<Option<Instance>> {
        self.check_available()?;
        Ok(read(&self.instances)?.get(instance_id).cloned())
    }

    async fn instance_insert_if_absent(&self, instance: &Instance) -> PipelineResult<bool> {
        self.check_instance_write(&instance.instance_id)?;
        let mut instances = write(&self.instances)?;
        if instances.contains_key(&instance.instance_id) {
            return Ok(false);
        }
        instances.insert(instance.instance_id.clone(), instance.clone());
        Ok(true)
    }

    async fn instance_update_if_newer(&self, instance: &Instance) -> PipelineResult<bool> {
        self.check_instance_write(&instance.instance_id)?;
        let mut instances = write(&self.instances)?;
        match instances.get_mut(&instance.instance_id) {
            Some(existing)
                if existing.user_id == instance.user_id
                    && existing.last_update < instance.last_update =>
            {
                let date_added = existing.date_added;
                *existing = instance.clone();
                existing.date_added = date_added;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn instance_replace(&self, instance: &Instance) -> PipelineResult<bool> {
        self.check_instance_write(&instance.instance_id)?;
        let mut instances = write(&self.instances)?;
        match instances.get_mut(&instance.instance_id) {
            Some(existing) => {
                *existing = instance.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn instance_delete(&self, instance_id: &str) -> PipelineResult<bool> {
        self.check_instance_write(instance_id)?;
        Ok(write(&self.instances)?.remove(instance_id).is_some())
    }

    async fn instance_count_registered(
        &self,
        user_id: &str,
        variant_id: &str,
    ) -> PipelineResult<i64> {
        self.check_available()?;
        let count = read(&self.instances)?
            .values()
            .filter(|i| {
                i.user_id == user_id
                    && i.variant_id.as_deref() == Some(variant_id)
                    && i.flags.counts_as_registered()
            })
            .count();
        Ok(count as i64)
    }

    async fn instance_scan(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> PipelineResult<Vec<Instance>> {
        self.check_available()?;
        let instances = read(&self.instances)?;
        let page = match after {
            Some(cursor) => instances
                .range::<str, _>((std::ops::Bound::Excluded(cursor), std::ops::Bound::Unbounded))
                .take(limit)
                .map(|(_, v)| v.clone())
                .collect(),
            None => instances.values().take(limit).cloned().collect(),
        };
        Ok(page)
    }

    // === Registration Operations ===

    async fn registration_insert_if_absent(
        &self,
        registration: &Registration,
    ) -> PipelineResult<bool> {
        self.check_available()?;
        Ok(write(&self.registrations)?.insert(registration.clone()))
    }

    // === Tag Operations ===

    async fn tag_insert_if_absent(&self, tag: &Tag) -> PipelineResult<bool> {
        self.check_available()?;
        let mut tags = write(&self.tags)?;
        let exists = tags.values().any(|t| {
            t.is_live() && t.user_id == tag.user_id && t.parent == tag.parent && t.name == tag.name
        });
        if exists {
            return Ok(false);
        }
        tags.insert(tag.tag_id.clone(), tag.clone());
        Ok(true)
    }

    async fn tag_list_system(&self, user_id: &str) -> PipelineResult<Vec<Tag>> {
        self.check_available()?;
        Ok(read(&self.tags)?
            .values()
            .filter(|t| {
                t.is_live() && t.user_id == user_id && system_tag_kind(t.parent, &t.name).is_some()
            })
            .cloned()
            .collect())
    }

    async fn tag_filter_owned(
        &self,
        user_id: &str,
        tag_ids: &[String],
    ) -> PipelineResult<Vec<String>> {
        self.check_available()?;
        let tags = read(&self.tags)?;
        Ok(tag_ids
            .iter()
            .filter(|id| {
                tags.get(id.as_str())
                    .map(|t| t.is_live() && t.user_id == user_id)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn instance_tag_delete_all(&self, instance_id: &str) -> PipelineResult<u64> {
        self.check_available()?;
        let mut links = write(&self.instance_tags)?;
        let before = links.len();
        links.retain(|(_, inst), _| inst != instance_id);
        Ok((before - links.len()) as u64)
    }

    async fn instance_tag_delete_except(
        &self,
        instance_id: &str,
        keep: &[String],
    ) -> PipelineResult<u64> {
        self.check_available()?;
        let mut links = write(&self.instance_tags)?;
        let before = links.len();
        links.retain(|(tag, inst), _| inst != instance_id || keep.contains(tag));
        Ok((before - links.len()) as u64)
    }

    async fn instance_tag_upsert(&self, link: &InstanceTag) -> PipelineResult<bool> {
        self.check_available()?;
        let mut links = write(&self.instance_tags)?;
        let key = (link.tag_id.clone(), link.instance_id.clone());
        match links.get_mut(&key) {
            Some(existing) => {
                existing.user_id = link.user_id.clone();
                Ok(false)
            }
            None => {
                links.insert(key, link.clone());
                Ok(true)
            }
        }
    }

    // === Trade Operations ===

    async fn trade_get(&self, trade_id: &str) -> PipelineResult<Option<Trade>> {
        self.check_available()?;
        Ok(read(&self.trades)?.get(trade_id).cloned())
    }

    async fn trade_insert_if_absent(&self, trade: &Trade) -> PipelineResult<bool> {
        self.check_available()?;
        let mut trades = write(&self.trades)?;
        if trades.contains_key(&trade.trade_id) {
            return Ok(false);
        }
        trades.insert(trade.trade_id.clone(), trade.clone());
        Ok(true)
    }

    async fn trade_update_if_newer(&self, trade: &Trade) -> PipelineResult<bool> {
        self.check_available()?;
        let mut trades = write(&self.trades)?;
        match trades.get_mut(&trade.trade_id) {
            Some(existing) if existing.last_update < trade.last_update => {
                *existing = trade.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn trade_delete(&self, trade_id: &str) -> PipelineResult<bool> {
        self.check_available()?;
        Ok(write(&self.trades)?.remove(trade_id).is_some())
    }
}
