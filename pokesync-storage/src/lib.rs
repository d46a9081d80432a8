//! PokeSync Storage - Repository Trait and Implementations
//!
//! The ingestion pipeline reaches the relational store only through
//! [`IngestStore`], a narrow repository over find-by-key, conditional update,
//! delete-by-predicate, raw counts and insert-ignore. Every method is one
//! independent statement; there is no transaction spanning a document.

pub mod mock;
pub mod postgres;

pub use mock::MockStore;
pub use postgres::{DbConfig, PgStore};

use async_trait::async_trait;
use pokesync_core::{Instance, InstanceTag, PipelineResult, Registration, Tag, Trade, User};

/// Repository consumed by the message handler and the repair tooling.
#[async_trait]
pub trait IngestStore: Send + Sync {
    /// Succeeds when the store is reachable.
    async fn ping(&self) -> PipelineResult<()>;

    // ========================================================================
    // USER OPERATIONS
    // ========================================================================

    async fn user_get(&self, user_id: &str) -> PipelineResult<Option<User>>;

    async fn user_insert(&self, user: &User) -> PipelineResult<()>;

    async fn user_update_location(
        &self,
        user_id: &str,
        latitude: f64,
        longitude: f64,
    ) -> PipelineResult<()>;

    /// Resolve a username to its user id.
    async fn user_id_for_username(&self, username: &str) -> PipelineResult<Option<String>>;

    // ========================================================================
    // INSTANCE OPERATIONS
    // ========================================================================

    async fn instance_get(&self, instance_id: &str) -> PipelineResult<Option<Instance>>;

    /// Insert unless a row with the same id exists. Returns whether a row was written.
    async fn instance_insert_if_absent(&self, instance: &Instance) -> PipelineResult<bool>;

    /// Overwrite the stored row only if it belongs to `instance.user_id` and
    /// its `last_update` is strictly older. Returns whether a row was written.
    /// `date_added` is never overwritten.
    async fn instance_update_if_newer(&self, instance: &Instance) -> PipelineResult<bool>;

    /// Unconditionally overwrite the stored row, owner included.
    async fn instance_replace(&self, instance: &Instance) -> PipelineResult<bool>;

    async fn instance_delete(&self, instance_id: &str) -> PipelineResult<bool>;

    /// Count a user's instances of a variant that are caught or registered.
    async fn instance_count_registered(&self, user_id: &str, variant_id: &str)
        -> PipelineResult<i64>;

    /// Page through instances ordered by id, starting after `after`.
    async fn instance_scan(&self, after: Option<&str>, limit: usize)
        -> PipelineResult<Vec<Instance>>;

    // ========================================================================
    // REGISTRATION OPERATIONS
    // ========================================================================

    /// Insert-ignore into the ledger. Returns whether a row was added.
    async fn registration_insert_if_absent(&self, registration: &Registration)
        -> PipelineResult<bool>;

    // ========================================================================
    // TAG OPERATIONS
    // ========================================================================

    /// Insert unless the user already has a live tag with the same parent and name.
    async fn tag_insert_if_absent(&self, tag: &Tag) -> PipelineResult<bool>;

    /// Live system tags (per `SYSTEM_TAGS`) owned by the user.
    async fn tag_list_system(&self, user_id: &str) -> PipelineResult<Vec<Tag>>;

    /// The subset of `tag_ids` that are live tags owned by the user.
    async fn tag_filter_owned(&self, user_id: &str, tag_ids: &[String])
        -> PipelineResult<Vec<String>>;

    async fn instance_tag_delete_all(&self, instance_id: &str) -> PipelineResult<u64>;

    /// Delete links of the instance whose tag id is not in `keep`.
    async fn instance_tag_delete_except(&self, instance_id: &str, keep: &[String])
        -> PipelineResult<u64>;

    /// Insert the link or, if present, touch its owner. Returns true on insert.
    async fn instance_tag_upsert(&self, link: &InstanceTag) -> PipelineResult<bool>;

    // ========================================================================
    // TRADE OPERATIONS
    // ========================================================================

    async fn trade_get(&self, trade_id: &str) -> PipelineResult<Option<Trade>>;

    async fn trade_insert_if_absent(&self, trade: &Trade) -> PipelineResult<bool>;

    /// Overwrite the stored trade only if its `last_update` is strictly older.
    async fn trade_update_if_newer(&self, trade: &Trade) -> PipelineResult<bool>;

    async fn trade_delete(&self, trade_id: &str) -> PipelineResult<bool>;
}
