//! PostgreSQL store
//!
//! Connection pooling via deadpool-postgres. Every repository call checks
//! out one connection and runs one statement. Expected tables:
//!
//! - `users(user_id PK, username UNIQUE, latitude, longitude)`
//! - `instances(instance_id PK, user_id, variant_id, pokemon_id, is_caught,
//!   is_wanted, is_for_trade, registered, most_wanted, favorite, caught_tags,
//!   trade_tags, wanted_tags, attributes JSONB, last_update BIGINT, date_added)`
//! - `trades(trade_id PK, ...)`
//! - `registrations(user_id, variant_id, PK(user_id, variant_id))`
//! - `tags(tag_id PK, user_id, parent, name, color, sort, created_at, deleted_at)`
//! - `instance_tags(tag_id, instance_id, user_id, created_at, PK(tag_id, instance_id))`

use crate::IngestStore;
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use pokesync_core::{
    EntityType, FriendshipLevel, Instance, InstanceAttributes, InstanceTag, OwnershipFlags,
    PipelineResult, Registration, StorageError, Tag, TagParent, Trade, TradeStatus, User,
    SYSTEM_TAGS,
};
use std::time::Duration;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait/create timeout for pool checkouts
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "pokesync".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a database configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create a database configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("POKESYNC_DB_HOST").unwrap_or(defaults.host),
            port: lookup("POKESYNC_DB_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: lookup("POKESYNC_DB_NAME").unwrap_or(defaults.dbname),
            user: lookup("POKESYNC_DB_USER").unwrap_or(defaults.user),
            password: lookup("POKESYNC_DB_PASSWORD").unwrap_or_default(),
            max_size: lookup("POKESYNC_DB_POOL_SIZE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: lookup("POKESYNC_DB_TIMEOUT")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> PipelineResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        pool_cfg.timeouts.create = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StorageError::Unavailable {
                reason: format!("Failed to create pool: {}", e),
            })?;

        Ok(pool)
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

/// Only a lost connection means the store is unreachable. Server-side
/// statement errors and client-side conversion errors are row-level.
fn pg_error(e: tokio_postgres::Error) -> StorageError {
    let io_fault =
        std::error::Error::source(&e).is_some_and(|source| source.is::<std::io::Error>());
    statement_fault(e.is_closed() || io_fault, e.to_string())
}

fn statement_fault(connection_lost: bool, reason: String) -> StorageError {
    if connection_lost {
        StorageError::Unavailable { reason }
    } else {
        StorageError::Query { reason }
    }
}

fn column<'a, T>(row: &'a Row, name: &str) -> Result<T, StorageError>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get(name).map_err(|e| StorageError::Query {
        reason: format!("column {}: {}", name, e),
    })
}

// ============================================================================
// ROW MAPPING
// ============================================================================

const INSTANCE_COLUMNS: &str = "instance_id, user_id, variant_id, pokemon_id, is_caught, \
     is_wanted, is_for_trade, registered, most_wanted, favorite, caught_tags, trade_tags, \
     wanted_tags, attributes, last_update, date_added";

const TRADE_COLUMNS: &str = "trade_id, user_id_proposed, user_id_accepting, username_proposed, \
     username_accepting, pokemon_instance_id_user_proposed, pokemon_instance_id_user_accepting, \
     trade_status, trace_id, user_proposed_completion_confirmed, \
     user_accepting_completion_confirmed, trade_proposal_date, trade_accepted_date, \
     trade_completed_date, trade_cancelled_date, trade_cancelled_by, is_special_trade, \
     is_registered_trade, is_lucky_trade, trade_dust_cost, trade_friendship_level, \
     user_1_trade_satisfaction, user_2_trade_satisfaction, last_update";

const TAG_COLUMNS: &str = "tag_id, user_id, parent, name, color, sort, created_at, deleted_at";

fn instance_from_row(row: &Row) -> Result<Instance, StorageError> {
    let attributes: serde_json::Value = column(row, "attributes")?;
    let attributes: InstanceAttributes =
        serde_json::from_value(attributes).map_err(|e| StorageError::Query {
            reason: format!("attributes: {}", e),
        })?;
    Ok(Instance {
        instance_id: column(row, "instance_id")?,
        user_id: column(row, "user_id")?,
        variant_id: column(row, "variant_id")?,
        pokemon_id: column(row, "pokemon_id")?,
        flags: OwnershipFlags {
            is_caught: column(row, "is_caught")?,
            is_wanted: column(row, "is_wanted")?,
            is_for_trade: column(row, "is_for_trade")?,
            registered: column(row, "registered")?,
            most_wanted: column(row, "most_wanted")?,
        },
        favorite: column(row, "favorite")?,
        caught_tags: column(row, "caught_tags")?,
        trade_tags: column(row, "trade_tags")?,
        wanted_tags: column(row, "wanted_tags")?,
        attributes,
        last_update: column(row, "last_update")?,
        date_added: column(row, "date_added")?,
    })
}

fn trade_from_row(row: &Row) -> Result<Trade, StorageError> {
    let status: String = column(row, "trade_status")?;
    let level: String = column(row, "trade_friendship_level")?;
    Ok(Trade {
        trade_id: column(row, "trade_id")?,
        user_id_proposed: column(row, "user_id_proposed")?,
        user_id_accepting: column(row, "user_id_accepting")?,
        username_proposed: column(row, "username_proposed")?,
        username_accepting: column(row, "username_accepting")?,
        pokemon_instance_id_user_proposed: column(row, "pokemon_instance_id_user_proposed")?,
        pokemon_instance_id_user_accepting: column(row, "pokemon_instance_id_user_accepting")?,
        trade_status: TradeStatus::from_db_str(&status).map_err(|e| StorageError::Query {
            reason: e.to_string(),
        })?,
        trace_id: column(row, "trace_id")?,
        user_proposed_completion_confirmed: column(row, "user_proposed_completion_confirmed")?,
        user_accepting_completion_confirmed: column(row, "user_accepting_completion_confirmed")?,
        trade_proposal_date: column(row, "trade_proposal_date")?,
        trade_accepted_date: column(row, "trade_accepted_date")?,
        trade_completed_date: column(row, "trade_completed_date")?,
        trade_cancelled_date: column(row, "trade_cancelled_date")?,
        trade_cancelled_by: column(row, "trade_cancelled_by")?,
        is_special_trade: column(row, "is_special_trade")?,
        is_registered_trade: column(row, "is_registered_trade")?,
        is_lucky_trade: column(row, "is_lucky_trade")?,
        trade_dust_cost: column(row, "trade_dust_cost")?,
        trade_friendship_level: FriendshipLevel::from_db_str(&level).unwrap_or_default(),
        user_1_trade_satisfaction: column(row, "user_1_trade_satisfaction")?,
        user_2_trade_satisfaction: column(row, "user_2_trade_satisfaction")?,
        last_update: column(row, "last_update")?,
    })
}

fn tag_from_row(row: &Row) -> Result<Tag, StorageError> {
    let parent: String = column(row, "parent")?;
    Ok(Tag {
        tag_id: column(row, "tag_id")?,
        user_id: column(row, "user_id")?,
        parent: TagParent::from_db_str(&parent).map_err(|e| StorageError::Query {
            reason: e.to_string(),
        })?,
        name: column(row, "name")?,
        color: column(row, "color")?,
        sort: column(row, "sort")?,
        created_at: column(row, "created_at")?,
        deleted_at: column(row, "deleted_at")?,
    })
}

fn attributes_json(instance: &Instance) -> Result<serde_json::Value, StorageError> {
    serde_json::to_value(&instance.attributes).map_err(|e| StorageError::UpdateFailed {
        entity_type: EntityType::Instance,
        id: instance.instance_id.clone(),
        reason: e.to_string(),
    })
}

// ============================================================================
// STORE
// ============================================================================

/// [`IngestStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    /// Create a new store with the given pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new store from configuration.
    pub fn from_config(config: &DbConfig) -> PipelineResult<Self> {
        let pool = config.create_pool()?;
        tracing::debug!(
            host = %config.host,
            dbname = %config.dbname,
            max_size = config.max_size,
            "PostgreSQL pool created"
        );
        Ok(Self::new(pool))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> Result<deadpool_postgres::Object, StorageError> {
        self.pool.get().await.map_err(|e| StorageError::Unavailable {
            reason: e.to_string(),
        })
    }

    /// Bind the instance columns in `INSTANCE_COLUMNS` order. Statements that
    /// never touch `date_added` bind only the first `bound` parameters.
    async fn write_instance(
        &self,
        sql: &str,
        instance: &Instance,
        bound: usize,
    ) -> Result<u64, StorageError> {
        let conn = self.get_conn().await?;
        let attributes = attributes_json(instance)?;
        let f = &instance.flags;
        let params: [&(dyn ToSql + Sync); 16] = [
            &instance.instance_id,
            &instance.user_id,
            &instance.variant_id,
            &instance.pokemon_id,
            &f.is_caught,
            &f.is_wanted,
            &f.is_for_trade,
            &f.registered,
            &f.most_wanted,
            &instance.favorite,
            &instance.caught_tags,
            &instance.trade_tags,
            &instance.wanted_tags,
            &attributes,
            &instance.last_update,
            &instance.date_added,
        ];
        conn.execute(sql, &params[..bound])
            .await
            .map_err(pg_error)
    }

    async fn write_trade(&self, sql: &str, t: &Trade) -> Result<u64, StorageError> {
        let conn = self.get_conn().await?;
        conn.execute(
            sql,
            &[
                &t.trade_id,
                &t.user_id_proposed,
                &t.user_id_accepting,
                &t.username_proposed,
                &t.username_accepting,
                &t.pokemon_instance_id_user_proposed,
                &t.pokemon_instance_id_user_accepting,
                &t.trade_status.as_db_str(),
                &t.trace_id,
                &t.user_proposed_completion_confirmed,
                &t.user_accepting_completion_confirmed,
                &t.trade_proposal_date,
                &t.trade_accepted_date,
                &t.trade_completed_date,
                &t.trade_cancelled_date,
                &t.trade_cancelled_by,
                &t.is_special_trade,
                &t.is_registered_trade,
                &t.is_lucky_trade,
                &t.trade_dust_cost,
                &t.trade_friendship_level.as_db_str(),
                &t.user_1_trade_satisfaction,
                &t.user_2_trade_satisfaction,
                &t.last_update,
            ],
        )
        .await
        .map_err(pg_error)
    }
}

#[async_trait]
impl IngestStore for PgStore {
    async fn ping(&self) -> PipelineResult<()> {
        let conn = self.get_conn().await?;
        conn.simple_query("SELECT 1").await.map_err(pg_error)?;
        Ok(())
    }

    // ========================================================================
    // USER OPERATIONS
    // ========================================================================

    async fn user_get(&self, user_id: &str) -> PipelineResult<Option<User>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "SELECT user_id, username, latitude, longitude FROM users WHERE user_id = $1",
                &[&user_id],
            )
            .await
            .map_err(pg_error)?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(User {
            user_id: column(&row, "user_id")?,
            username: column(&row, "username")?,
            latitude: column(&row, "latitude")?,
            longitude: column(&row, "longitude")?,
        }))
    }

    async fn user_insert(&self, user: &User) -> PipelineResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO users (user_id, username, latitude, longitude) VALUES ($1, $2, $3, $4)",
            &[&user.user_id, &user.username, &user.latitude, &user.longitude],
        )
        .await
        .map_err(|e| match pg_error(e) {
            StorageError::Query { reason } => StorageError::InsertFailed {
                entity_type: EntityType::User,
                reason,
            },
            other => other,
        })?;
        Ok(())
    }

    async fn user_update_location(
        &self,
        user_id: &str,
        latitude: f64,
        longitude: f64,
    ) -> PipelineResult<()> {
        let conn = self.get_conn().await?;
        let updated = conn
            .execute(
                "UPDATE users SET latitude = $2, longitude = $3 WHERE user_id = $1",
                &[&user_id, &latitude, &longitude],
            )
            .await
            .map_err(pg_error)?;
        if updated == 0 {
            return Err(StorageError::NotFound {
                entity_type: EntityType::User,
                id: user_id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn user_id_for_username(&self, username: &str) -> PipelineResult<Option<String>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "SELECT user_id FROM users WHERE username = $1",
                &[&username],
            )
            .await
            .map_err(pg_error)?;
        match row {
            Some(row) => Ok(Some(column(&row, "user_id")?)),
            None => Ok(None),
        }
    }

    // ========================================================================
    // INSTANCE OPERATIONS
    // ========================================================================

    async fn instance_get(&self, instance_id: &str) -> PipelineResult<Option<Instance>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {} FROM instances WHERE instance_id = $1",
            INSTANCE_COLUMNS
        );
        let row = conn
            .query_opt(sql.as_str(), &[&instance_id])
            .await
            .map_err(pg_error)?;
        match row {
            Some(row) => Ok(Some(instance_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn instance_insert_if_absent(&self, instance: &Instance) -> PipelineResult<bool> {
        let sql = format!(
            "INSERT INTO instances ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             ON CONFLICT (instance_id) DO NOTHING",
            INSTANCE_COLUMNS
        );
        Ok(self.write_instance(&sql, instance, 16).await? > 0)
    }

    async fn instance_update_if_newer(&self, instance: &Instance) -> PipelineResult<bool> {
        let sql = "UPDATE instances SET variant_id = $3, pokemon_id = $4, is_caught = $5, \
             is_wanted = $6, is_for_trade = $7, registered = $8, most_wanted = $9, \
             favorite = $10, caught_tags = $11, trade_tags = $12, wanted_tags = $13, \
             attributes = $14, last_update = $15 \
             WHERE instance_id = $1 AND user_id = $2 AND last_update < $15";
        Ok(self.write_instance(sql, instance, 15).await? > 0)
    }

    async fn instance_replace(&self, instance: &Instance) -> PipelineResult<bool> {
        let sql = "UPDATE instances SET user_id = $2, variant_id = $3, pokemon_id = $4, \
             is_caught = $5, is_wanted = $6, is_for_trade = $7, registered = $8, \
             most_wanted = $9, favorite = $10, caught_tags = $11, trade_tags = $12, \
             wanted_tags = $13, attributes = $14, last_update = $15, date_added = $16 \
             WHERE instance_id = $1";
        Ok(self.write_instance(sql, instance, 16).await? > 0)
    }

    async fn instance_delete(&self, instance_id: &str) -> PipelineResult<bool> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute("DELETE FROM instances WHERE instance_id = $1", &[&instance_id])
            .await
            .map_err(|e| match pg_error(e) {
                StorageError::Query { reason } => StorageError::DeleteFailed {
                    entity_type: EntityType::Instance,
                    id: instance_id.to_string(),
                    reason,
                },
                other => other,
            })?;
        Ok(deleted > 0)
    }

    async fn instance_count_registered(
        &self,
        user_id: &str,
        variant_id: &str,
    ) -> PipelineResult<i64> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_one(
                "SELECT COUNT(*) FROM instances \
                 WHERE user_id = $1 AND variant_id = $2 AND (is_caught OR registered)",
                &[&user_id, &variant_id],
            )
            .await
            .map_err(pg_error)?;
        let count: i64 = row.try_get(0).map_err(|e| StorageError::Query {
            reason: e.to_string(),
        })?;
        Ok(count)
    }

    async fn instance_scan(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> PipelineResult<Vec<Instance>> {
        let conn = self.get_conn().await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let sql = format!(
            "SELECT {} FROM instances \
             WHERE ($1::text IS NULL OR instance_id > $1) \
             ORDER BY instance_id LIMIT $2",
            INSTANCE_COLUMNS
        );
        let rows = conn
            .query(sql.as_str(), &[&after, &limit])
            .await
            .map_err(pg_error)?;
        let instances = rows
            .iter()
            .map(instance_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(instances)
    }

    // ========================================================================
    // REGISTRATION OPERATIONS
    // ========================================================================

    async fn registration_insert_if_absent(
        &self,
        registration: &Registration,
    ) -> PipelineResult<bool> {
        let conn = self.get_conn().await?;
        let inserted = conn
            .execute(
                "INSERT INTO registrations (user_id, variant_id) VALUES ($1, $2) \
                 ON CONFLICT (user_id, variant_id) DO NOTHING",
                &[&registration.user_id, &registration.variant_id],
            )
            .await
            .map_err(pg_error)?;
        Ok(inserted > 0)
    }

    // ========================================================================
    // TAG OPERATIONS
    // ========================================================================

    async fn tag_insert_if_absent(&self, tag: &Tag) -> PipelineResult<bool> {
        let conn = self.get_conn().await?;
        let inserted = conn
            .execute(
                "INSERT INTO tags (tag_id, user_id, parent, name, color, sort, created_at) \
                 SELECT $1, $2, $3, $4, $5, $6, $7 \
                 WHERE NOT EXISTS ( \
                   SELECT 1 FROM tags \
                   WHERE user_id = $2 AND parent = $3 AND name = $4 AND deleted_at IS NULL)",
                &[
                    &tag.tag_id,
                    &tag.user_id,
                    &tag.parent.as_db_str(),
                    &tag.name,
                    &tag.color,
                    &tag.sort,
                    &tag.created_at,
                ],
            )
            .await
            .map_err(pg_error)?;
        Ok(inserted > 0)
    }

    async fn tag_list_system(&self, user_id: &str) -> PipelineResult<Vec<Tag>> {
        let conn = self.get_conn().await?;
        let parents: Vec<&str> = SYSTEM_TAGS.iter().map(|(_, d)| d.parent.as_db_str()).collect();
        let names: Vec<&str> = SYSTEM_TAGS.iter().map(|(_, d)| d.name).collect();
        let sql = format!(
            "SELECT {} FROM tags \
             WHERE user_id = $1 AND deleted_at IS NULL \
             AND (parent, name) IN (SELECT * FROM UNNEST($2::text[], $3::text[]))",
            TAG_COLUMNS
        );
        let rows = conn
            .query(sql.as_str(), &[&user_id, &parents, &names])
            .await
            .map_err(pg_error)?;
        let tags = rows.iter().map(tag_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    async fn tag_filter_owned(
        &self,
        user_id: &str,
        tag_ids: &[String],
    ) -> PipelineResult<Vec<String>> {
        if tag_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT tag_id FROM tags \
                 WHERE user_id = $1 AND tag_id = ANY($2) AND deleted_at IS NULL",
                &[&user_id, &tag_ids],
            )
            .await
            .map_err(pg_error)?;
        let owned = rows
            .iter()
            .map(|row| column::<String>(row, "tag_id"))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(owned)
    }

    async fn instance_tag_delete_all(&self, instance_id: &str) -> PipelineResult<u64> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute(
                "DELETE FROM instance_tags WHERE instance_id = $1",
                &[&instance_id],
            )
            .await
            .map_err(pg_error)?;
        Ok(deleted)
    }

    async fn instance_tag_delete_except(
        &self,
        instance_id: &str,
        keep: &[String],
    ) -> PipelineResult<u64> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute(
                "DELETE FROM instance_tags WHERE instance_id = $1 AND NOT (tag_id = ANY($2))",
                &[&instance_id, &keep],
            )
            .await
            .map_err(pg_error)?;
        Ok(deleted)
    }

    async fn instance_tag_upsert(&self, link: &InstanceTag) -> PipelineResult<bool> {
        let conn = self.get_conn().await?;
        // xmax = 0 only for freshly inserted rows.
        let row = conn
            .query_one(
                "INSERT INTO instance_tags (tag_id, instance_id, user_id, created_at) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (tag_id, instance_id) DO UPDATE SET user_id = EXCLUDED.user_id \
                 RETURNING (xmax = 0) AS inserted",
                &[&link.tag_id, &link.instance_id, &link.user_id, &link.created_at],
            )
            .await
            .map_err(pg_error)?;
        Ok(column(&row, "inserted")?)
    }

    // ========================================================================
    // TRADE OPERATIONS
    // ========================================================================

    async fn trade_get(&self, trade_id: &str) -> PipelineResult<Option<Trade>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {} FROM trades WHERE trade_id = $1", TRADE_COLUMNS);
        let row = conn
            .query_opt(sql.as_str(), &[&trade_id])
            .await
            .map_err(pg_error)?;
        match row {
            Some(row) => Ok(Some(trade_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn trade_insert_if_absent(&self, trade: &Trade) -> PipelineResult<bool> {
        let sql = format!(
            "INSERT INTO trades ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, \
              $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24) \
             ON CONFLICT (trade_id) DO NOTHING",
            TRADE_COLUMNS
        );
        Ok(self.write_trade(&sql, trade).await? > 0)
    }

    async fn trade_update_if_newer(&self, trade: &Trade) -> PipelineResult<bool> {
        let sql = "UPDATE trades SET user_id_proposed = $2, user_id_accepting = $3, \
             username_proposed = $4, username_accepting = $5, \
             pokemon_instance_id_user_proposed = $6, pokemon_instance_id_user_accepting = $7, \
             trade_status = $8, trace_id = $9, user_proposed_completion_confirmed = $10, \
             user_accepting_completion_confirmed = $11, trade_proposal_date = $12, \
             trade_accepted_date = $13, trade_completed_date = $14, \
             trade_cancelled_date = $15, trade_cancelled_by = $16, is_special_trade = $17, \
             is_registered_trade = $18, is_lucky_trade = $19, trade_dust_cost = $20, \
             trade_friendship_level = $21, user_1_trade_satisfaction = $22, \
             user_2_trade_satisfaction = $23, last_update = $24 \
             WHERE trade_id = $1 AND last_update < $24";
        Ok(self.write_trade(sql, trade).await? > 0)
    }

    async fn trade_delete(&self, trade_id: &str) -> PipelineResult<bool> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute("DELETE FROM trades WHERE trade_id = $1", &[&trade_id])
            .await
            .map_err(|e| match pg_error(e) {
                StorageError::Query { reason } => StorageError::DeleteFailed {
                    entity_type: EntityType::Trade,
                    id: trade_id.to_string(),
                    reason,
                },
                other => other,
            })?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_db_config_defaults() {
        let config = DbConfig::from_lookup(|_| None);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "pokesync");
        assert_eq!(config.max_size, 16);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_db_config_overrides() {
        let vars: HashMap<&str, &str> = [
            ("POKESYNC_DB_HOST", "db.internal"),
            ("POKESYNC_DB_PORT", "6543"),
            ("POKESYNC_DB_POOL_SIZE", "4"),
            ("POKESYNC_DB_TIMEOUT", "not-a-number"),
        ]
        .into_iter()
        .collect();
        let config = DbConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 6543);
        assert_eq!(config.max_size, 4);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_only_lost_connections_are_unavailable() {
        assert!(statement_fault(true, "connection closed".to_string()).is_unavailable());
        let conversion = statement_fault(false, "error serializing parameter 3".to_string());
        assert!(!conversion.is_unavailable());
        assert!(matches!(conversion, StorageError::Query { .. }));
    }

    #[test]
    fn test_instance_columns_match_placeholders() {
        assert_eq!(INSTANCE_COLUMNS.split(',').count(), 16);
        assert_eq!(TRADE_COLUMNS.split(',').count(), 24);
    }
}
