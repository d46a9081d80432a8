//! Trade upsert/delete and the completion ownership swap.

use super::{escalates, MessageHandler};
use pokesync_core::{
    now_epoch_ms, OwnershipFlags, PipelineResult, Trade, TradeRecord, TradeStatus,
};
use pokesync_storage::IngestStore;
use serde_json::Value;

/// What happened to one trade update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeOutcome {
    Created,
    Updated,
    /// Existing row removed by a `deleted` status.
    Dropped,
    /// `deleted` status for a trade that does not exist.
    Absent,
    Stale,
    /// Stored status cannot move to the incoming one.
    InvalidTransition,
}

impl<S: IngestStore> MessageHandler<S> {
    pub(super) async fn apply_trade(
        &self,
        trace_id: Option<&str>,
        item: &Value,
    ) -> PipelineResult<TradeOutcome> {
        let TradeRecord {
            mut trade,
            coerced_friendship_level,
        } = TradeRecord::parse(item, trace_id)?;

        if let Some(raw) = coerced_friendship_level {
            tracing::warn!(
                trade_id = %trade.trade_id,
                friendship_level = %raw,
                "Invalid friendship level, using Good"
            );
        }

        let existing = self.store.trade_get(&trade.trade_id).await?;

        if trade.trade_status == TradeStatus::Deleted {
            if existing.is_none() {
                return Ok(TradeOutcome::Absent);
            }
            self.store.trade_delete(&trade.trade_id).await?;
            tracing::info!(trade_id = %trade.trade_id, "Trade dropped");
            return Ok(TradeOutcome::Dropped);
        }

        trade.user_id_proposed = self.resolve_username(&trade.username_proposed).await?;
        trade.user_id_accepting = self.resolve_username(&trade.username_accepting).await?;

        let Some(stored) = existing else {
            if !self.store.trade_insert_if_absent(&trade).await? {
                return Ok(TradeOutcome::Stale);
            }
            return Ok(TradeOutcome::Created);
        };

        if stored.last_update >= trade.last_update {
            return Ok(TradeOutcome::Stale);
        }
        if !stored.trade_status.can_transition_to(trade.trade_status) {
            tracing::warn!(
                trade_id = %trade.trade_id,
                from = %stored.trade_status,
                to = %trade.trade_status,
                "Invalid trade status transition, skipping"
            );
            return Ok(TradeOutcome::InvalidTransition);
        }
        if !self.store.trade_update_if_newer(&trade).await? {
            return Ok(TradeOutcome::Stale);
        }

        if stored.trade_status.completes_exchange(trade.trade_status) {
            self.swap_instances(&trade).await?;
        }
        Ok(TradeOutcome::Updated)
    }

    /// Username to user id. Unresolvable names give an empty id.
    async fn resolve_username(&self, username: &str) -> PipelineResult<String> {
        if username.is_empty() {
            return Ok(String::new());
        }
        match self.store.user_id_for_username(username).await {
            Ok(Some(user_id)) => Ok(user_id),
            Ok(None) => {
                tracing::warn!(username, "Trade username not found");
                Ok(String::new())
            }
            Err(e) if escalates(&e) => Err(e),
            Err(e) => {
                tracing::warn!(username, error = %e, "Trade username lookup failed");
                Ok(String::new())
            }
        }
    }

    /// Hand each instance of a completed trade to the other side.
    ///
    /// Both instances become caught-only for their new owner with a fresh
    /// `last_update`, then registration and tags are synchronized.
    async fn swap_instances(&self, trade: &Trade) -> PipelineResult<()> {
        let proposed_id = trade.pokemon_instance_id_user_proposed.as_str();
        let accepting_id = trade.pokemon_instance_id_user_accepting.as_str();
        if proposed_id.is_empty() || accepting_id.is_empty() {
            tracing::warn!(trade_id = %trade.trade_id, "Completed trade is missing instance ids, not swapping");
            return Ok(());
        }

        let (Some(mut proposed), Some(mut accepting)) = (
            self.store.instance_get(proposed_id).await?,
            self.store.instance_get(accepting_id).await?,
        ) else {
            tracing::warn!(
                trade_id = %trade.trade_id,
                proposed_id,
                accepting_id,
                "Completed trade references a missing instance, not swapping"
            );
            return Ok(());
        };

        std::mem::swap(&mut proposed.user_id, &mut accepting.user_id);

        let now = now_epoch_ms();
        for instance in [&mut proposed, &mut accepting] {
            instance.flags = OwnershipFlags::new(true, false, false, true, false).normalized();
            instance.favorite = false;
            instance.caught_tags = Value::Array(Vec::new());
            instance.trade_tags = Value::Array(Vec::new());
            instance.wanted_tags = Value::Array(Vec::new());
            instance.last_update = now;
        }

        for instance in [&proposed, &accepting] {
            self.store.instance_replace(instance).await?;
            self.relations.sync_instance(instance).await?;
        }

        tracing::info!(
            trade_id = %trade.trade_id,
            proposed_id,
            proposed_owner = %proposed.user_id,
            accepting_id,
            accepting_owner = %accepting.user_id,
            "Trade completed, instances swapped"
        );
        Ok(())
    }
}
