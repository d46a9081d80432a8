//! Persisted entity types.

use crate::{FriendshipLevel, OwnershipFlags, SystemTagDef, TagFlags, TagParent, Timestamp, TradeStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// USER
// ============================================================================

/// A player. Created on first sighting, never deleted by ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

// ============================================================================
// INSTANCE
// ============================================================================

/// Free-form attributes of an instance. Persisted as one JSON document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceAttributes {
    pub nickname: Option<String>,
    pub cp: Option<i64>,
    pub attack_iv: Option<i64>,
    pub defense_iv: Option<i64>,
    pub stamina_iv: Option<i64>,
    pub shiny: bool,
    pub costume_id: Option<i64>,
    pub lucky: bool,
    pub shadow: bool,
    pub purified: bool,
    pub fast_move_id: Option<i64>,
    pub charged_move1_id: Option<i64>,
    pub charged_move2_id: Option<i64>,
    pub pokeball: Option<String>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub gender: Option<String>,
    pub mirror: bool,
    pub pref_lucky: bool,
    pub location_card: Option<String>,
    pub location_caught: Option<String>,
    pub friendship_level: Option<i64>,
    pub date_caught: Option<Timestamp>,
    pub is_traded: bool,
    pub traded_date: Option<Timestamp>,
    pub original_trainer_id: Option<String>,
    pub original_trainer_name: Option<String>,
    pub trace_id: Option<String>,
    pub not_trade_list: Value,
    pub not_wanted_list: Value,
    pub trade_filters: Option<Value>,
    pub wanted_filters: Option<Value>,
    pub mega: bool,
    pub mega_form: Option<String>,
    pub is_mega: bool,
    pub level: Option<f64>,
    pub is_fused: bool,
    pub fusion: Value,
    pub fusion_form: Option<String>,
    pub fused_with: Option<String>,
    pub disabled: bool,
    pub dynamax: bool,
    pub gigantamax: bool,
    pub crown: bool,
    pub max_attack: Option<String>,
    pub max_guard: Option<String>,
    pub max_spirit: Option<String>,
}

/// A single owned, wanted or tradeable collectible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    pub user_id: String,
    pub variant_id: Option<String>,
    pub pokemon_id: i64,
    pub flags: OwnershipFlags,
    pub favorite: bool,
    pub caught_tags: Value,
    pub trade_tags: Value,
    pub wanted_tags: Value,
    pub attributes: InstanceAttributes,
    pub last_update: i64,
    pub date_added: Timestamp,
}

impl Instance {
    /// Flags relevant to system tag membership.
    pub fn tag_flags(&self) -> TagFlags {
        TagFlags {
            favorite: self.favorite,
            is_for_trade: self.flags.is_for_trade,
            is_wanted: self.flags.is_wanted,
            most_wanted: self.flags.most_wanted,
        }
    }

    /// Explicit tag references across all three lists.
    pub fn explicit_tag_ids(&self) -> Vec<String> {
        crate::merge_unique([
            crate::extract_tag_ids(&self.caught_tags),
            crate::extract_tag_ids(&self.trade_tags),
            crate::extract_tag_ids(&self.wanted_tags),
        ])
    }

    /// Non-empty trimmed variant id.
    pub fn variant(&self) -> Option<&str> {
        self.variant_id
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

// ============================================================================
// TRADE
// ============================================================================

/// A proposed exchange of two instances between two users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: String,
    /// Empty when the proposing username could not be resolved.
    pub user_id_proposed: String,
    /// Empty when the accepting username could not be resolved.
    pub user_id_accepting: String,
    pub username_proposed: String,
    pub username_accepting: String,
    pub pokemon_instance_id_user_proposed: String,
    pub pokemon_instance_id_user_accepting: String,
    pub trade_status: TradeStatus,
    pub trace_id: Option<String>,
    pub user_proposed_completion_confirmed: bool,
    pub user_accepting_completion_confirmed: bool,
    pub trade_proposal_date: Option<Timestamp>,
    pub trade_accepted_date: Option<Timestamp>,
    pub trade_completed_date: Option<Timestamp>,
    pub trade_cancelled_date: Option<Timestamp>,
    pub trade_cancelled_by: Option<String>,
    pub is_special_trade: bool,
    pub is_registered_trade: bool,
    pub is_lucky_trade: bool,
    pub trade_dust_cost: Option<i64>,
    pub trade_friendship_level: FriendshipLevel,
    pub user_1_trade_satisfaction: bool,
    pub user_2_trade_satisfaction: bool,
    pub last_update: i64,
}

// ============================================================================
// REGISTRATION / TAGS
// ============================================================================

/// Ledger row: this user has owned or registered this variant at some point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Registration {
    pub user_id: String,
    pub variant_id: String,
}

/// A user-scoped label definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub tag_id: String,
    pub user_id: String,
    pub parent: TagParent,
    pub name: String,
    pub color: Option<String>,
    pub sort: i32,
    pub created_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

impl Tag {
    /// Build a fresh system tag row for a user.
    pub fn system(user_id: &str, def: &SystemTagDef) -> Self {
        Self {
            tag_id: crate::new_tag_id(),
            user_id: user_id.to_string(),
            parent: def.parent,
            name: def.name.to_string(),
            color: Some(def.color.to_string()),
            sort: def.sort,
            created_at: chrono::Utc::now(),
            deleted_at: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Link between a tag and an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceTag {
    pub tag_id: String,
    pub instance_id: String,
    pub user_id: String,
    pub created_at: Timestamp,
}
