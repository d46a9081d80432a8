//! Typed views over a decoded bus document.
//!
//! Document shape:
//!
//! ```text
//! { "user_id", "username", "trace_id", "location": {"latitude", "longitude"} | null,
//!   "pokemonUpdates": [ { "key", "is_caught", "is_wanted", ..., "last_update" } ],
//!   "tradeUpdates":   [ { "key", "tradeData": { "trade_id", "trade_status", ... } } ] }
//! ```

use crate::fields::{
    epoch, json_or_empty, nullable_float, nullable_int, nullable_json, nullable_string,
    optional_bool, optional_date, optional_timestamp, required_int, scalar_text,
};
use crate::{
    Document, FriendshipLevel, Instance, InstanceAttributes, OwnershipFlags, Timestamp, Trade,
    TradeStatus, ValidationError,
};
use serde_json::{Map, Value};

pub const INSTANCE_UPDATES_KEY: &str = "pokemonUpdates";
pub const TRADE_UPDATES_KEY: &str = "tradeUpdates";
pub const TRADE_DATA_KEY: &str = "tradeData";

/// Payload key that forces an instance to unowned when set.
pub const DEFAULT_UNOWNED_FIELD: &str = "is_unowned";

// ============================================================================
// USER
// ============================================================================

/// User identity and location carried by a document.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub user_id: String,
    pub username: String,
    pub location: Option<(f64, f64)>,
    pub trace_id: Option<String>,
}

impl UserRecord {
    pub fn parse(doc: &Document) -> Result<Self, ValidationError> {
        let user_id = nullable_string(doc.get("user_id")).ok_or_else(|| {
            ValidationError::RequiredFieldMissing {
                field: "user_id".to_string(),
            }
        })?;
        let username = nullable_string(doc.get("username")).unwrap_or_default();
        let location = doc.get("location").and_then(Value::as_object).and_then(|loc| {
            let lat = nullable_float(loc.get("latitude"))?;
            let lng = nullable_float(loc.get("longitude"))?;
            Some((lat, lng))
        });
        Ok(Self {
            user_id,
            username,
            location,
            trace_id: nullable_string(doc.get("trace_id")),
        })
    }
}

/// Entries of the document's instance-update list.
pub fn instance_updates(doc: &Document) -> &[Value] {
    list(doc, INSTANCE_UPDATES_KEY)
}

/// Entries of the document's trade-update list.
pub fn trade_updates(doc: &Document) -> &[Value] {
    list(doc, TRADE_UPDATES_KEY)
}

fn list<'a>(doc: &'a Document, key: &str) -> &'a [Value] {
    doc.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

// ============================================================================
// INSTANCE
// ============================================================================

/// One instance update, with identity and ownership resolved.
///
/// `flags` are as received; normalization happens in the handler.
#[derive(Debug, Clone)]
pub struct InstanceRecord<'a> {
    pub instance_id: String,
    pub flags: OwnershipFlags,
    pub variant_id: Option<String>,
    pub last_update: i64,
    fields: &'a Map<String, Value>,
}

impl<'a> InstanceRecord<'a> {
    /// Resolve identity and flags. `unowned_field` names the payload key that
    /// forces `is_caught` off.
    pub fn parse(item: &'a Value, unowned_field: &str) -> Result<Self, ValidationError> {
        let fields = item
            .as_object()
            .ok_or_else(|| ValidationError::InvalidValue {
                field: INSTANCE_UPDATES_KEY.to_string(),
                reason: "entry is not an object".to_string(),
            })?;

        let instance_id = nullable_string(fields.get("instance_id"))
            .or_else(|| nullable_string(fields.get("key")))
            .ok_or_else(|| ValidationError::RequiredFieldMissing {
                field: "instance_id".to_string(),
            })?;

        let caught = match fields.get("is_caught") {
            Some(v) if !v.is_null() => optional_bool(Some(v)),
            _ => optional_bool(fields.get("is_owned")),
        };
        let forced_unowned = optional_bool(fields.get(unowned_field));

        let flags = OwnershipFlags {
            is_caught: caught && !forced_unowned,
            is_wanted: optional_bool(fields.get("is_wanted")),
            is_for_trade: optional_bool(fields.get("is_for_trade")),
            registered: optional_bool(fields.get("registered")),
            most_wanted: optional_bool(fields.get("most_wanted")),
        };

        Ok(Self {
            instance_id,
            flags,
            variant_id: nullable_string(fields.get("variant_id")),
            last_update: epoch(fields.get("last_update")),
            fields,
        })
    }

    /// Build the full row for an upsert. Requires `pokemon_id`.
    pub fn to_instance(
        &self,
        user_id: &str,
        flags: OwnershipFlags,
        date_added: Timestamp,
    ) -> Result<Instance, ValidationError> {
        let f = self.fields;
        let pokemon_id = required_int(f.get("pokemon_id"), "pokemon_id")?;
        let tags = |key: &str| match f.get(key) {
            None | Some(Value::Null) => Value::Array(Vec::new()),
            Some(v) => v.clone(),
        };

        Ok(Instance {
            instance_id: self.instance_id.clone(),
            user_id: user_id.to_string(),
            variant_id: self.variant_id.clone(),
            pokemon_id,
            flags,
            favorite: optional_bool(f.get("favorite")),
            caught_tags: tags("caught_tags"),
            trade_tags: tags("trade_tags"),
            wanted_tags: tags("wanted_tags"),
            attributes: InstanceAttributes {
                nickname: nullable_string(f.get("nickname")),
                cp: nullable_int(f.get("cp")),
                attack_iv: nullable_int(f.get("attack_iv")),
                defense_iv: nullable_int(f.get("defense_iv")),
                stamina_iv: nullable_int(f.get("stamina_iv")),
                shiny: optional_bool(f.get("shiny")),
                costume_id: nullable_int(f.get("costume_id")),
                lucky: optional_bool(f.get("lucky")),
                shadow: optional_bool(f.get("shadow")),
                purified: optional_bool(f.get("purified")),
                fast_move_id: nullable_int(f.get("fast_move_id")),
                charged_move1_id: nullable_int(f.get("charged_move1_id")),
                charged_move2_id: nullable_int(f.get("charged_move2_id")),
                pokeball: nullable_string(f.get("pokeball")),
                weight: nullable_float(f.get("weight")),
                height: nullable_float(f.get("height")),
                gender: nullable_string(f.get("gender")),
                mirror: optional_bool(f.get("mirror")),
                pref_lucky: optional_bool(f.get("pref_lucky")),
                location_card: nullable_string(f.get("location_card")),
                location_caught: nullable_string(f.get("location_caught")),
                friendship_level: nullable_int(f.get("friendship_level")),
                date_caught: optional_date(f.get("date_caught")),
                is_traded: optional_bool(f.get("is_traded")),
                traded_date: optional_date(f.get("traded_date")),
                original_trainer_id: nullable_string(f.get("original_trainer_id")),
                original_trainer_name: nullable_string(f.get("original_trainer_name")),
                trace_id: nullable_string(f.get("trace_id")),
                not_trade_list: json_or_empty(f.get("not_trade_list")),
                not_wanted_list: json_or_empty(f.get("not_wanted_list")),
                trade_filters: nullable_json(f.get("trade_filters")),
                wanted_filters: nullable_json(f.get("wanted_filters")),
                mega: optional_bool(f.get("mega")),
                mega_form: nullable_string(f.get("mega_form")),
                is_mega: optional_bool(f.get("is_mega")),
                level: nullable_float(f.get("level")),
                is_fused: optional_bool(f.get("is_fused")),
                fusion: json_or_empty(f.get("fusion")),
                fusion_form: nullable_string(f.get("fusion_form")),
                fused_with: nullable_string(f.get("fused_with")),
                disabled: optional_bool(f.get("disabled")),
                dynamax: optional_bool(f.get("dynamax")),
                gigantamax: optional_bool(f.get("gigantamax")),
                crown: optional_bool(f.get("crown")),
                max_attack: nullable_string(f.get("max_attack")),
                max_guard: nullable_string(f.get("max_guard")),
                max_spirit: nullable_string(f.get("max_spirit")),
            },
            last_update: self.last_update,
            date_added,
        })
    }
}

// ============================================================================
// TRADE
// ============================================================================

/// One trade update. User ids are left empty for the handler to resolve.
#[derive(Debug, Clone)]
pub struct TradeRecord {
    pub trade: Trade,
    /// Raw friendship level when it was outside the whitelist and coerced.
    pub coerced_friendship_level: Option<String>,
}

impl TradeRecord {
    pub fn parse(item: &Value, trace_id: Option<&str>) -> Result<Self, ValidationError> {
        let outer = item.as_object().ok_or_else(|| ValidationError::InvalidValue {
            field: TRADE_UPDATES_KEY.to_string(),
            reason: "entry is not an object".to_string(),
        })?;
        let data = outer
            .get(TRADE_DATA_KEY)
            .and_then(Value::as_object)
            .unwrap_or(outer);

        let trade_id = nullable_string(data.get("trade_id"))
            .or_else(|| nullable_string(outer.get("key")))
            .ok_or_else(|| ValidationError::RequiredFieldMissing {
                field: "trade_id".to_string(),
            })?;

        let raw_status = scalar_text(data.get("trade_status")).unwrap_or_default();
        let trade_status =
            TradeStatus::from_db_str(&raw_status).map_err(|e| ValidationError::InvalidValue {
                field: "trade_status".to_string(),
                reason: e.to_string(),
            })?;

        let raw_level = scalar_text(data.get("trade_friendship_level")).unwrap_or_default();
        let (trade_friendship_level, coerced_friendship_level) = if raw_level.is_empty() {
            (FriendshipLevel::Good, None)
        } else {
            match FriendshipLevel::from_db_str(&raw_level) {
                Ok(level) => (level, None),
                Err(_) => (FriendshipLevel::Good, Some(raw_level)),
            }
        };

        let text = |key: &str| nullable_string(data.get(key)).unwrap_or_default();

        Ok(Self {
            trade: Trade {
                trade_id,
                user_id_proposed: String::new(),
                user_id_accepting: String::new(),
                username_proposed: text("username_proposed"),
                username_accepting: text("username_accepting"),
                pokemon_instance_id_user_proposed: text("pokemon_instance_id_user_proposed"),
                pokemon_instance_id_user_accepting: text("pokemon_instance_id_user_accepting"),
                trade_status,
                trace_id: trace_id.map(str::to_string),
                user_proposed_completion_confirmed: optional_bool(
                    data.get("user_proposed_completion_confirmed"),
                ),
                user_accepting_completion_confirmed: optional_bool(
                    data.get("user_accepting_completion_confirmed"),
                ),
                trade_proposal_date: optional_timestamp(data.get("trade_proposal_date")),
                trade_accepted_date: optional_timestamp(data.get("trade_accepted_date")),
                trade_completed_date: optional_timestamp(data.get("trade_completed_date")),
                trade_cancelled_date: optional_timestamp(data.get("trade_cancelled_date")),
                trade_cancelled_by: nullable_string(data.get("trade_cancelled_by")),
                is_special_trade: optional_bool(data.get("is_special_trade")),
                is_registered_trade: optional_bool(data.get("is_registered_trade")),
                is_lucky_trade: optional_bool(data.get("is_lucky_trade")),
                trade_dust_cost: nullable_int(data.get("trade_dust_cost")),
                trade_friendship_level,
                user_1_trade_satisfaction: optional_bool(data.get("user_1_trade_satisfaction")),
                user_2_trade_satisfaction: optional_bool(data.get("user_2_trade_satisfaction")),
                last_update: epoch(data.get("last_update")),
            },
            coerced_friendship_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        match v {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn test_user_record() {
        let d = doc(json!({
            "user_id": "u1",
            "username": "ash",
            "trace_id": "t-1",
            "location": {"latitude": 35.6, "longitude": "139.7"}
        }));
        let user = UserRecord::parse(&d).unwrap();
        assert_eq!(user.user_id, "u1");
        assert_eq!(user.username, "ash");
        assert_eq!(user.location, Some((35.6, 139.7)));
        assert_eq!(user.trace_id.as_deref(), Some("t-1"));
    }

    #[test]
    fn test_user_record_null_location() {
        let d = doc(json!({"user_id": "u1", "username": "ash", "location": null}));
        assert_eq!(UserRecord::parse(&d).unwrap().location, None);
    }

    #[test]
    fn test_user_record_requires_user_id() {
        let d = doc(json!({"username": "ash"}));
        assert!(matches!(
            UserRecord::parse(&d),
            Err(ValidationError::RequiredFieldMissing { .. })
        ));
    }

    #[test]
    fn test_update_lists_default_empty() {
        let d = doc(json!({"user_id": "u1", "pokemonUpdates": "oops"}));
        assert!(instance_updates(&d).is_empty());
        assert!(trade_updates(&d).is_empty());
    }

    #[test]
    fn test_instance_identity_falls_back_to_key() {
        let item = json!({"key": "inst-9", "is_caught": true});
        let rec = InstanceRecord::parse(&item, DEFAULT_UNOWNED_FIELD).unwrap();
        assert_eq!(rec.instance_id, "inst-9");
        assert!(rec.flags.is_caught);
    }

    #[test]
    fn test_instance_missing_identity() {
        let item = json!({"is_caught": true});
        assert!(InstanceRecord::parse(&item, DEFAULT_UNOWNED_FIELD).is_err());
    }

    #[test]
    fn test_instance_legacy_owned_alias() {
        let item = json!({"instance_id": "i", "is_owned": "true"});
        let rec = InstanceRecord::parse(&item, DEFAULT_UNOWNED_FIELD).unwrap();
        assert!(rec.flags.is_caught);
    }

    #[test]
    fn test_instance_unowned_field_override() {
        let item = json!({"instance_id": "i", "is_caught": true, "is_missing": true});
        let default = InstanceRecord::parse(&item, "is_unowned").unwrap();
        assert!(default.flags.is_caught);
        let configured = InstanceRecord::parse(&item, "is_missing").unwrap();
        assert!(!configured.flags.is_caught);
    }

    #[test]
    fn test_instance_requires_pokemon_id_for_upsert() {
        let item = json!({"instance_id": "i", "is_caught": true});
        let rec = InstanceRecord::parse(&item, DEFAULT_UNOWNED_FIELD).unwrap();
        assert!(rec.to_instance("u1", rec.flags, Utc::now()).is_err());
    }

    #[test]
    fn test_instance_attributes() {
        let item = json!({
            "instance_id": "i",
            "pokemon_id": "25",
            "variant_id": "0025-shiny",
            "is_caught": true,
            "favorite": true,
            "cp": 512,
            "nickname": "",
            "date_caught": "2024-01-02",
            "not_trade_list": "",
            "caught_tags": ["t1"],
            "last_update": 1700000000000i64
        });
        let rec = InstanceRecord::parse(&item, DEFAULT_UNOWNED_FIELD).unwrap();
        let inst = rec.to_instance("u1", rec.flags.normalized(), Utc::now()).unwrap();
        assert_eq!(inst.pokemon_id, 25);
        assert_eq!(inst.variant(), Some("0025-shiny"));
        assert!(inst.favorite);
        assert!(inst.flags.registered);
        assert_eq!(inst.attributes.cp, Some(512));
        assert_eq!(inst.attributes.nickname, None);
        assert!(inst.attributes.date_caught.is_some());
        assert_eq!(inst.attributes.not_trade_list, json!({}));
        assert_eq!(inst.trade_tags, json!([]));
        assert_eq!(inst.explicit_tag_ids(), vec!["t1"]);
        assert_eq!(inst.last_update, 1_700_000_000_000);
    }

    #[test]
    fn test_trade_record() {
        let item = json!({
            "key": "k-1",
            "tradeData": {
                "trade_id": "tr-1",
                "trade_status": "accepted",
                "username_proposed": "ash",
                "username_accepting": "misty",
                "pokemon_instance_id_user_proposed": "i1",
                "pokemon_instance_id_user_accepting": "i2",
                "trade_friendship_level": "Best",
                "trade_proposal_date": "2024-05-01T12:00:00Z",
                "trade_dust_cost": "20000",
                "last_update": 10
            }
        });
        let rec = TradeRecord::parse(&item, Some("trace")).unwrap();
        assert_eq!(rec.trade.trade_id, "tr-1");
        assert_eq!(rec.trade.trade_status, TradeStatus::Accepted);
        assert_eq!(rec.trade.trade_friendship_level, FriendshipLevel::Best);
        assert_eq!(rec.trade.trade_dust_cost, Some(20000));
        assert!(rec.trade.trade_proposal_date.is_some());
        assert_eq!(rec.trade.trace_id.as_deref(), Some("trace"));
        assert!(rec.trade.user_id_proposed.is_empty());
        assert!(rec.coerced_friendship_level.is_none());
    }

    #[test]
    fn test_trade_record_key_fallback_and_defaults() {
        let item = json!({"key": "k-2", "tradeData": {"trade_friendship_level": "Platinum"}});
        let rec = TradeRecord::parse(&item, None).unwrap();
        assert_eq!(rec.trade.trade_id, "k-2");
        assert_eq!(rec.trade.trade_status, TradeStatus::Proposed);
        assert_eq!(rec.trade.trade_friendship_level, FriendshipLevel::Good);
        assert_eq!(rec.coerced_friendship_level.as_deref(), Some("Platinum"));
        assert_eq!(rec.trade.last_update, 0);
    }

    #[test]
    fn test_trade_record_missing_id() {
        let item = json!({"tradeData": {"trade_status": "proposed"}});
        assert!(TradeRecord::parse(&item, None).is_err());
    }

    #[test]
    fn test_trade_record_unknown_status() {
        let item = json!({"tradeData": {"trade_id": "t", "trade_status": "exploded"}});
        assert!(matches!(
            TradeRecord::parse(&item, None),
            Err(ValidationError::InvalidValue { .. })
        ));
    }
}
