//! PokeSync Test Utilities
//!
//! Shared test infrastructure for the PokeSync workspace:
//! - Document builders and gzip helpers for bus payloads
//! - Seeded entity fixtures for the `MockStore`
//! - Proptest generators for flags and instance updates
//! - Assertions for pipeline-specific invariants

// Re-export mock storage from its source crate
pub use pokesync_storage::MockStore;

// Re-export core types for convenience
pub use pokesync_core::{
    Document, Instance, InstanceAttributes, OwnershipFlags, PipelineError, PipelineResult,
    StorageError, Tag, TagParent, Trade, TradeStatus, User,
};

pub use fixtures::{
    document, gzip_bytes, gzip_json, instance_fixture, user_fixture, DocumentBuilder,
};

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;
    use chrono::{TimeZone, Utc};
    use flate2::{write::GzEncoder, Compression};
    use serde_json::{json, Map, Value};
    use std::io::Write;

    /// Gzip raw bytes the way producers compress bus payloads.
    pub fn gzip_bytes(raw: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(raw)
            .unwrap_or_else(|e| panic!("gzip write failed: {}", e));
        encoder
            .finish()
            .unwrap_or_else(|e| panic!("gzip finish failed: {}", e))
    }

    /// Serialize and gzip a JSON value.
    pub fn gzip_json(value: &Value) -> Vec<u8> {
        gzip_bytes(value.to_string().as_bytes())
    }

    /// Unwrap a `json!` object literal into a [`Document`].
    pub fn document(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("fixture must be a JSON object, got {}", other),
        }
    }

    /// Fluent builder for bus documents.
    #[derive(Debug, Clone)]
    pub struct DocumentBuilder {
        fields: Map<String, Value>,
        instances: Vec<Value>,
        trades: Vec<Value>,
    }

    impl DocumentBuilder {
        pub fn new(user_id: &str, username: &str) -> Self {
            let mut fields = Map::new();
            fields.insert("user_id".to_string(), json!(user_id));
            fields.insert("username".to_string(), json!(username));
            Self {
                fields,
                instances: Vec::new(),
                trades: Vec::new(),
            }
        }

        pub fn trace_id(mut self, trace_id: &str) -> Self {
            self.fields.insert("trace_id".to_string(), json!(trace_id));
            self
        }

        pub fn location(mut self, latitude: f64, longitude: f64) -> Self {
            self.fields.insert(
                "location".to_string(),
                json!({"latitude": latitude, "longitude": longitude}),
            );
            self
        }

        /// Append a raw `pokemonUpdates` entry.
        pub fn instance(mut self, update: Value) -> Self {
            self.instances.push(update);
            self
        }

        /// Append an instance update carrying only identity, species, flags
        /// and `last_update`.
        pub fn instance_flags(
            self,
            instance_id: &str,
            variant_id: &str,
            flags: OwnershipFlags,
            last_update: i64,
        ) -> Self {
            self.instance(json!({
                "key": instance_id,
                "pokemon_id": 25,
                "variant_id": variant_id,
                "is_caught": flags.is_caught,
                "is_wanted": flags.is_wanted,
                "is_for_trade": flags.is_for_trade,
                "registered": flags.registered,
                "most_wanted": flags.most_wanted,
                "last_update": last_update,
            }))
        }

        /// Append a `tradeUpdates` entry wrapping `trade_data`.
        pub fn trade(mut self, trade_id: &str, trade_data: Value) -> Self {
            self.trades
                .push(json!({"key": trade_id, "tradeData": trade_data}));
            self
        }

        pub fn build(self) -> Document {
            let mut fields = self.fields;
            if !self.instances.is_empty() {
                fields.insert("pokemonUpdates".to_string(), Value::Array(self.instances));
            }
            if !self.trades.is_empty() {
                fields.insert("tradeUpdates".to_string(), Value::Array(self.trades));
            }
            fields
        }

        /// Build and gzip, ready to use as a bus payload.
        pub fn gzip(self) -> Vec<u8> {
            gzip_json(&Value::Object(self.build()))
        }
    }

    pub fn user_fixture(user_id: &str, username: &str) -> User {
        User {
            user_id: user_id.to_string(),
            username: username.to_string(),
            latitude: None,
            longitude: None,
        }
    }

    /// A stored instance with empty tag lists and `last_update = 1`.
    pub fn instance_fixture(
        instance_id: &str,
        user_id: &str,
        variant_id: &str,
        flags: OwnershipFlags,
    ) -> Instance {
        Instance {
            instance_id: instance_id.to_string(),
            user_id: user_id.to_string(),
            variant_id: Some(variant_id.to_string()),
            pokemon_id: 25,
            flags,
            favorite: false,
            caught_tags: json!([]),
            trade_tags: json!([]),
            wanted_tags: json!([]),
            attributes: InstanceAttributes::default(),
            last_update: 1,
            date_added: Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_else(Utc::now),
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    /// Any of the 32 flag combinations.
    pub fn arb_ownership_flags() -> impl Strategy<Value = OwnershipFlags> {
        (
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(|(caught, wanted, trade, registered, most)| {
                OwnershipFlags::new(caught, wanted, trade, registered, most)
            })
    }

    /// An instance update for one of a few keys, so generated batches collide.
    pub fn arb_instance_update() -> impl Strategy<Value = Value> {
        (
            prop::sample::select(vec!["i1", "i2", "i3"]),
            arb_ownership_flags(),
            1i64..1_000,
            0i64..5_000,
        )
            .prop_map(|(key, flags, last_update, cp)| {
                json!({
                    "key": key,
                    "pokemon_id": 25,
                    "variant_id": "0025-default",
                    "is_caught": flags.is_caught,
                    "is_wanted": flags.is_wanted,
                    "is_for_trade": flags.is_for_trade,
                    "registered": flags.registered,
                    "most_wanted": flags.most_wanted,
                    "cp": cp,
                    "last_update": last_update,
                })
            })
    }

    /// Updates with distinct `last_update` values per key.
    pub fn arb_instance_batch(max_len: usize) -> impl Strategy<Value = Vec<Value>> {
        prop::collection::vec(arb_instance_update(), 1..=max_len).prop_map(|mut updates| {
            for (index, update) in updates.iter_mut().enumerate() {
                if let Some(last) = update.get("last_update").and_then(Value::as_i64) {
                    update["last_update"] = json!(last * 100 + index as i64);
                }
            }
            updates
        })
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for pipeline-specific invariants.

    use super::*;

    /// Assert that flags are a fixed point of normalization and obey every
    /// ownership rule.
    #[track_caller]
    pub fn assert_canonical_flags(flags: OwnershipFlags) {
        assert_eq!(flags, flags.normalized(), "flags not normalized: {:?}", flags);
        assert!(!flags.is_for_trade || flags.is_caught, "for-trade without caught: {:?}", flags);
        assert!(!(flags.is_caught && flags.is_wanted), "caught and wanted: {:?}", flags);
        assert!(!flags.is_caught || flags.registered, "caught but unregistered: {:?}", flags);
        assert!(!flags.most_wanted || flags.is_wanted, "most wanted but not wanted: {:?}", flags);
    }

    /// Assert that a result is a handler-level storage outage.
    #[track_caller]
    pub fn assert_unavailable<T: std::fmt::Debug>(result: &PipelineResult<T>) {
        match result {
            Err(PipelineError::Storage(e)) if e.is_unavailable() => {}
            other => panic!("Expected store unavailable, got: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::assertions::*;
    use super::fixtures::*;
    use super::generators::*;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_document_builder_shape() {
        let doc = DocumentBuilder::new("u1", "ash")
            .location(1.0, 2.0)
            .instance_flags("i1", "0025-default", OwnershipFlags::default(), 5)
            .trade("t1", serde_json::json!({"trade_status": "pending"}))
            .build();
        assert_eq!(doc["user_id"], "u1");
        assert_eq!(doc["pokemonUpdates"][0]["key"], "i1");
        assert_eq!(doc["tradeUpdates"][0]["tradeData"]["trade_status"], "pending");
    }

    #[test]
    fn test_gzip_round_trips_through_decode() {
        let payload = DocumentBuilder::new("u1", "ash").gzip();
        let decoded = pokesync_core::decode(&payload).unwrap();
        assert_eq!(decoded["username"], "ash");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_normalized_flags_are_canonical(flags in arb_ownership_flags()) {
            assert_canonical_flags(flags.normalized());
        }
    }
}
