//! End-to-end handler behaviour over the in-memory store.

mod common;

use chrono::Utc;
use common::AlwaysFailHandler;
use pokesync_core::{OwnershipFlags, Tag, TagParent};
use pokesync_ingest::{DocumentHandler, MessageHandler, PoisonStore};
use pokesync_storage::{IngestStore, MockStore};
use pokesync_test_utils::assertions::assert_canonical_flags;
use pokesync_test_utils::generators::arb_instance_batch;
use pokesync_test_utils::{document, DocumentBuilder};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

fn payload_flags(update: &Value) -> OwnershipFlags {
    let flag = |name: &str| update.get(name).and_then(Value::as_bool).unwrap_or(false);
    OwnershipFlags::new(
        flag("is_caught"),
        flag("is_wanted"),
        flag("is_for_trade"),
        flag("registered"),
        flag("most_wanted"),
    )
    .normalized()
}

fn last_update(update: &Value) -> i64 {
    update["last_update"].as_i64().unwrap_or_default()
}

async fn apply_each(updates: &[Value]) -> Arc<MockStore> {
    let store = Arc::new(MockStore::new());
    let handler = MessageHandler::new(Arc::clone(&store));
    for update in updates {
        let doc = DocumentBuilder::new("u1", "ash").instance(update.clone()).build();
        handler.handle(&doc).await.unwrap();
    }
    store
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Each instance ends up as its newest update, upsert or delete, whatever
    /// the delivery order.
    ///
    /// Deletes leave no trace, so a delete that reaches an empty store cannot
    /// stop an older upsert delivered after it. Only chronological delivery
    /// guarantees a newest delete leaves the key absent; any order guarantees
    /// no row newer than it survives.
    #[test]
    fn prop_delivery_order_does_not_change_result(
        (updates, shuffled) in arb_instance_batch(12)
            .prop_flat_map(|batch| (Just(batch.clone()), Just(batch).prop_shuffle()))
    ) {
        let mut chronological = updates.clone();
        chronological.sort_by_key(last_update);

        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let (in_order, reordered) = runtime.block_on(async {
            (apply_each(&chronological).await, apply_each(&shuffled).await)
        });

        let mut newest: HashMap<&str, &Value> = HashMap::new();
        for update in &updates {
            let key = update["key"].as_str().unwrap();
            if newest.get(key).map_or(true, |seen| last_update(seen) < last_update(update)) {
                newest.insert(key, update);
            }
        }

        for (key, update) in newest {
            let a = runtime.block_on(in_order.instance_get(key)).unwrap();
            let b = runtime.block_on(reordered.instance_get(key)).unwrap();
            let expected = payload_flags(update);

            if expected.is_unowned() {
                prop_assert!(a.is_none(), "{} survived its newest delete", key);
                if let Some(b) = b {
                    prop_assert!(b.last_update < last_update(update));
                }
                continue;
            }

            for stored in [a, b] {
                let stored = stored.unwrap();
                prop_assert_eq!(stored.flags, expected);
                prop_assert_eq!(stored.last_update, last_update(update));
                prop_assert_eq!(stored.attributes.cp, update["cp"].as_i64());
                assert_canonical_flags(stored.flags);
            }
        }
    }
}

#[tokio::test]
async fn test_deletion_clears_tags_but_keeps_registration() {
    let store = Arc::new(MockStore::new());
    store.put_tag(Tag {
        tag_id: "shinies".to_string(),
        user_id: "u1".to_string(),
        parent: TagParent::Caught,
        name: "Shinies".to_string(),
        color: None,
        sort: 0,
        created_at: Utc::now(),
        deleted_at: None,
    });
    let handler = MessageHandler::new(Arc::clone(&store));

    let create = DocumentBuilder::new("u1", "ash")
        .instance(json!({
            "key": "i1", "pokemon_id": 25, "variant_id": "0025-default",
            "is_caught": true, "is_for_trade": true,
            "caught_tags": ["shinies", "not-mine"], "last_update": 10
        }))
        .build();
    handler.handle(&create).await.unwrap();

    let linked = store.linked_tag_ids("i1");
    assert!(linked.contains(&"shinies".to_string()));
    assert!(!linked.contains(&"not-mine".to_string()));
    assert_eq!(linked.len(), 2, "explicit tag plus the For Trade system tag");
    assert!(store.registration_exists("u1", "0025-default"));

    let delete = DocumentBuilder::new("u1", "ash")
        .instance(json!({"key": "i1", "is_for_trade": true, "last_update": 11}))
        .build();
    let summary = handler.handle(&delete).await.unwrap();

    assert_eq!(summary.instances_deleted, 1);
    assert!(store.instance_get("i1").await.unwrap().is_none());
    assert!(store.linked_tag_ids("i1").is_empty());
    assert!(store.registration_exists("u1", "0025-default"));
}

#[tokio::test]
async fn test_trade_deletion_noop_then_removal() {
    let store = Arc::new(MockStore::new());
    let handler = MessageHandler::new(Arc::clone(&store));
    let trade = |status: &str, last_update: i64| {
        DocumentBuilder::new("u1", "ash")
            .trade(
                "t1",
                json!({
                    "trade_status": status,
                    "username_proposed": "ash",
                    "username_accepting": "misty",
                    "last_update": last_update
                }),
            )
            .build()
    };

    let summary = handler.handle(&trade("deleted", 1)).await.unwrap();
    assert_eq!(summary.trades_dropped, 0);
    assert_eq!(summary.trades_skipped, 1);
    assert_eq!(store.trade_count(), 0);

    let summary = handler.handle(&trade("pending", 2)).await.unwrap();
    assert_eq!(summary.trades_created, 1);
    let stored = store.trade_get("t1").await.unwrap().unwrap();
    assert_eq!(stored.user_id_proposed, "u1");
    assert_eq!(stored.user_id_accepting, "");

    let summary = handler.handle(&trade("deleted", 3)).await.unwrap();
    assert_eq!(summary.trades_dropped, 1);
    assert_eq!(store.trade_count(), 0);
}

#[tokio::test]
async fn test_reprocessing_recovers_documents_after_outage() {
    let dir = tempfile::tempdir().unwrap();
    let poison = PoisonStore::new(dir.path().join("failed.jsonl"));
    let store = Arc::new(MockStore::new());
    let handler = MessageHandler::new(Arc::clone(&store));

    let good = DocumentBuilder::new("u1", "ash")
        .instance(json!({"key": "i1", "pokemon_id": 1, "is_caught": true, "last_update": 5}))
        .build();
    let broken = document(json!({"username": "nobody"}));

    store.set_unavailable(true);
    assert!(handler.handle(&good).await.is_err());
    poison.append(&good).await.unwrap();
    poison.append(&broken).await.unwrap();
    store.set_unavailable(false);

    let report = poison.reprocess(&handler).await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    assert!(store.instance_get("i1").await.unwrap().is_some());

    let remaining = poison.lines().await.unwrap();
    assert_eq!(remaining, vec![serde_json::to_string(&broken).unwrap()]);
}

#[tokio::test]
async fn test_reprocessing_keeps_everything_while_handler_fails() {
    let dir = tempfile::tempdir().unwrap();
    let poison = PoisonStore::new(dir.path().join("failed.jsonl"));
    let doc = DocumentBuilder::new("u1", "ash").build();
    poison.append(&doc).await.unwrap();
    poison.append(&doc).await.unwrap();
    let before = std::fs::read_to_string(poison.path()).unwrap();

    let report = poison.reprocess(&AlwaysFailHandler).await.unwrap();
    assert_eq!(report.failed, 2);
    assert_eq!(report.remaining, 2);
    assert_eq!(std::fs::read_to_string(poison.path()).unwrap(), before);
}
