//! PokeSync Core - Entity Types and Pure Pipeline Logic
//!
//! Data structures, error taxonomy, ownership normalization, message
//! decoding and payload parsing. Nothing in this crate performs I/O, so the
//! same rules run in the live consumer and in offline repair tooling.

pub mod decode;
pub mod entities;
pub mod enums;
pub mod error;
pub mod fields;
pub mod ownership;
pub mod payload;
pub mod tags;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use decode::{decode, parse_document, Document};
pub use entities::{Instance, InstanceAttributes, InstanceTag, Registration, Tag, Trade, User};
pub use enums::{
    EntityType, FriendshipLevel, FriendshipLevelParseError, TagParent, TagParentParseError,
    TradeStatus, TradeStatusParseError,
};
pub use error::{
    BusError, ConfigError, DecodeError, DecodeStage, PipelineError, PipelineResult, PoisonError,
    StorageError, ValidationError,
};
pub use ownership::{normalize, OwnershipFlags};
pub use payload::{
    instance_updates, trade_updates, InstanceRecord, TradeRecord, UserRecord,
    DEFAULT_UNOWNED_FIELD,
};
pub use tags::{
    extract_tag_ids, merge_unique, system_tag_kind, SystemTagDef, SystemTagKind, TagFlags,
    SYSTEM_TAGS,
};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new tag id (UUIDv7, timestamp-sortable).
pub fn new_tag_id() -> String {
    Uuid::now_v7().to_string()
}

/// Current wall-clock time as epoch milliseconds, the unit of `last_update`.
pub fn now_epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}
