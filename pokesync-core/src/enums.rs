//! Enum types for PokeSync entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ENTITY TYPE
// ============================================================================

/// Entity type discriminator used in storage errors and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    User,
    Instance,
    Trade,
    Registration,
    Tag,
    InstanceTag,
}

impl EntityType {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            EntityType::User => "users",
            EntityType::Instance => "instances",
            EntityType::Trade => "trades",
            EntityType::Registration => "registrations",
            EntityType::Tag => "tags",
            EntityType::InstanceTag => "instance_tags",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

// ============================================================================
// TRADE STATUS
// ============================================================================

/// Lifecycle status of a trade.
///
/// `Deleted` never reaches the store: an incoming trade carrying it removes
/// the row instead of being upserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    #[default]
    Proposed,
    Pending,
    Accepted,
    Completed,
    Cancelled,
    Denied,
    Deleted,
}

impl TradeStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TradeStatus::Proposed => "proposed",
            TradeStatus::Pending => "pending",
            TradeStatus::Accepted => "accepted",
            TradeStatus::Completed => "completed",
            TradeStatus::Cancelled => "cancelled",
            TradeStatus::Denied => "denied",
            TradeStatus::Deleted => "deleted",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, TradeStatusParseError> {
        match s.trim().to_lowercase().as_str() {
            "" | "proposed" => Ok(TradeStatus::Proposed),
            "pending" => Ok(TradeStatus::Pending),
            "accepted" => Ok(TradeStatus::Accepted),
            "completed" => Ok(TradeStatus::Completed),
            "cancelled" | "canceled" => Ok(TradeStatus::Cancelled),
            "denied" => Ok(TradeStatus::Denied),
            "deleted" => Ok(TradeStatus::Deleted),
            _ => Err(TradeStatusParseError(s.to_string())),
        }
    }

    /// Whether a stored trade in `self` may be updated to `next`.
    ///
    /// Repeating the current status is always allowed. `Completed` and
    /// `Denied` are terminal. `Deleted` never reaches this check; it removes
    /// the row instead.
    pub fn can_transition_to(&self, next: TradeStatus) -> bool {
        if *self == next {
            return true;
        }
        use TradeStatus::*;
        matches!(
            (self, next),
            (Proposed, Pending | Denied | Deleted)
                | (Pending, Accepted | Cancelled | Completed)
                | (Accepted, Cancelled | Completed)
                | (Cancelled, Proposed)
        )
    }

    /// Whether moving from `self` to `next` hands the instances over.
    pub fn completes_exchange(&self, next: TradeStatus) -> bool {
        matches!(self, TradeStatus::Pending | TradeStatus::Accepted)
            && next == TradeStatus::Completed
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for TradeStatus {
    type Err = TradeStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid trade status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeStatusParseError(pub String);

impl fmt::Display for TradeStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid trade status: {}", self.0)
    }
}

impl std::error::Error for TradeStatusParseError {}

// ============================================================================
// FRIENDSHIP LEVEL
// ============================================================================

/// Friendship tier between the two trading players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FriendshipLevel {
    #[default]
    Good,
    Great,
    Ultra,
    Best,
}

impl FriendshipLevel {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            FriendshipLevel::Good => "Good",
            FriendshipLevel::Great => "Great",
            FriendshipLevel::Ultra => "Ultra",
            FriendshipLevel::Best => "Best",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, FriendshipLevelParseError> {
        match s.trim() {
            "Good" => Ok(FriendshipLevel::Good),
            "Great" => Ok(FriendshipLevel::Great),
            "Ultra" => Ok(FriendshipLevel::Ultra),
            "Best" => Ok(FriendshipLevel::Best),
            _ => Err(FriendshipLevelParseError(s.to_string())),
        }
    }
}

impl fmt::Display for FriendshipLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for FriendshipLevel {
    type Err = FriendshipLevelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid friendship level string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendshipLevelParseError(pub String);

impl fmt::Display for FriendshipLevelParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid friendship level: {}", self.0)
    }
}

impl std::error::Error for FriendshipLevelParseError {}

// ============================================================================
// TAG PARENT
// ============================================================================

/// The list a tag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagParent {
    Caught,
    Trade,
    Wanted,
}

impl TagParent {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TagParent::Caught => "caught",
            TagParent::Trade => "trade",
            TagParent::Wanted => "wanted",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, TagParentParseError> {
        match s.to_lowercase().as_str() {
            "caught" => Ok(TagParent::Caught),
            "trade" => Ok(TagParent::Trade),
            "wanted" => Ok(TagParent::Wanted),
            _ => Err(TagParentParseError(s.to_string())),
        }
    }
}

impl fmt::Display for TagParent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for TagParent {
    type Err = TagParentParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid tag parent string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagParentParseError(pub String);

impl fmt::Display for TagParentParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid tag parent: {}", self.0)
    }
}

impl std::error::Error for TagParentParseError {}
