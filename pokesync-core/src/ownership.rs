//! Ownership flag normalization
//!
//! A collectible instance carries five intent flags that producers set
//! independently. `normalize` folds any combination into a consistent one:
//!
//! - `!is_caught => !is_for_trade`
//! - `is_caught && is_wanted && !is_for_trade` flips to wanted-only (registered)
//! - `is_caught && is_for_trade && is_wanted => !is_wanted`
//! - `is_caught => registered`
//! - `most_wanted => is_wanted`
//!
//! Rules are applied once, in that order; the output is a fixed point.

use serde::{Deserialize, Serialize};

/// The five ownership/intent flags of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct OwnershipFlags {
    pub is_caught: bool,
    pub is_wanted: bool,
    pub is_for_trade: bool,
    pub registered: bool,
    pub most_wanted: bool,
}

impl OwnershipFlags {
    pub fn new(
        is_caught: bool,
        is_wanted: bool,
        is_for_trade: bool,
        registered: bool,
        most_wanted: bool,
    ) -> Self {
        Self {
            is_caught,
            is_wanted,
            is_for_trade,
            registered,
            most_wanted,
        }
    }

    /// Return the normalized combination.
    pub fn normalized(self) -> Self {
        let (is_caught, is_wanted, is_for_trade, registered, most_wanted) = normalize(
            self.is_caught,
            self.is_wanted,
            self.is_for_trade,
            self.registered,
            self.most_wanted,
        );
        Self {
            is_caught,
            is_wanted,
            is_for_trade,
            registered,
            most_wanted,
        }
    }

    /// Caught, wanted and for-trade are all false: the instance should not exist.
    pub fn is_unowned(&self) -> bool {
        !self.is_caught && !self.is_wanted && !self.is_for_trade
    }

    /// Whether this instance counts toward the registration ledger.
    pub fn counts_as_registered(&self) -> bool {
        self.is_caught || self.registered
    }

    /// All 32 flag combinations, in binary counting order.
    pub fn all_combinations() -> impl Iterator<Item = OwnershipFlags> {
        (0u8..32).map(|bits| OwnershipFlags {
            is_caught: bits & 0b10000 != 0,
            is_wanted: bits & 0b01000 != 0,
            is_for_trade: bits & 0b00100 != 0,
            registered: bits & 0b00010 != 0,
            most_wanted: bits & 0b00001 != 0,
        })
    }
}

/// Normalize the five ownership flags.
///
/// Pure and total over every input; `normalize(normalize(x)) == normalize(x)`.
/// Returns `(is_caught, is_wanted, is_for_trade, registered, most_wanted)`.
pub fn normalize(
    mut is_caught: bool,
    mut is_wanted: bool,
    mut is_for_trade: bool,
    mut registered: bool,
    mut most_wanted: bool,
) -> (bool, bool, bool, bool, bool) {
    if !is_caught && is_for_trade {
        is_for_trade = false;
    }
    if is_caught && is_wanted && !is_for_trade {
        is_caught = false;
        registered = true;
    }
    if is_caught && is_for_trade && is_wanted {
        is_wanted = false;
    }
    if is_caught && !registered {
        registered = true;
    }
    if most_wanted && !is_wanted {
        most_wanted = false;
    }
    (is_caught, is_wanted, is_for_trade, registered, most_wanted)
}
