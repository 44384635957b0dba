//! Name-system consensus constants.

use crate::money::{Amount, COIN};

/// Maximum length in bytes of a registered name.
pub const MAX_NAME_LENGTH: usize = 10;

/// Maximum length in bytes of a name's value payload.
pub const MAX_VALUE_LENGTH: usize = 1023;

/// Number of confirmations a pre-commitment needs before it can be revealed.
pub const MIN_FIRSTUPDATE_DEPTH: u32 = 2;

/// Minimum amount that has to be locked into any name output.
pub const NAMENEW_COIN_AMOUNT: Amount = COIN / 100;

/// Height sentinel for coins that only exist in the transaction pool.
pub const MEMPOOL_HEIGHT: u32 = 0x7FFF_FFFF;

/// Size in bytes of a pre-commitment hash (hash160 of rand || name).
pub const NAMENEW_HASH_LENGTH: usize = 20;

/// Maximum size in bytes of the salt revealed by a first update.
pub const MAX_RAND_LENGTH: usize = 20;
