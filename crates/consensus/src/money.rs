//! Monetary amounts and range checks.

/// One coin in base units.
pub const COIN: i64 = 100_000_000;
/// No amount larger than this is valid in a transaction or the coin set.
pub const MAX_MONEY: i64 = 21_000_000 * COIN;

pub fn money_range(value: i64) -> bool {
    (0..=MAX_MONEY).contains(&value)
}
