//! Consensus-wide constants shared across validation.

/// The minimum allowed block version (network rule).
pub const MIN_BLOCK_VERSION: i32 = 1;
/// The minimum allowed transaction version (network rule).
pub const MIN_TX_VERSION: i32 = 1;
/// The maximum allowed size for a single script element, in bytes.
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;
/// The maximum allowed size of a locking or unlocking script, in bytes.
pub const MAX_SCRIPT_SIZE: usize = 10_000;
/// Coinbase scriptSig size bounds (network rule).
pub const MIN_COINBASE_SCRIPT_SIZE: usize = 2;
pub const MAX_COINBASE_SCRIPT_SIZE: usize = 100;
/// Blocks with a timestamp further than this ahead of adjusted time are rejected.
pub const MAX_FUTURE_BLOCK_TIME: i64 = 2 * 60 * 60;
/// Window size for the median-time-past calculation.
pub const MEDIAN_TIME_SPAN: usize = 11;
/// Lock times below this threshold are block heights, above it unix times.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;
/// Sequence value that opts an input out of lock-time enforcement.
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;
