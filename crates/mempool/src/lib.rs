//! Fee-indexed transaction pool with package accounting, replacement
//! and eviction.

pub mod accept;
pub mod entry;
pub mod pool;

pub use accept::{accept_to_memory_pool, update_for_reorg, MempoolError};
pub use entry::{FeeRate, MempoolEntry};
pub use pool::{Mempool, MempoolConfig, PackageLimit};
