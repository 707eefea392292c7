//! Chain state: block index, coin set, validation and best-chain selection.

pub mod blockindex;
pub mod chain;
pub mod coins;
pub mod state;
pub mod undo;
pub mod validation;

pub use blockindex::{BlockIndex, BlockIndexEntry, BlockStatus, Handle};
pub use coins::{Coin, CoinsCache, CoinsDb, CoinsError, CoinsView};
pub use state::{
    genesis_block, ChainState, ChainStateError, ChainUpdate, NextBlockContext, TipInfo,
};
pub use validation::ValidationError;
