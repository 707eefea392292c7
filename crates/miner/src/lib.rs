//! Block template assembly for mining on top of the chain state.

pub mod assembler;

pub use assembler::{create_new_block, solve_block, BlockTemplate, MinerError};
