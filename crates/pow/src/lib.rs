//! Proof-of-work target arithmetic and verification.

pub mod difficulty;

pub use difficulty::{block_proof, check_proof_of_work, compact_to_target, target_to_compact, PowError};
