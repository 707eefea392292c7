//! Script verification, sighash and the signature cache.

pub mod interpreter;
pub mod opcodes;
pub mod sigcache;
pub mod sighash;
pub mod standard;

pub use interpreter::{
    count_sigops, decode_script_num, encode_script_num, verify_script, ScriptError,
};
pub use sigcache::SignatureCache;
pub use sighash::{signature_hash, SIGHASH_ALL};
