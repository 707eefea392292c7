//! Transaction digests covered by input signatures.

use basaltd_consensus::Hash256;
use basaltd_primitives::encoding::Encoder;
use basaltd_primitives::hash::sha256d;
use basaltd_primitives::transaction::Transaction;

/// The only hash type the engine accepts; every input commits to the
/// whole transaction.
pub const SIGHASH_ALL: u8 = 0x01;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SighashError {
    InputIndexOutOfRange,
    UnsupportedHashType(u8),
}

impl std::fmt::Display for SighashError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SighashError::InputIndexOutOfRange => write!(f, "input index out of range"),
            SighashError::UnsupportedHashType(hash_type) => {
                write!(f, "unsupported sighash type {hash_type:#04x}")
            }
        }
    }
}

impl std::error::Error for SighashError {}

/// Legacy signature hash: the transaction serialized with every input
/// script blanked except the signed input, which carries the script
/// code, followed by the hash type.
pub fn signature_hash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    hash_type: u8,
) -> Result<Hash256, SighashError> {
    if input_index >= tx.vin.len() {
        return Err(SighashError::InputIndexOutOfRange);
    }
    if hash_type != SIGHASH_ALL {
        return Err(SighashError::UnsupportedHashType(hash_type));
    }

    let mut encoder = Encoder::with_capacity(tx.serialized_size() + script_code.len() + 4);
    encoder.write_i32_le(tx.version);
    encoder.write_var_int(tx.vin.len() as u64);
    for (index, input) in tx.vin.iter().enumerate() {
        input.prevout.encode_to(&mut encoder);
        if index == input_index {
            encoder.write_var_bytes(script_code);
        } else {
            encoder.write_var_bytes(&[]);
        }
        encoder.write_u32_le(input.sequence);
    }
    encoder.write_var_int(tx.vout.len() as u64);
    for output in &tx.vout {
        encoder.write_i64_le(output.value);
        encoder.write_var_bytes(&output.script_pubkey);
    }
    encoder.write_u32_le(tx.lock_time);
    encoder.write_u32_le(u32::from(hash_type));
    Ok(sha256d(&encoder.into_inner()))
}
