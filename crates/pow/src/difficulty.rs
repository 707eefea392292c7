//! Compact difficulty encoding and proof checks.

use basaltd_consensus::Hash256;
use primitive_types::U256;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PowError {
    /// The compact target is negative, zero or overflows 256 bits.
    InvalidTarget,
    /// The declared target is easier than the network's pow limit.
    TargetAboveLimit,
    /// The block hash does not meet the declared target.
    HighHash,
}

impl std::fmt::Display for PowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowError::InvalidTarget => write!(f, "invalid compact target"),
            PowError::TargetAboveLimit => write!(f, "target above pow limit"),
            PowError::HighHash => write!(f, "hash above target"),
        }
    }
}

impl std::error::Error for PowError {}

/// Expand compact "bits" into a 256-bit target.
///
/// Returns `None` for negative, zero or overflowing encodings, matching
/// the consensus rule that such headers are invalid.
pub fn compact_to_target(bits: u32) -> Option<U256> {
    let exponent = (bits >> 24) as usize;
    let mantissa = bits & 0x007f_ffff;
    if bits & 0x0080_0000 != 0 {
        return None;
    }
    if mantissa == 0 {
        return None;
    }
    let target = if exponent <= 3 {
        U256::from(mantissa >> (8 * (3 - exponent)))
    } else {
        let shift = 8 * (exponent - 3);
        if shift > 255 {
            return None;
        }
        let value = U256::from(mantissa);
        let shifted = value << shift;
        // Detect overflow: shifting back must restore the mantissa.
        if shifted >> shift != value {
            return None;
        }
        shifted
    };
    if target.is_zero() {
        return None;
    }
    Some(target)
}

/// Compress a target back into compact form.
pub fn target_to_compact(target: U256) -> u32 {
    let mut size = (target.bits() + 7) / 8;
    let mut compact = if size <= 3 {
        (target.low_u64() << (8 * (3 - size))) as u32
    } else {
        let shifted = target >> (8 * (size - 3));
        shifted.low_u32()
    };
    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }
    compact | ((size as u32) << 24)
}

/// Check a block hash against its declared compact target and the
/// network pow limit.
pub fn check_proof_of_work(
    hash: &Hash256,
    bits: u32,
    pow_limit_bits: u32,
) -> Result<(), PowError> {
    let target = compact_to_target(bits).ok_or(PowError::InvalidTarget)?;
    let limit = compact_to_target(pow_limit_bits).ok_or(PowError::InvalidTarget)?;
    if target > limit {
        return Err(PowError::TargetAboveLimit);
    }
    let hash_value = U256::from_little_endian(hash);
    if hash_value > target {
        return Err(PowError::HighHash);
    }
    Ok(())
}

/// Work contributed by a block with the given compact target:
/// `2^256 / (target + 1)`, computed as `(~target / (target + 1)) + 1`.
pub fn block_proof(bits: u32) -> U256 {
    let Some(target) = compact_to_target(bits) else {
        return U256::zero();
    };
    (!target / (target + U256::one())) + U256::one()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_round_trip() {
        for bits in [0x1d00_ffffu32, 0x207f_ffff, 0x1b04_864c] {
            let target = compact_to_target(bits).expect("valid bits");
            assert_eq!(target_to_compact(target), bits);
        }
    }

    #[test]
    fn compact_rejects_negative_and_zero() {
        assert_eq!(compact_to_target(0x0180_0000), None);
        assert_eq!(compact_to_target(0x0000_0000), None);
        assert_eq!(compact_to_target(0x0400_0000), None);
    }

    #[test]
    fn compact_rejects_overflow() {
        assert_eq!(compact_to_target(0xff00_ffff), None);
    }

    #[test]
    fn pow_check_boundary() {
        let bits = 0x207f_ffff;
        let target = compact_to_target(bits).expect("valid bits");
        let mut at_target = [0u8; 32];
        target.to_little_endian(&mut at_target);
        assert_eq!(check_proof_of_work(&at_target, bits, bits), Ok(()));

        let above = target + U256::one();
        let mut above_bytes = [0u8; 32];
        above.to_little_endian(&mut above_bytes);
        assert_eq!(
            check_proof_of_work(&above_bytes, bits, bits),
            Err(PowError::HighHash)
        );
    }

    #[test]
    fn declared_target_must_meet_limit() {
        // Main-style limit, header declares something easier.
        let result = check_proof_of_work(&[0u8; 32], 0x207f_ffff, 0x1d00_ffff);
        assert_eq!(result, Err(PowError::TargetAboveLimit));
    }

    #[test]
    fn harder_target_means_more_work() {
        assert!(block_proof(0x1d00_ffff) > block_proof(0x207f_ffff));
        assert!(block_proof(0x207f_ffff) >= U256::one());
    }
}
