//! Consensus constants, chain parameters and money helpers.

pub mod constants;
pub mod money;
pub mod params;

pub use money::{money_range, COIN, MAX_MONEY};
pub use params::{chain_params, ChainParams, ConsensusParams, Network, TieBreak};

/// A 256-bit hash in internal byte order.
pub type Hash256 = [u8; 32];

pub fn hash256_from_hex(hex: &str) -> Option<Hash256> {
    if hex.len() != 64 {
        return None;
    }
    let mut out = [0u8; 32];
    let bytes = hex.as_bytes();
    for (index, chunk) in bytes.chunks(2).enumerate() {
        let high = (chunk[0] as char).to_digit(16)? as u8;
        let low = (chunk[1] as char).to_digit(16)? as u8;
        // Hex is displayed big-endian, internal order is reversed.
        out[31 - index] = high << 4 | low;
    }
    Some(out)
}

pub fn hash256_to_hex(hash: &Hash256) -> String {
    let mut out = String::with_capacity(64);
    for byte in hash.iter().rev() {
        out.push(char::from_digit((byte >> 4) as u32, 16).unwrap_or('0'));
        out.push(char::from_digit((byte & 0x0f) as u32, 16).unwrap_or('0'));
    }
    out
}

/// Block subsidy at the given height, halving on the configured interval.
pub fn block_subsidy(height: i32, params: &ConsensusParams) -> i64 {
    let halvings = height / params.subsidy_halving_interval;
    if halvings >= 64 {
        return 0;
    }
    (50 * COIN) >> halvings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trips_internal_order() {
        let hex = "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f";
        let hash = hash256_from_hex(hex).expect("valid hex");
        assert_eq!(hash[31], 0x00);
        assert_eq!(hash[0], 0x6f);
        assert_eq!(hash256_to_hex(&hash), hex);
    }

    #[test]
    fn subsidy_halves_on_schedule() {
        let params = chain_params(Network::Regtest).consensus;
        assert_eq!(block_subsidy(0, &params), 50 * COIN);
        assert_eq!(block_subsidy(params.subsidy_halving_interval, &params), 25 * COIN);
        assert_eq!(block_subsidy(params.subsidy_halving_interval * 64, &params), 0);
    }
}
