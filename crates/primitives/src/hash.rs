//! Consensus hashing helpers.

use basaltd_consensus::Hash256;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

pub fn sha256(data: &[u8]) -> Hash256 {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

pub fn sha256d(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let digest = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}

/// Merkle root over transaction ids, duplicating the last node of odd
/// levels.
pub fn merkle_root(txids: &[Hash256]) -> Hash256 {
    if txids.is_empty() {
        return [0u8; 32];
    }
    let mut level: Vec<Hash256> = txids.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let left = pair[0];
            let right = if pair.len() == 2 { pair[1] } else { pair[0] };
            let mut concat = [0u8; 64];
            concat[..32].copy_from_slice(&left);
            concat[32..].copy_from_slice(&right);
            next.push(sha256d(&concat));
        }
        level = next;
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256d_known_vector() {
        // sha256d("") per the reference test vectors.
        let digest = sha256d(b"");
        assert_eq!(
            digest[..4],
            [0x5d, 0xf6, 0xe0, 0xe2],
            "sha256d empty-input prefix mismatch"
        );
    }

    #[test]
    fn merkle_of_single_txid_is_identity() {
        let txid = sha256d(b"tx");
        assert_eq!(merkle_root(&[txid]), txid);
    }

    #[test]
    fn merkle_duplicates_odd_tail() {
        let a = sha256d(b"a");
        let b = sha256d(b"b");
        let c = sha256d(b"c");
        let root_odd = merkle_root(&[a, b, c]);
        let root_dup = merkle_root(&[a, b, c, c]);
        assert_eq!(root_odd, root_dup);
    }
}
