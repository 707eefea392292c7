//! Memoization of successful signature checks.
//!
//! Re-validating an already-accepted transaction (mempool admission
//! followed by block connection, or block re-assembly during a reorg)
//! must not repeat the expensive curve operation. Entries are keyed by
//! the signed input identity and the exact signature material, so a hit
//! is as strong as a fresh verification.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use basaltd_consensus::Hash256;
use basaltd_primitives::hash::sha256;

pub const DEFAULT_SIGCACHE_CAPACITY: usize = 100_000;

struct Inner {
    entries: HashSet<Hash256>,
    order: VecDeque<Hash256>,
    capacity: usize,
}

pub struct SignatureCache {
    inner: Mutex<Inner>,
}

impl Default for SignatureCache {
    fn default() -> Self {
        Self::new(DEFAULT_SIGCACHE_CAPACITY)
    }
}

impl SignatureCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashSet::new(),
                order: VecDeque::new(),
                capacity,
            }),
        }
    }

    /// Cache key over (txid, input index, script hash) plus the raw
    /// signature and public key bytes.
    pub fn entry_key(
        txid: &Hash256,
        input_index: u32,
        script_code: &[u8],
        signature: &[u8],
        pubkey: &[u8],
    ) -> Hash256 {
        let script_hash = sha256(script_code);
        let mut preimage =
            Vec::with_capacity(32 + 4 + 32 + signature.len() + pubkey.len());
        preimage.extend_from_slice(txid);
        preimage.extend_from_slice(&input_index.to_le_bytes());
        preimage.extend_from_slice(&script_hash);
        preimage.extend_from_slice(signature);
        preimage.extend_from_slice(pubkey);
        sha256(&preimage)
    }

    pub fn contains(&self, key: &Hash256) -> bool {
        match self.inner.lock() {
            Ok(inner) => inner.entries.contains(key),
            Err(_) => false,
        }
    }

    pub fn insert(&self, key: Hash256) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if inner.capacity == 0 || !inner.entries.insert(key) {
            return;
        }
        inner.order.push_back(key);
        while inner.entries.len() > inner.capacity {
            let Some(evicted) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&evicted);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_hit() {
        let cache = SignatureCache::new(16);
        let key = SignatureCache::entry_key(&[9u8; 32], 0, &[0x51], &[1, 2], &[3, 4]);
        assert!(!cache.contains(&key));
        cache.insert(key);
        assert!(cache.contains(&key));
    }

    #[test]
    fn distinct_inputs_get_distinct_keys() {
        let a = SignatureCache::entry_key(&[9u8; 32], 0, &[0x51], &[1], &[2]);
        let b = SignatureCache::entry_key(&[9u8; 32], 1, &[0x51], &[1], &[2]);
        assert_ne!(a, b);
    }

    #[test]
    fn capacity_is_bounded() {
        let cache = SignatureCache::new(4);
        for index in 0u8..32 {
            cache.insert(SignatureCache::entry_key(
                &[index; 32],
                0,
                &[],
                &[],
                &[],
            ));
        }
        assert!(cache.len() <= 4);
    }
}
