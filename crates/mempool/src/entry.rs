//! Mempool entries and fee rates.

use std::collections::HashSet;
use std::sync::Arc;

use basaltd_chainstate::validation::transaction_sigops;
use basaltd_consensus::Hash256;
use basaltd_primitives::transaction::Transaction;

/// Satoshis per thousand bytes of serialized transaction.
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub struct FeeRate(i64);

impl FeeRate {
    pub const ZERO: FeeRate = FeeRate(0);

    pub fn from_sat_per_kb(sat_per_kb: i64) -> Self {
        Self(sat_per_kb)
    }

    /// Rate paid by `fee` over `size` bytes, rounded down.
    pub fn from_fee_size(fee: i64, size: usize) -> Self {
        if size == 0 {
            return Self(0);
        }
        Self(fee.saturating_mul(1_000) / size as i64)
    }

    pub fn sat_per_kb(self) -> i64 {
        self.0
    }

    /// Fee this rate charges for `size` bytes, rounded up so paying it
    /// always meets the rate.
    pub fn fee_for(self, size: usize) -> i64 {
        let fee = self.0.saturating_mul(size as i64) / 1_000;
        if self.0.saturating_mul(size as i64) % 1_000 != 0 {
            fee + 1
        } else {
            fee
        }
    }

    pub fn halved(self) -> Self {
        Self(self.0 / 2)
    }
}

/// A transaction waiting in the pool, with cached package aggregates.
///
/// Ancestor figures include the entry itself and every unconfirmed
/// ancestor; descendant figures include the entry and everything that
/// depends on it. The pool keeps both current on every mutation.
#[derive(Clone, Debug)]
pub struct MempoolEntry {
    pub(crate) tx: Arc<Transaction>,
    pub(crate) txid: Hash256,
    pub(crate) fee: i64,
    pub(crate) size: usize,
    pub(crate) sigop_cost: u32,
    /// Unix time the entry was accepted.
    pub(crate) time: i64,
    /// Tip height at acceptance.
    pub(crate) height: i32,
    pub(crate) parents: HashSet<Hash256>,
    pub(crate) children: HashSet<Hash256>,
    pub(crate) ancestor_count: usize,
    pub(crate) ancestor_size: usize,
    pub(crate) ancestor_fees: i64,
    pub(crate) descendant_count: usize,
    pub(crate) descendant_size: usize,
    pub(crate) descendant_fees: i64,
}

impl MempoolEntry {
    pub(crate) fn new(
        tx: Arc<Transaction>,
        txid: Hash256,
        fee: i64,
        time: i64,
        height: i32,
        parents: HashSet<Hash256>,
    ) -> Self {
        let size = tx.serialized_size();
        let sigop_cost = transaction_sigops(&tx);
        Self {
            tx,
            txid,
            fee,
            size,
            sigop_cost,
            time,
            height,
            parents,
            children: HashSet::new(),
            ancestor_count: 1,
            ancestor_size: size,
            ancestor_fees: fee,
            descendant_count: 1,
            descendant_size: size,
            descendant_fees: fee,
        }
    }

    pub fn tx(&self) -> &Arc<Transaction> {
        &self.tx
    }

    pub fn txid(&self) -> Hash256 {
        self.txid
    }

    pub fn fee(&self) -> i64 {
        self.fee
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn sigop_cost(&self) -> u32 {
        self.sigop_cost
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn parents(&self) -> &HashSet<Hash256> {
        &self.parents
    }

    pub fn children(&self) -> &HashSet<Hash256> {
        &self.children
    }

    pub fn ancestor_count(&self) -> usize {
        self.ancestor_count
    }

    pub fn ancestor_size(&self) -> usize {
        self.ancestor_size
    }

    pub fn ancestor_fees(&self) -> i64 {
        self.ancestor_fees
    }

    pub fn descendant_count(&self) -> usize {
        self.descendant_count
    }

    pub fn descendant_size(&self) -> usize {
        self.descendant_size
    }

    pub fn descendant_fees(&self) -> i64 {
        self.descendant_fees
    }

    pub fn fee_rate(&self) -> FeeRate {
        FeeRate::from_fee_size(self.fee, self.size)
    }

    /// Rate of the entry together with all its unconfirmed ancestors.
    pub fn ancestor_fee_rate(&self) -> FeeRate {
        FeeRate::from_fee_size(self.ancestor_fees, self.ancestor_size)
    }

    /// Rate of the entry together with everything depending on it.
    pub fn descendant_fee_rate(&self) -> FeeRate {
        FeeRate::from_fee_size(self.descendant_fees, self.descendant_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_rate_rounding() {
        let rate = FeeRate::from_fee_size(1_500, 1_000);
        assert_eq!(rate.sat_per_kb(), 1_500);
        // 1500 sat/kb over 250 bytes: 375 exactly.
        assert_eq!(rate.fee_for(250), 375);
        // Exact product, no rounding.
        assert_eq!(FeeRate::from_sat_per_kb(1_000).fee_for(333), 333);
        // Rounds up when inexact.
        assert_eq!(FeeRate::from_sat_per_kb(1_001).fee_for(333), 334);
        assert_eq!(FeeRate::from_fee_size(100, 0), FeeRate::ZERO);
    }

    #[test]
    fn fee_rate_ordering() {
        assert!(FeeRate::from_sat_per_kb(2_000) > FeeRate::from_sat_per_kb(1_999));
        assert!(FeeRate::from_fee_size(1_000, 500) > FeeRate::from_fee_size(1_000, 501));
    }
}
