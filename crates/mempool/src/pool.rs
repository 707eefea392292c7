//! The transaction pool: spend index, package aggregates, eviction,
//! expiry and the rolling minimum fee.

use std::collections::{HashMap, HashSet, VecDeque};

use basaltd_chainstate::Coin;
use basaltd_consensus::Hash256;
use basaltd_primitives::outpoint::OutPoint;
use basaltd_primitives::transaction::Transaction;
use tracing::debug;

use crate::entry::{FeeRate, MempoolEntry};

/// Rolling minimum fee halves this often once eviction has raised it.
const ROLLING_FEE_HALFLIFE: i64 = 60 * 60 * 12;

#[derive(Clone, Debug)]
pub struct MempoolConfig {
    /// Total serialized size the pool may hold before evicting.
    pub max_size_bytes: usize,
    /// Entries older than this are dropped by `expire`.
    pub expiry_secs: i64,
    /// Floor below which transactions are not accepted at all.
    pub min_relay_feerate: FeeRate,
    /// Extra rate a replacement or post-eviction entry must add.
    pub incremental_feerate: FeeRate,
    /// Whether a conflicting spend may replace pool entries by fee.
    pub replace_by_fee: bool,
    pub max_ancestors: usize,
    pub max_ancestor_size: usize,
    pub max_descendants: usize,
    pub max_descendant_size: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 300_000_000,
            expiry_secs: 336 * 60 * 60,
            min_relay_feerate: FeeRate::from_sat_per_kb(1_000),
            incremental_feerate: FeeRate::from_sat_per_kb(1_000),
            replace_by_fee: true,
            max_ancestors: 25,
            max_ancestor_size: 101_000,
            max_descendants: 25,
            max_descendant_size: 101_000,
        }
    }
}

/// Package limit violations found while walking ancestors.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PackageLimit {
    TooManyAncestors,
    AncestorSizeExceeded,
    TooManyDescendants,
    DescendantSizeExceeded,
}

pub struct Mempool {
    config: MempoolConfig,
    entries: HashMap<Hash256, MempoolEntry>,
    /// Which pool transaction spends each outpoint.
    by_prevout: HashMap<OutPoint, Hash256>,
    total_size: usize,
    rolling_min_fee: FeeRate,
    last_rolling_update: i64,
}

impl Mempool {
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            by_prevout: HashMap::new(),
            total_size: 0,
            rolling_min_fee: FeeRate::ZERO,
            last_rolling_update: 0,
        }
    }

    pub fn config(&self) -> &MempoolConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn contains(&self, txid: &Hash256) -> bool {
        self.entries.contains_key(txid)
    }

    pub fn get(&self, txid: &Hash256) -> Option<&MempoolEntry> {
        self.entries.get(txid)
    }

    pub fn entries(&self) -> impl Iterator<Item = &MempoolEntry> {
        self.entries.values()
    }

    /// The pool transaction spending this outpoint, if any.
    pub fn spender_of(&self, outpoint: &OutPoint) -> Option<Hash256> {
        self.by_prevout.get(outpoint).copied()
    }

    /// An unconfirmed output usable as a coin by a child transaction.
    pub fn unconfirmed_coin(&self, outpoint: &OutPoint, height: i32) -> Option<Coin> {
        let entry = self.entries.get(&outpoint.txid)?;
        let output = entry.tx.vout.get(outpoint.vout as usize)?;
        Some(Coin {
            value: output.value,
            script_pubkey: output.script_pubkey.clone(),
            height: height as u32,
            is_coinbase: false,
        })
    }

    /// All in-pool ancestors of a transaction with the given direct
    /// parents, checked against the package limits for an addition of
    /// `size` bytes.
    pub fn calc_ancestors(
        &self,
        parents: &HashSet<Hash256>,
        size: usize,
    ) -> Result<HashSet<Hash256>, PackageLimit> {
        let mut ancestors: HashSet<Hash256> = HashSet::new();
        let mut queue: VecDeque<Hash256> = parents.iter().copied().collect();
        let mut total_size = size;
        while let Some(txid) = queue.pop_front() {
            let Some(entry) = self.entries.get(&txid) else {
                continue;
            };
            if !ancestors.insert(txid) {
                continue;
            }
            total_size += entry.size;
            if ancestors.len() + 1 > self.config.max_ancestors {
                return Err(PackageLimit::TooManyAncestors);
            }
            if total_size > self.config.max_ancestor_size {
                return Err(PackageLimit::AncestorSizeExceeded);
            }
            if entry.descendant_count + 1 > self.config.max_descendants {
                return Err(PackageLimit::TooManyDescendants);
            }
            if entry.descendant_size + size > self.config.max_descendant_size {
                return Err(PackageLimit::DescendantSizeExceeded);
            }
            for parent in &entry.parents {
                queue.push_back(*parent);
            }
        }
        Ok(ancestors)
    }

    /// Transitive in-pool ancestors of an existing entry, itself
    /// excluded.
    pub fn ancestors_of(&self, txid: &Hash256) -> HashSet<Hash256> {
        let mut ancestors = HashSet::new();
        let mut queue: VecDeque<Hash256> = match self.entries.get(txid) {
            Some(entry) => entry.parents.iter().copied().collect(),
            None => return ancestors,
        };
        while let Some(current) = queue.pop_front() {
            if !ancestors.insert(current) {
                continue;
            }
            if let Some(entry) = self.entries.get(&current) {
                for parent in &entry.parents {
                    queue.push_back(*parent);
                }
            }
        }
        ancestors
    }

    /// The given entries plus every transaction depending on them.
    pub fn with_descendants(&self, roots: &HashSet<Hash256>) -> HashSet<Hash256> {
        let mut all = HashSet::new();
        let mut queue: VecDeque<Hash256> = roots.iter().copied().collect();
        while let Some(txid) = queue.pop_front() {
            if !all.insert(txid) {
                continue;
            }
            if let Some(entry) = self.entries.get(&txid) {
                for child in &entry.children {
                    queue.push_back(*child);
                }
            }
        }
        all
    }

    /// Link and account a fully validated entry. `ancestors` must be
    /// the set returned by `calc_ancestors` for the same parents.
    pub(crate) fn insert_entry(&mut self, mut entry: MempoolEntry, ancestors: &HashSet<Hash256>) {
        for ancestor_id in ancestors {
            if let Some(ancestor) = self.entries.get_mut(ancestor_id) {
                ancestor.descendant_count += 1;
                ancestor.descendant_size += entry.size;
                ancestor.descendant_fees += entry.fee;
                entry.ancestor_count += 1;
                entry.ancestor_size += ancestor.size;
                entry.ancestor_fees += ancestor.fee;
            }
        }
        let txid = entry.txid;
        for parent in entry.parents.clone() {
            if let Some(parent_entry) = self.entries.get_mut(&parent) {
                parent_entry.children.insert(txid);
            }
        }
        for input in &entry.tx.vin {
            self.by_prevout.insert(input.prevout, txid);
        }
        self.total_size += entry.size;
        self.entries.insert(txid, entry);
    }

    /// Remove an entry and everything that depends on it. Returns the
    /// removed entries.
    pub fn remove_subtree(&mut self, txid: &Hash256) -> Vec<MempoolEntry> {
        let mut roots = HashSet::new();
        roots.insert(*txid);
        let removed_set = self.with_descendants(&roots);
        self.adjust_survivors(&removed_set);
        let mut removed = Vec::with_capacity(removed_set.len());
        for id in &removed_set {
            if let Some(entry) = self.unlink(id) {
                removed.push(entry);
            }
        }
        removed
    }

    /// Remove one confirmed transaction, leaving its descendants in the
    /// pool with adjusted ancestor figures.
    fn remove_confirmed(&mut self, txid: &Hash256) {
        let Some(entry) = self.entries.get(txid) else {
            return;
        };
        let fee = entry.fee;
        let size = entry.size;
        let descendants: Vec<Hash256> = {
            let mut roots = HashSet::new();
            roots.insert(*txid);
            self.with_descendants(&roots)
                .into_iter()
                .filter(|id| id != txid)
                .collect()
        };
        for id in descendants {
            if let Some(descendant) = self.entries.get_mut(&id) {
                descendant.ancestor_count -= 1;
                descendant.ancestor_size -= size;
                descendant.ancestor_fees -= fee;
            }
        }
        let mut only = HashSet::new();
        only.insert(*txid);
        self.adjust_survivors(&only);
        self.unlink(txid);
    }

    /// Subtract every member of `removed_set` from the descendant
    /// figures of its ancestors outside the set. Walks the still-intact
    /// graph, so it must run before any entry is unlinked.
    fn adjust_survivors(&mut self, removed_set: &HashSet<Hash256>) {
        let mut losses: HashMap<Hash256, (usize, usize, i64)> = HashMap::new();
        for id in removed_set {
            let Some((size, fee)) = self.entries.get(id).map(|entry| (entry.size, entry.fee))
            else {
                continue;
            };
            for ancestor_id in self.ancestors_of(id) {
                if removed_set.contains(&ancestor_id) {
                    continue;
                }
                let loss = losses.entry(ancestor_id).or_default();
                loss.0 += 1;
                loss.1 += size;
                loss.2 += fee;
            }
        }
        for (ancestor_id, (count, size, fees)) in losses {
            if let Some(ancestor) = self.entries.get_mut(&ancestor_id) {
                ancestor.descendant_count -= count;
                ancestor.descendant_size -= size;
                ancestor.descendant_fees -= fees;
            }
        }
    }

    /// Pull `txid` out of the maps and sever its parent/child links.
    /// Aggregate accounting is the caller's responsibility.
    fn unlink(&mut self, txid: &Hash256) -> Option<MempoolEntry> {
        let entry = self.entries.remove(txid)?;
        self.total_size -= entry.size;
        for input in &entry.tx.vin {
            self.by_prevout.remove(&input.prevout);
        }
        for parent in &entry.parents {
            if let Some(parent_entry) = self.entries.get_mut(parent) {
                parent_entry.children.remove(txid);
            }
        }
        for child in &entry.children {
            if let Some(child_entry) = self.entries.get_mut(child) {
                child_entry.parents.remove(txid);
            }
        }
        Some(entry)
    }

    /// Drop everything a connected block confirmed or conflicted with.
    pub fn remove_for_block(&mut self, transactions: &[Transaction]) {
        for tx in transactions {
            let txid = tx.txid();
            if self.entries.contains_key(&txid) {
                self.remove_confirmed(&txid);
                continue;
            }
            // A different spender of the same output is now invalid,
            // along with its descendants.
            for input in &tx.vin {
                if let Some(conflict) = self.spender_of(&input.prevout) {
                    self.remove_subtree(&conflict);
                }
            }
        }
    }

    /// Drop entries older than the configured expiry, with descendants.
    pub fn expire(&mut self, now: i64) -> usize {
        let cutoff = now - self.config.expiry_secs;
        let stale: Vec<Hash256> = self
            .entries
            .values()
            .filter(|entry| entry.time < cutoff)
            .map(|entry| entry.txid)
            .collect();
        let mut removed = 0;
        for txid in stale {
            removed += self.remove_subtree(&txid).len();
        }
        if removed > 0 {
            debug!(removed, "expired mempool entries");
        }
        removed
    }

    /// Evict lowest-value packages until the pool fits, raising the
    /// rolling minimum fee past what was evicted.
    pub fn trim_to_size(&mut self, now: i64) -> Vec<MempoolEntry> {
        let mut evicted = Vec::new();
        while self.total_size > self.config.max_size_bytes {
            let Some(worst) = self
                .entries
                .values()
                .min_by(|a, b| {
                    a.descendant_fee_rate()
                        .cmp(&b.descendant_fee_rate())
                        .then_with(|| a.txid.cmp(&b.txid))
                })
                .map(|entry| entry.txid)
            else {
                break;
            };
            let package_rate = match self.entries.get(&worst) {
                Some(entry) => entry.descendant_fee_rate(),
                None => break,
            };
            let bumped = FeeRate::from_sat_per_kb(
                package_rate.sat_per_kb() + self.config.incremental_feerate.sat_per_kb(),
            );
            if bumped > self.rolling_minimum(now) {
                self.rolling_min_fee = bumped;
                self.last_rolling_update = now;
            }
            evicted.extend(self.remove_subtree(&worst));
        }
        if !evicted.is_empty() {
            debug!(
                evicted = evicted.len(),
                min_fee = self.rolling_min_fee.sat_per_kb(),
                "trimmed mempool"
            );
        }
        evicted
    }

    /// Current eviction-driven fee floor, decayed by half every twelve
    /// hours and snapped to zero once it falls below half the relay
    /// floor.
    pub fn rolling_minimum(&mut self, now: i64) -> FeeRate {
        if self.rolling_min_fee == FeeRate::ZERO {
            return FeeRate::ZERO;
        }
        let elapsed = now.saturating_sub(self.last_rolling_update);
        if elapsed >= ROLLING_FEE_HALFLIFE {
            let halvings = (elapsed / ROLLING_FEE_HALFLIFE).min(62) as u32;
            let mut rate = self.rolling_min_fee;
            for _ in 0..halvings {
                rate = rate.halved();
            }
            self.rolling_min_fee = rate;
            self.last_rolling_update = now;
        }
        if self.rolling_min_fee < self.config.min_relay_feerate.halved() {
            self.rolling_min_fee = FeeRate::ZERO;
        }
        self.rolling_min_fee
    }

    /// Entry txids ordered best-first for block inclusion: descending
    /// ancestor fee rate with the txid as a deterministic tie-break.
    pub fn txids_by_ancestor_feerate(&self) -> Vec<Hash256> {
        let mut txids: Vec<Hash256> = self.entries.keys().copied().collect();
        txids.sort_by(|a, b| {
            let rate_a = self.entries[a].ancestor_fee_rate();
            let rate_b = self.entries[b].ancestor_fee_rate();
            rate_b.cmp(&rate_a).then_with(|| a.cmp(b))
        });
        txids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basaltd_primitives::transaction::{TxIn, TxOut};
    use std::sync::Arc;

    fn tx_spending(prevouts: &[OutPoint], outputs: usize, tag: u32) -> Arc<Transaction> {
        Arc::new(Transaction {
            version: 1,
            vin: prevouts
                .iter()
                .map(|prevout| TxIn {
                    prevout: *prevout,
                    script_sig: vec![0x51],
                    sequence: 0xffff_ffff,
                })
                .collect(),
            vout: (0..outputs)
                .map(|index| TxOut {
                    value: 1_000 + i64::from(tag) + index as i64,
                    script_pubkey: vec![0x51],
                })
                .collect(),
            lock_time: tag,
        })
    }

    fn pool() -> Mempool {
        Mempool::new(MempoolConfig::default())
    }

    /// Add a transaction with the fee, wiring parents from prevouts.
    fn add(pool: &mut Mempool, tx: Arc<Transaction>, fee: i64, time: i64) -> Hash256 {
        let txid = tx.txid();
        let parents: HashSet<Hash256> = tx
            .vin
            .iter()
            .map(|input| input.prevout.txid)
            .filter(|parent| pool.contains(parent))
            .collect();
        let ancestors = pool
            .calc_ancestors(&parents, tx.serialized_size())
            .expect("limits");
        let entry = MempoolEntry::new(tx, txid, fee, time, 0, parents);
        pool.insert_entry(entry, &ancestors);
        txid
    }

    fn outpoint(txid: Hash256, vout: u32) -> OutPoint {
        OutPoint::new(txid, vout)
    }

    #[test]
    fn aggregates_track_chain_of_three() {
        let mut pool = pool();
        let a = add(&mut pool, tx_spending(&[outpoint([1; 32], 0)], 1, 1), 300, 0);
        let b = add(&mut pool, tx_spending(&[outpoint(a, 0)], 1, 2), 200, 0);
        let c = add(&mut pool, tx_spending(&[outpoint(b, 0)], 1, 3), 100, 0);

        let entry_a = pool.get(&a).expect("a");
        assert_eq!(entry_a.descendant_count(), 3);
        assert_eq!(entry_a.descendant_fees(), 600);
        assert_eq!(entry_a.ancestor_count(), 1);

        let entry_c = pool.get(&c).expect("c");
        assert_eq!(entry_c.ancestor_count(), 3);
        assert_eq!(entry_c.ancestor_fees(), 600);
        assert_eq!(entry_c.descendant_count(), 1);
    }

    #[test]
    fn remove_subtree_takes_descendants_and_fixes_aggregates() {
        let mut pool = pool();
        let a = add(&mut pool, tx_spending(&[outpoint([2; 32], 0)], 2, 1), 300, 0);
        let b = add(&mut pool, tx_spending(&[outpoint(a, 0)], 1, 2), 200, 0);
        let c = add(&mut pool, tx_spending(&[outpoint(b, 0)], 1, 3), 100, 0);

        let removed = pool.remove_subtree(&b);
        assert_eq!(removed.len(), 2);
        assert!(pool.contains(&a));
        assert!(!pool.contains(&b));
        assert!(!pool.contains(&c));

        let entry_a = pool.get(&a).expect("a");
        assert_eq!(entry_a.descendant_count(), 1);
        assert_eq!(entry_a.descendant_fees(), 300);
        assert!(entry_a.children().is_empty());
    }

    #[test]
    fn removal_adjusts_every_surviving_ancestor() {
        let mut pool = pool();
        let a = add(&mut pool, tx_spending(&[outpoint([10; 32], 0)], 2, 1), 400, 0);
        let b = add(&mut pool, tx_spending(&[outpoint(a, 0)], 1, 2), 300, 0);
        let c = add(&mut pool, tx_spending(&[outpoint(a, 1)], 1, 3), 200, 0);
        let d = add(
            &mut pool,
            tx_spending(&[outpoint(b, 0), outpoint(c, 0)], 1, 4),
            100,
            0,
        );
        assert_eq!(pool.get(&a).expect("a").descendant_count(), 4);

        // Removing b takes d along; the surviving ancestors a and c
        // each lose exactly the members that descended from them, no
        // matter in which order the subtree is torn down.
        let removed = pool.remove_subtree(&b);
        assert_eq!(removed.len(), 2);
        assert!(!pool.contains(&d));

        let entry_a = pool.get(&a).expect("a");
        assert_eq!(entry_a.descendant_count(), 2);
        assert_eq!(entry_a.descendant_fees(), 600);
        let entry_c = pool.get(&c).expect("c");
        assert_eq!(entry_c.descendant_count(), 1);
        assert_eq!(entry_c.descendant_fees(), 200);
    }

    #[test]
    fn confirmed_removal_keeps_children() {
        let mut pool = pool();
        let a = add(&mut pool, tx_spending(&[outpoint([3; 32], 0)], 1, 1), 300, 0);
        let b = add(&mut pool, tx_spending(&[outpoint(a, 0)], 1, 2), 200, 0);

        let parent_tx = pool.get(&a).expect("a").tx().as_ref().clone();
        pool.remove_for_block(&[parent_tx]);

        assert!(!pool.contains(&a));
        let entry_b = pool.get(&b).expect("b");
        assert_eq!(entry_b.ancestor_count(), 1);
        assert_eq!(entry_b.ancestor_fees(), 200);
        assert!(entry_b.parents().is_empty());
    }

    #[test]
    fn block_conflict_removes_competing_spender() {
        let mut pool = pool();
        let shared = outpoint([4; 32], 0);
        let in_pool = add(&mut pool, tx_spending(&[shared], 1, 1), 300, 0);
        let child = add(&mut pool, tx_spending(&[outpoint(in_pool, 0)], 1, 2), 200, 0);

        // The block confirms a different transaction spending `shared`.
        let confirmed = tx_spending(&[shared], 1, 9).as_ref().clone();
        pool.remove_for_block(&[confirmed]);

        assert!(!pool.contains(&in_pool));
        assert!(!pool.contains(&child));
        assert!(pool.is_empty());
    }

    #[test]
    fn eviction_removes_lowest_package_first_and_sets_floor() {
        let mut config = MempoolConfig::default();
        config.max_size_bytes = 0; // force eviction of everything added
        let mut pool = Mempool::new(config);

        let cheap = tx_spending(&[outpoint([5; 32], 0)], 1, 1);
        let dear = tx_spending(&[outpoint([5; 32], 1)], 1, 2);
        let cheap_id = add(&mut pool, cheap, 100, 0);
        let dear_id = add(&mut pool, dear, 10_000, 0);

        let evicted = pool.trim_to_size(0);
        assert_eq!(evicted.len(), 2);
        // Lowest descendant fee rate leaves first.
        assert_eq!(evicted[0].txid(), cheap_id);
        assert_eq!(evicted[1].txid(), dear_id);
        assert!(pool.rolling_minimum(0) > FeeRate::ZERO);
    }

    #[test]
    fn rolling_minimum_decays_to_zero() {
        let mut config = MempoolConfig::default();
        config.max_size_bytes = 0;
        let mut pool = Mempool::new(config);
        add(&mut pool, tx_spending(&[outpoint([6; 32], 0)], 1, 1), 50_000, 0);
        pool.trim_to_size(0);

        let initial = pool.rolling_minimum(0);
        assert!(initial > FeeRate::ZERO);
        let after_halflife = pool.rolling_minimum(ROLLING_FEE_HALFLIFE);
        assert!(after_halflife < initial);
        // Far enough out the floor disappears entirely.
        assert_eq!(
            pool.rolling_minimum(ROLLING_FEE_HALFLIFE * 60),
            FeeRate::ZERO
        );
    }

    #[test]
    fn expiry_sweeps_old_entries_with_children() {
        let mut pool = pool();
        let old = add(&mut pool, tx_spending(&[outpoint([7; 32], 0)], 1, 1), 300, 0);
        let _child = add(&mut pool, tx_spending(&[outpoint(old, 0)], 1, 2), 200, 50);
        let fresh = add(
            &mut pool,
            tx_spending(&[outpoint([7; 32], 1)], 1, 3),
            300,
            1_000_000,
        );

        let expiry = pool.config().expiry_secs;
        assert_eq!(pool.expire(expiry + 100), 2);
        assert!(!pool.contains(&old));
        assert!(pool.contains(&fresh));
    }

    #[test]
    fn ancestor_limit_enforced() {
        let mut config = MempoolConfig::default();
        config.max_ancestors = 2;
        let mut pool = Mempool::new(config);
        let a = add(&mut pool, tx_spending(&[outpoint([8; 32], 0)], 1, 1), 300, 0);
        let b = add(&mut pool, tx_spending(&[outpoint(a, 0)], 1, 2), 200, 0);

        let mut parents = HashSet::new();
        parents.insert(b);
        assert_eq!(
            pool.calc_ancestors(&parents, 100),
            Err(PackageLimit::TooManyAncestors)
        );
    }

    #[test]
    fn inclusion_order_is_by_ancestor_feerate() {
        let mut pool = pool();
        let low = add(&mut pool, tx_spending(&[outpoint([9; 32], 0)], 1, 1), 100, 0);
        let high = add(&mut pool, tx_spending(&[outpoint([9; 32], 1)], 1, 2), 9_000, 0);
        let order = pool.txids_by_ancestor_feerate();
        assert_eq!(order[0], high);
        assert_eq!(order[1], low);
    }
}
