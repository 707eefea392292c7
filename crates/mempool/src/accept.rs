//! Transaction admission and reorg resynchronization.

use std::collections::HashSet;
use std::sync::Arc;

use basaltd_chainstate::validation::{check_transaction, check_tx_inputs, is_final_tx};
use basaltd_chainstate::{ChainState, ChainStateError, ChainUpdate, ValidationError};
use basaltd_consensus::Hash256;
use basaltd_primitives::transaction::Transaction;
use basaltd_script::{verify_script, ScriptError};
use basaltd_storage::KeyValueStore;
use tracing::debug;

use crate::entry::{FeeRate, MempoolEntry};
use crate::pool::{Mempool, PackageLimit};

#[derive(Debug)]
pub enum MempoolError {
    AlreadyInPool,
    Coinbase,
    NonFinal,
    /// Spends an outpoint already spent in the pool, and replacement is
    /// disabled.
    Conflict,
    /// An input refers to no known confirmed or unconfirmed output.
    MissingInputs,
    /// The transaction fails a structural or contextual check.
    Validation(ValidationError),
    Script(ScriptError),
    /// Below the relay floor or the rolling minimum.
    FeeTooLow,
    PackageLimit(PackageLimit),
    /// The replacement does not pay strictly more per byte than every
    /// transaction it conflicts with.
    ReplacementFeerateTooLow,
    /// The replacement's absolute fee does not cover what it evicts
    /// plus the incremental floor for its own size.
    ReplacementUnderpays,
    /// The replacement spends an output created by a transaction it
    /// would evict.
    ReplacementSpendsConflict,
    Chain(ChainStateError),
}

impl std::fmt::Display for MempoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MempoolError::AlreadyInPool => write!(f, "transaction already in pool"),
            MempoolError::Coinbase => write!(f, "coinbase cannot enter the pool"),
            MempoolError::NonFinal => write!(f, "transaction is not final"),
            MempoolError::Conflict => write!(f, "conflicts with an in-pool transaction"),
            MempoolError::MissingInputs => write!(f, "inputs unavailable"),
            MempoolError::Validation(err) => write!(f, "{err}"),
            MempoolError::Script(err) => write!(f, "{err}"),
            MempoolError::FeeTooLow => write!(f, "fee below minimum"),
            MempoolError::PackageLimit(limit) => write!(f, "package limit hit: {limit:?}"),
            MempoolError::ReplacementFeerateTooLow => {
                write!(f, "replacement fee rate not above conflicts")
            }
            MempoolError::ReplacementUnderpays => {
                write!(f, "replacement fee does not cover evicted fees")
            }
            MempoolError::ReplacementSpendsConflict => {
                write!(f, "replacement spends output of a conflict")
            }
            MempoolError::Chain(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for MempoolError {}

impl From<ValidationError> for MempoolError {
    fn from(err: ValidationError) -> Self {
        MempoolError::Validation(err)
    }
}

impl From<ChainStateError> for MempoolError {
    fn from(err: ChainStateError) -> Self {
        MempoolError::Chain(err)
    }
}

impl From<PackageLimit> for MempoolError {
    fn from(limit: PackageLimit) -> Self {
        MempoolError::PackageLimit(limit)
    }
}

/// Validate a loose transaction against the current tip and admit it,
/// replacing any conflicting pool transactions it outbids.
pub fn accept_to_memory_pool<S: KeyValueStore>(
    chain: &ChainState<S>,
    pool: &mut Mempool,
    tx: Transaction,
    now: i64,
) -> Result<Hash256, MempoolError> {
    let params = chain.params();
    check_transaction(&tx, &params.consensus)?;
    if tx.is_coinbase() {
        return Err(MempoolError::Coinbase);
    }
    let txid = tx.txid();
    if pool.contains(&txid) {
        return Err(MempoolError::AlreadyInPool);
    }

    let ctx = chain
        .next_block_context()
        .ok_or(MempoolError::Chain(ChainStateError::Corrupt(
            "no chain tip".into(),
        )))?;
    if !is_final_tx(&tx, ctx.height, i64::from(ctx.min_time)) {
        return Err(MempoolError::NonFinal);
    }

    // Existing pool transactions spending the same outputs are
    // replacement candidates.
    let mut conflicts: HashSet<Hash256> = HashSet::new();
    for input in &tx.vin {
        if let Some(spender) = pool.spender_of(&input.prevout) {
            conflicts.insert(spender);
        }
    }
    if !conflicts.is_empty() && !pool.config().replace_by_fee {
        return Err(MempoolError::Conflict);
    }

    // Resolve each input to a confirmed coin or an unconfirmed pool
    // output, tracking in-pool parents.
    let mut spent = Vec::with_capacity(tx.vin.len());
    let mut parents: HashSet<Hash256> = HashSet::new();
    for input in &tx.vin {
        if let Some(coin) = pool.unconfirmed_coin(&input.prevout, ctx.height) {
            parents.insert(input.prevout.txid);
            spent.push(coin);
        } else if let Some(coin) = chain.coin(&input.prevout)? {
            spent.push(coin);
        } else {
            return Err(MempoolError::MissingInputs);
        }
    }

    let fee = check_tx_inputs(&tx, &spent, ctx.height, &params.consensus)?;
    let size = tx.serialized_size();
    let fee_rate = FeeRate::from_fee_size(fee, size);
    if fee_rate < pool.config().min_relay_feerate || fee_rate < pool.rolling_minimum(now) {
        return Err(MempoolError::FeeTooLow);
    }

    let ancestors = pool.calc_ancestors(&parents, size)?;

    if !conflicts.is_empty() {
        let replaced = pool.with_descendants(&conflicts);
        if parents.iter().any(|parent| replaced.contains(parent)) {
            return Err(MempoolError::ReplacementSpendsConflict);
        }
        for conflict in &conflicts {
            if let Some(entry) = pool.get(conflict) {
                if fee_rate <= entry.fee_rate() {
                    return Err(MempoolError::ReplacementFeerateTooLow);
                }
            }
        }
        let replaced_fees: i64 = replaced
            .iter()
            .filter_map(|id| pool.get(id))
            .map(|entry| entry.fee())
            .sum();
        if fee < replaced_fees + pool.config().incremental_feerate.fee_for(size) {
            return Err(MempoolError::ReplacementUnderpays);
        }
    }

    let cache = chain.signature_cache();
    for (input_index, input) in tx.vin.iter().enumerate() {
        verify_script(
            &input.script_sig,
            &spent[input_index].script_pubkey,
            &tx,
            input_index,
            Some(cache.as_ref()),
        )
        .map_err(MempoolError::Script)?;
    }

    for conflict in &conflicts {
        pool.remove_subtree(conflict);
    }

    let entry = MempoolEntry::new(Arc::new(tx), txid, fee, now, ctx.height, parents);
    pool.insert_entry(entry, &ancestors);
    pool.trim_to_size(now);
    if !pool.contains(&txid) {
        return Err(MempoolError::FeeTooLow);
    }
    Ok(txid)
}

/// Bring the pool in line with a tip movement: confirmed transactions
/// leave, transactions from abandoned blocks are resubmitted.
pub fn update_for_reorg<S: KeyValueStore>(
    chain: &ChainState<S>,
    pool: &mut Mempool,
    update: &ChainUpdate,
    now: i64,
) {
    for (_, block) in &update.connected {
        pool.remove_for_block(&block.transactions);
    }
    // Disconnected blocks arrive tip-first; resubmit in chain order so
    // parents precede children.
    for (_, block) in update.disconnected.iter().rev() {
        for tx in block.transactions.iter().skip(1) {
            match accept_to_memory_pool(chain, pool, tx.clone(), now) {
                Ok(_) => {}
                Err(err) => {
                    debug!(%err, "dropped transaction from disconnected block");
                }
            }
        }
    }
}
