//! Greedy block template construction over mempool packages.

use std::collections::HashSet;

use basaltd_chainstate::validation::{height_script, transaction_sigops};
use basaltd_chainstate::ChainState;
use basaltd_consensus::{block_subsidy, Hash256};
use basaltd_mempool::Mempool;
use basaltd_pow::check_proof_of_work;
use basaltd_primitives::block::{Block, BlockHeader, HEADER_SIZE};
use basaltd_primitives::outpoint::OutPoint;
use basaltd_primitives::transaction::{Transaction, TxIn, TxOut};
use basaltd_storage::KeyValueStore;
use tracing::debug;

#[derive(Debug)]
pub enum MinerError {
    /// The chain has no tip to build on.
    NoChainTip,
}

impl std::fmt::Display for MinerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MinerError::NoChainTip => write!(f, "no chain tip to build on"),
        }
    }
}

impl std::error::Error for MinerError {}

/// A candidate block ready for proof-of-work, with its accounting.
pub struct BlockTemplate {
    pub block: Block,
    pub height: i32,
    pub total_fees: i64,
    pub size: usize,
    pub sigops: u32,
}

/// Build a block on the current tip, packing mempool transactions by
/// descending ancestor fee rate. A transaction is only included
/// together with all of its unconfirmed ancestors; packages that do
/// not fit are skipped, not fatal.
pub fn create_new_block<S: KeyValueStore>(
    chain: &ChainState<S>,
    pool: &Mempool,
    payout_script: Vec<u8>,
    now: i64,
) -> Result<BlockTemplate, MinerError> {
    let ctx = chain.next_block_context().ok_or(MinerError::NoChainTip)?;
    let consensus = &chain.params().consensus;

    // Reserve room for the header, transaction count and a coinbase
    // before packing; the coinbase is finalized once fees are known.
    let coinbase_stub = coinbase_transaction(ctx.height, 0, payout_script.clone());
    let reserve = HEADER_SIZE + 9 + coinbase_stub.serialized_size();
    let size_budget = consensus.max_block_size.saturating_sub(reserve);
    let sigop_budget = consensus
        .max_block_sigops
        .saturating_sub(transaction_sigops(&coinbase_stub));

    let mut in_block: HashSet<Hash256> = HashSet::new();
    let mut selected: Vec<Hash256> = Vec::new();
    let mut total_size = 0usize;
    let mut total_sigops = 0u32;
    let mut total_fees = 0i64;

    for txid in pool.txids_by_ancestor_feerate() {
        if in_block.contains(&txid) {
            continue;
        }
        let Some(entry) = pool.get(&txid) else {
            continue;
        };
        let mut package: Vec<Hash256> = pool
            .ancestors_of(&txid)
            .into_iter()
            .filter(|ancestor| !in_block.contains(ancestor))
            .collect();
        package.push(txid);

        let mut package_size = 0usize;
        let mut package_sigops = 0u32;
        let mut package_fees = 0i64;
        for member in &package {
            let Some(member_entry) = pool.get(member) else {
                package_size = usize::MAX;
                break;
            };
            package_size += member_entry.size();
            package_sigops += member_entry.sigop_cost();
            package_fees += member_entry.fee();
        }
        if package_size == usize::MAX
            || total_size + package_size > size_budget
            || total_sigops + package_sigops > sigop_budget
        {
            debug!(
                txid = ?entry.txid(),
                "skipped package over block budget"
            );
            continue;
        }

        // Parents always carry strictly fewer unconfirmed ancestors
        // than their children, so this yields a dependency order.
        package.sort_by_key(|member| {
            let count = pool
                .get(member)
                .map(|entry| entry.ancestor_count())
                .unwrap_or(usize::MAX);
            (count, *member)
        });
        for member in package {
            in_block.insert(member);
            selected.push(member);
        }
        total_size += package_size;
        total_sigops += package_sigops;
        total_fees += package_fees;
    }

    let mut transactions = Vec::with_capacity(selected.len() + 1);
    transactions.push(coinbase_transaction(
        ctx.height,
        block_subsidy(ctx.height, consensus).saturating_add(total_fees),
        payout_script,
    ));
    for txid in &selected {
        if let Some(entry) = pool.get(txid) {
            transactions.push(entry.tx().as_ref().clone());
        }
    }

    let mut block = Block {
        header: BlockHeader {
            version: 1,
            prev_block: ctx.prev_hash,
            merkle_root: [0u8; 32],
            time: ctx.min_time.max(now.max(0) as u32),
            bits: ctx.bits,
            nonce: 0,
        },
        transactions,
    };
    block.header.merkle_root = block.computed_merkle_root();
    let size = block.serialized_size();
    debug!(
        height = ctx.height,
        transactions = block.transactions.len(),
        size,
        fees = total_fees,
        "assembled block template"
    );
    Ok(BlockTemplate {
        block,
        height: ctx.height,
        total_fees,
        size,
        sigops: total_sigops,
    })
}

/// Coinbase with the height committed at the front of its script.
fn coinbase_transaction(height: i32, value: i64, payout_script: Vec<u8>) -> Transaction {
    let mut script_sig = height_script(height);
    // Extranonce space; also keeps the script above the minimum size.
    script_sig.extend_from_slice(&[0u8; 4]);
    Transaction {
        version: 1,
        vin: vec![TxIn {
            prevout: OutPoint::null(),
            script_sig,
            sequence: basaltd_consensus::constants::SEQUENCE_FINAL,
        }],
        vout: vec![TxOut {
            value,
            script_pubkey: payout_script,
        }],
        lock_time: 0,
    }
}

/// Grind the nonce until the header meets its target. Only practical
/// on low-difficulty chains.
pub fn solve_block(block: &mut Block, pow_limit_bits: u32) {
    while check_proof_of_work(&block.header.hash(), block.header.bits, pow_limit_bits).is_err() {
        block.header.nonce = block.header.nonce.wrapping_add(1);
    }
}
