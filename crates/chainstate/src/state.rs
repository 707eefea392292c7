//! The chain-state engine: header acceptance, block connection and
//! best-chain selection over the coin set.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use basaltd_consensus::constants::MAX_FUTURE_BLOCK_TIME;
use basaltd_consensus::params::{ChainParams, TieBreak};
use basaltd_consensus::{block_subsidy, hash256_to_hex, Hash256};
use basaltd_pow::check_proof_of_work;
use basaltd_primitives::block::{Block, BlockHeader};
use basaltd_primitives::encoding::DecodeError;
use basaltd_primitives::outpoint::OutPoint;
use basaltd_primitives::transaction::Transaction;
use basaltd_script::{verify_script, SignatureCache};
use basaltd_storage::{Column, KeyValueStore, StoreError, WriteBatch};
use primitive_types::U256;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::blockindex::{BlockIndex, BlockStatus, Handle};
use crate::chain::Chain;
use crate::coins::{Coin, CoinsCache, CoinsDb, CoinsError};
use crate::undo::{BlockUndo, SpentCoin};
use crate::validation::{
    check_block, check_block_version, check_coinbase_height, check_tx_inputs, is_final_tx,
    ValidationError,
};

const META_BEST_BLOCK: &[u8] = b"best_block";

/// Capacity of the shared signature verification cache.
pub const DEFAULT_SIGCACHE_CAPACITY: usize = 100_000;

#[derive(Debug)]
pub enum ChainStateError {
    /// The header's parent is not in the index.
    UnknownParent,
    /// The block or an ancestor is already known to be invalid.
    KnownInvalid,
    Validation(ValidationError),
    Store(StoreError),
    /// Persisted data failed to decode or is internally inconsistent.
    Corrupt(String),
}

impl std::fmt::Display for ChainStateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainStateError::UnknownParent => write!(f, "unknown parent block"),
            ChainStateError::KnownInvalid => write!(f, "block is known invalid"),
            ChainStateError::Validation(err) => write!(f, "{err}"),
            ChainStateError::Store(err) => write!(f, "{err}"),
            ChainStateError::Corrupt(message) => write!(f, "corrupt chain data: {message}"),
        }
    }
}

impl std::error::Error for ChainStateError {}

impl From<StoreError> for ChainStateError {
    fn from(err: StoreError) -> Self {
        ChainStateError::Store(err)
    }
}

impl From<ValidationError> for ChainStateError {
    fn from(err: ValidationError) -> Self {
        ChainStateError::Validation(err)
    }
}

impl From<DecodeError> for ChainStateError {
    fn from(err: DecodeError) -> Self {
        ChainStateError::Corrupt(err.to_string())
    }
}

/// Split a coins failure during block connection into a consensus
/// verdict or a fatal error.
fn coins_failure(err: CoinsError) -> Result<ConnectOutcome, ChainStateError> {
    match err {
        CoinsError::CoinNotFound => Ok(ConnectOutcome::Invalid(ValidationError::MissingInputs)),
        CoinsError::DoubleAdd => Ok(ConnectOutcome::Invalid(ValidationError::DuplicateTxid)),
        CoinsError::Store(err) => Err(ChainStateError::Store(err)),
        CoinsError::Decode(err) => Err(ChainStateError::Corrupt(err.to_string())),
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TipInfo {
    pub hash: Hash256,
    pub height: i32,
    pub chain_work: U256,
    pub time: u32,
}

/// What the miner needs to build on the current tip.
#[derive(Clone, Copy, Debug)]
pub struct NextBlockContext {
    pub prev_hash: Hash256,
    pub height: i32,
    /// Lowest acceptable header timestamp, one past the median.
    pub min_time: u32,
    pub bits: u32,
}

/// Tip movement produced by one activation, in application order.
/// Consumers resync the mempool from it.
#[derive(Default)]
pub struct ChainUpdate {
    pub connected: Vec<(Hash256, Block)>,
    pub disconnected: Vec<(Hash256, Block)>,
}

impl ChainUpdate {
    pub fn is_empty(&self) -> bool {
        self.connected.is_empty() && self.disconnected.is_empty()
    }
}

struct Inner<S> {
    index: BlockIndex,
    chain: Chain,
    coins: CoinsCache<CoinsDb<Arc<S>>>,
}

enum ConnectOutcome {
    Connected(BlockUndo),
    Invalid(ValidationError),
}

pub struct ChainState<S> {
    params: ChainParams,
    store: Arc<S>,
    sig_cache: Arc<SignatureCache>,
    inner: Mutex<Inner<S>>,
}

/// Deterministic genesis block derived from the chain parameters.
pub fn genesis_block(params: &ChainParams) -> Block {
    let coinbase = Transaction {
        version: 1,
        vin: vec![basaltd_primitives::transaction::TxIn {
            prevout: OutPoint::null(),
            script_sig: vec![0x01, 0x04],
            sequence: basaltd_consensus::constants::SEQUENCE_FINAL,
        }],
        vout: vec![basaltd_primitives::transaction::TxOut {
            value: block_subsidy(0, &params.consensus),
            // Anyone-can-spend, though the genesis output is never
            // entered into the coin set.
            script_pubkey: vec![0x51],
        }],
        lock_time: 0,
    };
    let mut block = Block {
        header: BlockHeader {
            version: 1,
            prev_block: [0u8; 32],
            merkle_root: [0u8; 32],
            time: params.genesis_time,
            bits: params.genesis_bits,
            nonce: 0,
        },
        transactions: vec![coinbase],
    };
    block.header.merkle_root = block.computed_merkle_root();
    block
}

fn unix_time() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

impl<S: KeyValueStore> ChainState<S> {
    /// Open the chain state, creating and connecting the genesis block
    /// on first use. The genesis coinbase does not enter the coin set.
    pub fn new(store: Arc<S>, params: ChainParams) -> Result<Self, ChainStateError> {
        let mut index = BlockIndex::new();
        let mut persisted = Vec::new();
        for (_, bytes) in store.scan_prefix(Column::Header, &[])? {
            persisted.push(crate::blockindex::BlockIndexEntry::decode(&bytes)?);
        }
        persisted.sort_by_key(|entry| (entry.height, entry.sequence));
        for entry in persisted {
            index.restore(entry).map_err(|missing| {
                ChainStateError::Corrupt(format!(
                    "index entry with unknown parent {}",
                    hash256_to_hex(&missing)
                ))
            })?;
        }

        let mut chain = Chain::new();
        if index.is_empty() {
            let genesis = genesis_block(&params);
            let hash = genesis.header.hash();
            let handle = index.insert(genesis.header, None);
            index.advance_status(handle, BlockStatus::ScriptsValid);
            index.get_mut(handle).have_data = true;

            let mut batch = WriteBatch::new();
            batch.put(Column::Header, hash.to_vec(), index.get(handle).encode());
            batch.put(Column::Block, hash.to_vec(), genesis.consensus_encode());
            batch.put(Column::Meta, META_BEST_BLOCK.to_vec(), hash.to_vec());
            store.write_batch(batch)?;
            chain.set_tip(&index, handle);
            info!(hash = %hash256_to_hex(&hash), "initialized new chain at genesis");
        } else {
            let tip = match store.get(Column::Meta, META_BEST_BLOCK)? {
                Some(bytes) if bytes.len() == 32 => {
                    let mut hash = [0u8; 32];
                    hash.copy_from_slice(&bytes);
                    index.lookup(&hash).ok_or_else(|| {
                        ChainStateError::Corrupt("best block pointer not in index".into())
                    })?
                }
                _ => return Err(ChainStateError::Corrupt("missing best block pointer".into())),
            };
            chain.set_tip(&index, tip);
            info!(
                height = index.get(tip).height,
                hash = %hash256_to_hex(&index.get(tip).hash),
                "loaded chain state"
            );
        }

        Ok(Self {
            params,
            store: Arc::clone(&store),
            sig_cache: Arc::new(SignatureCache::new(DEFAULT_SIGCACHE_CAPACITY)),
            inner: Mutex::new(Inner {
                index,
                chain,
                coins: CoinsCache::new(CoinsDb::new(store)),
            }),
        })
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn signature_cache(&self) -> Arc<SignatureCache> {
        Arc::clone(&self.sig_cache)
    }

    fn lock(&self) -> MutexGuard<'_, Inner<S>> {
        // A poisoned lock means another thread panicked mid-update;
        // continuing with the data is no worse than the panic itself.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn best_tip(&self) -> Option<TipInfo> {
        let inner = self.lock();
        let tip = inner.chain.tip()?;
        let entry = inner.index.get(tip);
        Some(TipInfo {
            hash: entry.hash,
            height: entry.height,
            chain_work: entry.chain_work,
            time: entry.header.time,
        })
    }

    pub fn next_block_context(&self) -> Option<NextBlockContext> {
        let inner = self.lock();
        let tip = inner.chain.tip()?;
        let entry = inner.index.get(tip);
        Some(NextBlockContext {
            prev_hash: entry.hash,
            height: entry.height + 1,
            min_time: inner.index.median_time_past(tip) + 1,
            bits: self.params.genesis_bits,
        })
    }

    /// Look up an unspent coin through the cache.
    pub fn coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, ChainStateError> {
        let mut inner = self.lock();
        inner
            .coins
            .get_coin(outpoint)
            .map_err(disconnected_coins_fault)
    }

    /// Hash of the active-chain block at the given height.
    pub fn block_hash_at_height(&self, height: i32) -> Option<Hash256> {
        let inner = self.lock();
        let handle = inner.chain.at_height(height)?;
        Some(inner.index.get(handle).hash)
    }

    /// Validate and index a header whose parent is already known.
    pub fn accept_header(&self, header: &BlockHeader) -> Result<Handle, ChainStateError> {
        let mut inner = self.lock();
        self.accept_header_locked(&mut inner, header)
    }

    fn accept_header_locked(
        &self,
        inner: &mut Inner<S>,
        header: &BlockHeader,
    ) -> Result<Handle, ChainStateError> {
        let hash = header.hash();
        if let Some(existing) = inner.index.lookup(&hash) {
            if inner.index.get(existing).status.is_failed() {
                return Err(ChainStateError::KnownInvalid);
            }
            return Ok(existing);
        }
        check_block_version(header.version)?;
        check_proof_of_work(&hash, header.bits, self.params.consensus.pow_limit_bits)
            .map_err(|_| ValidationError::BadProofOfWork)?;
        let parent = inner
            .index
            .lookup(&header.prev_block)
            .ok_or(ChainStateError::UnknownParent)?;
        if header.time <= inner.index.median_time_past(parent) {
            return Err(ValidationError::TimeTooOld.into());
        }
        if i64::from(header.time) > unix_time() + MAX_FUTURE_BLOCK_TIME {
            return Err(ValidationError::TimeTooFar.into());
        }
        let handle = inner.index.insert(*header, Some(parent));
        self.store.put(
            Column::Header,
            &hash,
            &inner.index.get(handle).encode(),
        )?;
        if inner.index.get(handle).status.is_failed() {
            return Err(ChainStateError::KnownInvalid);
        }
        debug!(
            height = inner.index.get(handle).height,
            hash = %hash256_to_hex(&hash),
            "accepted header"
        );
        Ok(handle)
    }

    /// Validate a full block, store it and try to extend the best chain.
    pub fn process_new_block(&self, block: &Block) -> Result<ChainUpdate, ChainStateError> {
        check_block(block, &self.params.consensus)?;
        let hash = block.header.hash();
        let mut inner = self.lock();
        let handle = self.accept_header_locked(&mut inner, &block.header)?;
        let (height, parent) = {
            let entry = inner.index.get(handle);
            (entry.height, entry.parent)
        };
        // Lock times cut off at the median time past of the previous
        // eleven blocks, not at the block's own timestamp.
        let lock_cutoff = match parent {
            Some(parent) => i64::from(inner.index.median_time_past(parent)),
            None => i64::from(block.header.time),
        };

        if let Err(err) = self.contextual_block_checks(block, height, lock_cutoff) {
            inner.index.mark_failed(handle);
            self.persist_failed(&inner)?;
            warn!(hash = %hash256_to_hex(&hash), %err, "rejected block");
            return Err(err.into());
        }

        if !inner.index.get(handle).have_data {
            inner.index.get_mut(handle).have_data = true;
            inner.index.advance_status(handle, BlockStatus::TreeValid);
            let mut batch = WriteBatch::new();
            batch.put(Column::Block, hash.to_vec(), block.consensus_encode());
            batch.put(Column::Header, hash.to_vec(), inner.index.get(handle).encode());
            self.store.write_batch(batch)?;
        }
        self.activate_locked(&mut inner)
    }

    fn contextual_block_checks(
        &self,
        block: &Block,
        height: i32,
        lock_cutoff: i64,
    ) -> Result<(), ValidationError> {
        check_coinbase_height(block, height)?;
        for tx in &block.transactions {
            if !is_final_tx(tx, height, lock_cutoff) {
                return Err(ValidationError::NonFinalTransaction);
            }
        }
        Ok(())
    }

    /// Reconsider all candidates and move the tip to the most-work
    /// valid chain, connecting and disconnecting as needed.
    pub fn activate_best_chain(&self) -> Result<ChainUpdate, ChainStateError> {
        let mut inner = self.lock();
        self.activate_locked(&mut inner)
    }

    fn activate_locked(&self, inner: &mut Inner<S>) -> Result<ChainUpdate, ChainStateError> {
        let mut update = ChainUpdate::default();
        let mut skipped: HashSet<Handle> = HashSet::new();
        let mut last_invalid: Option<ValidationError> = None;

        'outer: loop {
            let tip = inner.chain.tip();
            let Some(best) = self.find_best_candidate(inner, tip, &skipped) else {
                break;
            };
            if Some(best) == tip {
                break;
            }

            let fork = match tip {
                Some(tip_handle) => inner.index.last_common_ancestor(best, tip_handle),
                None => match inner.index.ancestor_at(best, 0) {
                    Some(root) => root,
                    None => break,
                },
            };

            let mut path = Vec::new();
            let mut walk = best;
            let mut missing_data = false;
            while walk != fork {
                let entry = inner.index.get(walk);
                if !entry.have_data {
                    missing_data = true;
                }
                path.push(walk);
                match entry.parent {
                    Some(parent) => walk = parent,
                    None => break,
                }
            }
            path.reverse();
            if missing_data {
                skipped.insert(best);
                continue;
            }

            while inner.chain.tip() != Some(fork) {
                self.disconnect_tip(inner, &mut update)?;
            }

            for handle in path {
                let block = self.read_block(inner.index.get(handle).hash)?;
                match self.connect_block(inner, handle, &block)? {
                    ConnectOutcome::Connected(undo) => {
                        let entry_hash = inner.index.get(handle).hash;
                        inner.index.advance_status(handle, BlockStatus::ScriptsValid);
                        let mut batch = WriteBatch::new();
                        batch.put(Column::Undo, entry_hash.to_vec(), undo.encode());
                        batch.put(
                            Column::Header,
                            entry_hash.to_vec(),
                            inner.index.get(handle).encode(),
                        );
                        self.store.write_batch(batch)?;
                        inner.chain.set_tip(&inner.index, handle);
                        info!(
                            height = inner.index.get(handle).height,
                            hash = %hash256_to_hex(&entry_hash),
                            "new tip"
                        );
                        update.connected.push((entry_hash, block));
                    }
                    ConnectOutcome::Invalid(err) => {
                        warn!(
                            hash = %hash256_to_hex(&inner.index.get(handle).hash),
                            %err,
                            "block failed connection"
                        );
                        inner.index.mark_failed(handle);
                        self.persist_failed(inner)?;
                        last_invalid = Some(err);
                        skipped.clear();
                        continue 'outer;
                    }
                }
            }
        }

        self.flush_locked(inner)?;
        if update.is_empty() {
            if let Some(err) = last_invalid {
                return Err(err.into());
            }
        }
        Ok(update)
    }

    /// Candidate with the most work, the current tip included. Equal
    /// work resolves by the configured tie-break.
    fn find_best_candidate(
        &self,
        inner: &Inner<S>,
        tip: Option<Handle>,
        skipped: &HashSet<Handle>,
    ) -> Option<Handle> {
        let tie = self.params.consensus.tie_break;
        let mut best = tip;
        for handle in inner.index.handles() {
            if skipped.contains(&handle) {
                continue;
            }
            let entry = inner.index.get(handle);
            if !entry.have_data || !entry.status.is_at_least(BlockStatus::TreeValid) {
                continue;
            }
            match best {
                Some(current) if !Self::preferred(&inner.index, handle, current, tie) => {}
                _ => best = Some(handle),
            }
        }
        best
    }

    /// Strict preference of `a` over `b`.
    fn preferred(index: &BlockIndex, a: Handle, b: Handle, tie: TieBreak) -> bool {
        if a == b {
            return false;
        }
        let entry_a = index.get(a);
        let entry_b = index.get(b);
        if entry_a.chain_work != entry_b.chain_work {
            return entry_a.chain_work > entry_b.chain_work;
        }
        match tie {
            TieBreak::FirstSeen => entry_a.sequence < entry_b.sequence,
            TieBreak::LowestHash => {
                U256::from_little_endian(&entry_a.hash) < U256::from_little_endian(&entry_b.hash)
            }
        }
    }

    fn read_block(&self, hash: Hash256) -> Result<Block, ChainStateError> {
        let bytes = self
            .store
            .get(Column::Block, &hash)?
            .ok_or_else(|| ChainStateError::Corrupt("block body missing".into()))?;
        Ok(Block::consensus_decode(&bytes)?)
    }

    /// Apply one block to the coin set inside a scratch cache, run all
    /// script checks in parallel, and merge into the main cache only on
    /// success. Returns the undo data for a later disconnect.
    fn connect_block(
        &self,
        inner: &mut Inner<S>,
        handle: Handle,
        block: &Block,
    ) -> Result<ConnectOutcome, ChainStateError> {
        let height = inner.index.get(handle).height;
        let mut scratch = CoinsCache::new(&mut inner.coins);
        let mut undo = BlockUndo::default();
        let mut total_fees = 0i64;
        // (transaction index, input index, spent script).
        let mut script_checks: Vec<(usize, usize, Vec<u8>)> = Vec::new();

        for (tx_index, tx) in block.transactions.iter().enumerate() {
            let txid = tx.txid();
            if tx_index > 0 {
                let mut spent = Vec::with_capacity(tx.vin.len());
                for (input_index, input) in tx.vin.iter().enumerate() {
                    let coin = match scratch.get_coin(&input.prevout) {
                        Ok(Some(coin)) => coin,
                        Ok(None) => {
                            return Ok(ConnectOutcome::Invalid(ValidationError::MissingInputs))
                        }
                        Err(err) => return coins_failure(err),
                    };
                    script_checks.push((tx_index, input_index, coin.script_pubkey.clone()));
                    spent.push(coin);
                }
                let fee = match check_tx_inputs(tx, &spent, height, &self.params.consensus) {
                    Ok(fee) => fee,
                    Err(err) => return Ok(ConnectOutcome::Invalid(err)),
                };
                total_fees = total_fees.saturating_add(fee);
                for input in &tx.vin {
                    match scratch.spend_coin(&input.prevout) {
                        Ok(coin) => undo.spent.push(SpentCoin {
                            outpoint: input.prevout,
                            coin,
                        }),
                        // A second spend of the same outpoint within
                        // the block lands here as a missing coin.
                        Err(err) => return coins_failure(err),
                    }
                }
            }
            for (vout, output) in tx.vout.iter().enumerate() {
                let coin = Coin {
                    value: output.value,
                    script_pubkey: output.script_pubkey.clone(),
                    height: height as u32,
                    is_coinbase: tx_index == 0,
                };
                if let Err(err) = scratch.add_coin(&OutPoint::new(txid, vout as u32), coin, false)
                {
                    return coins_failure(err);
                }
            }
        }

        let allowed = block_subsidy(height, &self.params.consensus).saturating_add(total_fees);
        match block.transactions[0].value_out() {
            Some(claimed) if claimed <= allowed => {}
            _ => return Ok(ConnectOutcome::Invalid(ValidationError::BadCoinbaseValue)),
        }

        let cache = &self.sig_cache;
        let script_result: Result<(), ValidationError> = script_checks
            .par_iter()
            .try_for_each(|(tx_index, input_index, script_pubkey)| {
                let tx = &block.transactions[*tx_index];
                verify_script(
                    &tx.vin[*input_index].script_sig,
                    script_pubkey,
                    tx,
                    *input_index,
                    Some(cache.as_ref()),
                )
                .map_err(ValidationError::Script)
            });
        if let Err(err) = script_result {
            return Ok(ConnectOutcome::Invalid(err));
        }

        match scratch.flush() {
            Ok(()) => Ok(ConnectOutcome::Connected(undo)),
            Err(err) => Err(disconnected_coins_fault(err)),
        }
    }

    /// Roll the tip block's coin mutations back from its undo data.
    fn disconnect_tip(
        &self,
        inner: &mut Inner<S>,
        update: &mut ChainUpdate,
    ) -> Result<(), ChainStateError> {
        let tip = inner
            .chain
            .tip()
            .ok_or_else(|| ChainStateError::Corrupt("disconnect with no tip".into()))?;
        let entry = inner.index.get(tip);
        let hash = entry.hash;
        let parent = entry
            .parent
            .ok_or_else(|| ChainStateError::Corrupt("cannot disconnect genesis".into()))?;
        let block = self.read_block(hash)?;
        let undo_bytes = self
            .store
            .get(Column::Undo, &hash)?
            .ok_or_else(|| ChainStateError::Corrupt("undo data missing".into()))?;
        let undo = BlockUndo::decode(&undo_bytes)?;

        // Undo entries are grouped per non-coinbase transaction in
        // block order; find each transaction's slice.
        let mut offsets = Vec::with_capacity(block.transactions.len());
        let mut cursor = 0usize;
        for (tx_index, tx) in block.transactions.iter().enumerate() {
            offsets.push(cursor);
            if tx_index > 0 {
                cursor += tx.vin.len();
            }
        }
        if cursor != undo.spent.len() {
            return Err(ChainStateError::Corrupt(
                "undo data does not match block".into(),
            ));
        }

        // Walk transactions in reverse, restoring each one's spent
        // inputs before touching the transaction before it. An output
        // created and spent within the block only reappears in the
        // coin set once its spender's inputs are restored.
        for (tx_index, tx) in block.transactions.iter().enumerate().rev() {
            let txid = tx.txid();
            for vout in (0..tx.vout.len()).rev() {
                inner
                    .coins
                    .spend_coin(&OutPoint::new(txid, vout as u32))
                    .map_err(disconnected_coins_fault)?;
            }
            if tx_index > 0 {
                let start = offsets[tx_index];
                for spent in undo.spent[start..start + tx.vin.len()].iter().rev() {
                    inner
                        .coins
                        .add_coin(&spent.outpoint, spent.coin.clone(), true)
                        .map_err(disconnected_coins_fault)?;
                }
            }
        }

        inner.chain.set_tip(&inner.index, parent);
        info!(
            height = inner.index.get(parent).height,
            hash = %hash256_to_hex(&hash),
            "disconnected block"
        );
        update.disconnected.push((hash, block));
        Ok(())
    }

    fn persist_failed(&self, inner: &Inner<S>) -> Result<(), ChainStateError> {
        let mut batch = WriteBatch::new();
        for handle in inner.index.handles() {
            let entry = inner.index.get(handle);
            if entry.status.is_failed() {
                batch.put(Column::Header, entry.hash.to_vec(), entry.encode());
            }
        }
        self.store.write_batch(batch)?;
        Ok(())
    }

    /// Push the coin cache to disk and record the best block pointer.
    pub fn flush(&self) -> Result<(), ChainStateError> {
        let mut inner = self.lock();
        self.flush_locked(&mut inner)
    }

    fn flush_locked(&self, inner: &mut Inner<S>) -> Result<(), ChainStateError> {
        inner.coins.flush().map_err(disconnected_coins_fault)?;
        if let Some(tip) = inner.chain.tip() {
            let hash = inner.index.get(tip).hash;
            self.store.put(Column::Meta, META_BEST_BLOCK, &hash)?;
        }
        Ok(())
    }
}

/// Outside block connection a coins failure is never a consensus
/// verdict: the undo data or coin set is inconsistent.
fn disconnected_coins_fault(err: CoinsError) -> ChainStateError {
    match err {
        CoinsError::Store(err) => ChainStateError::Store(err),
        other => ChainStateError::Corrupt(other.to_string()),
    }
}
