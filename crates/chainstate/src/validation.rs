//! Context-free and contextual block and transaction checks.

use std::collections::HashSet;

use basaltd_consensus::constants::{
    LOCKTIME_THRESHOLD, MAX_COINBASE_SCRIPT_SIZE, MAX_SCRIPT_SIZE, MIN_BLOCK_VERSION,
    MIN_COINBASE_SCRIPT_SIZE, SEQUENCE_FINAL,
};
use basaltd_consensus::money::money_range;
use basaltd_consensus::params::ConsensusParams;
use basaltd_primitives::block::Block;
use basaltd_primitives::transaction::Transaction;
use basaltd_script::{count_sigops, encode_script_num, ScriptError};

use crate::coins::Coin;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationError {
    BadVersion,
    BadProofOfWork,
    TimeTooOld,
    TimeTooFar,
    BlockTooLarge,
    EmptyBlock,
    BadMerkleRoot,
    FirstTxNotCoinbase,
    ExtraCoinbase,
    DuplicateTxid,
    EmptyInputs,
    EmptyOutputs,
    OversizedTransaction,
    ValueOutOfRange,
    DuplicateInput,
    ScriptTooLarge,
    BadCoinbaseScriptSize,
    BadCoinbaseHeight,
    BadCoinbaseValue,
    NonFinalTransaction,
    MissingInputs,
    PrematureCoinbaseSpend,
    InsufficientInputValue,
    TooManySigOps,
    Script(ScriptError),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::BadVersion => write!(f, "block version too old"),
            ValidationError::BadProofOfWork => write!(f, "proof of work check failed"),
            ValidationError::TimeTooOld => write!(f, "block time before median time past"),
            ValidationError::TimeTooFar => write!(f, "block time too far in the future"),
            ValidationError::BlockTooLarge => write!(f, "serialized block exceeds size limit"),
            ValidationError::EmptyBlock => write!(f, "block has no transactions"),
            ValidationError::BadMerkleRoot => write!(f, "merkle root mismatch"),
            ValidationError::FirstTxNotCoinbase => write!(f, "first transaction not coinbase"),
            ValidationError::ExtraCoinbase => write!(f, "more than one coinbase"),
            ValidationError::DuplicateTxid => write!(f, "duplicate transaction in block"),
            ValidationError::EmptyInputs => write!(f, "transaction has no inputs"),
            ValidationError::EmptyOutputs => write!(f, "transaction has no outputs"),
            ValidationError::OversizedTransaction => {
                write!(f, "transaction exceeds block size limit")
            }
            ValidationError::ValueOutOfRange => write!(f, "output value out of range"),
            ValidationError::DuplicateInput => write!(f, "duplicate input within transaction"),
            ValidationError::ScriptTooLarge => write!(f, "script exceeds size limit"),
            ValidationError::BadCoinbaseScriptSize => {
                write!(f, "coinbase script size out of range")
            }
            ValidationError::BadCoinbaseHeight => write!(f, "coinbase height commitment wrong"),
            ValidationError::BadCoinbaseValue => write!(f, "coinbase pays more than allowed"),
            ValidationError::NonFinalTransaction => write!(f, "transaction is not final"),
            ValidationError::MissingInputs => write!(f, "spent output not found"),
            ValidationError::PrematureCoinbaseSpend => {
                write!(f, "coinbase spent before maturity")
            }
            ValidationError::InsufficientInputValue => {
                write!(f, "inputs worth less than outputs")
            }
            ValidationError::TooManySigOps => write!(f, "signature operation limit exceeded"),
            ValidationError::Script(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ScriptError> for ValidationError {
    fn from(err: ScriptError) -> Self {
        ValidationError::Script(err)
    }
}

/// Checks that need nothing beyond the transaction itself.
pub fn check_transaction(tx: &Transaction, params: &ConsensusParams) -> Result<(), ValidationError> {
    if tx.vin.is_empty() {
        return Err(ValidationError::EmptyInputs);
    }
    if tx.vout.is_empty() {
        return Err(ValidationError::EmptyOutputs);
    }
    if tx.serialized_size() > params.max_block_size {
        return Err(ValidationError::OversizedTransaction);
    }
    let mut total_out = 0i64;
    for output in &tx.vout {
        if !money_range(output.value) {
            return Err(ValidationError::ValueOutOfRange);
        }
        if output.script_pubkey.len() > MAX_SCRIPT_SIZE {
            return Err(ValidationError::ScriptTooLarge);
        }
        total_out = total_out
            .checked_add(output.value)
            .filter(|total| money_range(*total))
            .ok_or(ValidationError::ValueOutOfRange)?;
    }
    let mut seen = HashSet::with_capacity(tx.vin.len());
    for input in &tx.vin {
        if input.script_sig.len() > MAX_SCRIPT_SIZE {
            return Err(ValidationError::ScriptTooLarge);
        }
        if !seen.insert(input.prevout) {
            return Err(ValidationError::DuplicateInput);
        }
    }
    if tx.is_coinbase() {
        let script_len = tx.vin[0].script_sig.len();
        if !(MIN_COINBASE_SCRIPT_SIZE..=MAX_COINBASE_SCRIPT_SIZE).contains(&script_len) {
            return Err(ValidationError::BadCoinbaseScriptSize);
        }
    } else {
        for input in &tx.vin {
            if input.prevout.is_null() {
                return Err(ValidationError::EmptyInputs);
            }
        }
    }
    Ok(())
}

/// Signature-operation cost of a transaction, counted without the
/// spent-output context.
pub fn transaction_sigops(tx: &Transaction) -> u32 {
    let mut sigops = 0u32;
    for input in &tx.vin {
        sigops += count_sigops(&input.script_sig, false);
    }
    for output in &tx.vout {
        sigops += count_sigops(&output.script_pubkey, false);
    }
    sigops
}

/// Context-free block checks: structure, merkle commitment, size and
/// aggregate signature-operation limits.
pub fn check_block(block: &Block, params: &ConsensusParams) -> Result<(), ValidationError> {
    if block.transactions.is_empty() {
        return Err(ValidationError::EmptyBlock);
    }
    if block.serialized_size() > params.max_block_size {
        return Err(ValidationError::BlockTooLarge);
    }
    if !block.transactions[0].is_coinbase() {
        return Err(ValidationError::FirstTxNotCoinbase);
    }
    for tx in &block.transactions[1..] {
        if tx.is_coinbase() {
            return Err(ValidationError::ExtraCoinbase);
        }
    }
    let txids = block.txids();
    let mut seen = HashSet::with_capacity(txids.len());
    for txid in &txids {
        if !seen.insert(*txid) {
            return Err(ValidationError::DuplicateTxid);
        }
    }
    if block.header.merkle_root != block.computed_merkle_root() {
        return Err(ValidationError::BadMerkleRoot);
    }
    let mut sigops = 0u32;
    for tx in &block.transactions {
        check_transaction(tx, params)?;
        sigops = sigops.saturating_add(transaction_sigops(tx));
    }
    if sigops > params.max_block_sigops {
        return Err(ValidationError::TooManySigOps);
    }
    Ok(())
}

/// Script push committing to the block height, placed at the front of
/// the coinbase script.
pub fn height_script(height: i32) -> Vec<u8> {
    if (1..=16).contains(&height) {
        // OP_1 through OP_16.
        return vec![0x50 + height as u8];
    }
    let num = encode_script_num(i64::from(height));
    let mut script = Vec::with_capacity(num.len() + 1);
    script.push(num.len() as u8);
    script.extend_from_slice(&num);
    script
}

/// Require the coinbase script to start with the expected height push.
pub fn check_coinbase_height(block: &Block, height: i32) -> Result<(), ValidationError> {
    if height == 0 {
        return Ok(());
    }
    let expected = height_script(height);
    let script = &block.transactions[0].vin[0].script_sig;
    if script.len() < expected.len() || script[..expected.len()] != expected[..] {
        return Err(ValidationError::BadCoinbaseHeight);
    }
    Ok(())
}

/// Lock-time finality at the given height and timestamp.
pub fn is_final_tx(tx: &Transaction, height: i32, block_time: i64) -> bool {
    if tx.lock_time == 0 {
        return true;
    }
    let threshold = if tx.lock_time < LOCKTIME_THRESHOLD {
        i64::from(height)
    } else {
        block_time
    };
    if i64::from(tx.lock_time) < threshold {
        return true;
    }
    tx.vin.iter().all(|input| input.sequence == SEQUENCE_FINAL)
}

/// Header version floor, applied contextually on accept.
pub fn check_block_version(version: i32) -> Result<(), ValidationError> {
    if version < MIN_BLOCK_VERSION {
        return Err(ValidationError::BadVersion);
    }
    Ok(())
}

/// Validate a non-coinbase transaction's inputs against the coins it
/// spends and return the fee. `spent` is in input order.
pub fn check_tx_inputs(
    tx: &Transaction,
    spent: &[Coin],
    spend_height: i32,
    params: &ConsensusParams,
) -> Result<i64, ValidationError> {
    debug_assert_eq!(tx.vin.len(), spent.len());
    let mut total_in = 0i64;
    for coin in spent {
        if coin.is_coinbase && spend_height - (coin.height as i32) < params.coinbase_maturity {
            return Err(ValidationError::PrematureCoinbaseSpend);
        }
        if !money_range(coin.value) {
            return Err(ValidationError::ValueOutOfRange);
        }
        total_in = total_in
            .checked_add(coin.value)
            .filter(|total| money_range(*total))
            .ok_or(ValidationError::ValueOutOfRange)?;
    }
    let total_out = tx.value_out().ok_or(ValidationError::ValueOutOfRange)?;
    if total_in < total_out {
        return Err(ValidationError::InsufficientInputValue);
    }
    Ok(total_in - total_out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use basaltd_consensus::params::{chain_params, Network};
    use basaltd_primitives::outpoint::OutPoint;
    use basaltd_primitives::transaction::{TxIn, TxOut};

    fn params() -> ConsensusParams {
        chain_params(Network::Regtest).consensus
    }

    fn simple_tx() -> Transaction {
        Transaction {
            version: 1,
            vin: vec![TxIn {
                prevout: OutPoint::new([9u8; 32], 0),
                script_sig: vec![0x51],
                sequence: SEQUENCE_FINAL,
            }],
            vout: vec![TxOut {
                value: 1_000,
                script_pubkey: vec![0x51],
            }],
            lock_time: 0,
        }
    }

    #[test]
    fn rejects_empty_inputs_and_outputs() {
        let mut tx = simple_tx();
        tx.vin.clear();
        assert_eq!(
            check_transaction(&tx, &params()),
            Err(ValidationError::EmptyInputs)
        );
        let mut tx = simple_tx();
        tx.vout.clear();
        assert_eq!(
            check_transaction(&tx, &params()),
            Err(ValidationError::EmptyOutputs)
        );
    }

    #[test]
    fn rejects_duplicate_inputs() {
        let mut tx = simple_tx();
        tx.vin.push(tx.vin[0].clone());
        assert_eq!(
            check_transaction(&tx, &params()),
            Err(ValidationError::DuplicateInput)
        );
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut tx = simple_tx();
        tx.vout[0].value = -1;
        assert_eq!(
            check_transaction(&tx, &params()),
            Err(ValidationError::ValueOutOfRange)
        );
        let mut tx = simple_tx();
        tx.vout[0].value = basaltd_consensus::money::MAX_MONEY;
        tx.vout.push(TxOut {
            value: 1,
            script_pubkey: Vec::new(),
        });
        assert_eq!(
            check_transaction(&tx, &params()),
            Err(ValidationError::ValueOutOfRange)
        );
    }

    #[test]
    fn coinbase_script_size_bounds() {
        let mut tx = simple_tx();
        tx.vin[0].prevout = OutPoint::null();
        tx.vin[0].script_sig = vec![0x00];
        assert_eq!(
            check_transaction(&tx, &params()),
            Err(ValidationError::BadCoinbaseScriptSize)
        );
        tx.vin[0].script_sig = vec![0x00; MAX_COINBASE_SCRIPT_SIZE + 1];
        assert_eq!(
            check_transaction(&tx, &params()),
            Err(ValidationError::BadCoinbaseScriptSize)
        );
        tx.vin[0].script_sig = vec![0x00, 0x01];
        assert_eq!(check_transaction(&tx, &params()), Ok(()));
    }

    #[test]
    fn height_script_small_and_large() {
        assert_eq!(height_script(1), vec![0x51]);
        assert_eq!(height_script(16), vec![0x60]);
        assert_eq!(height_script(17), vec![0x01, 17]);
        assert_eq!(height_script(300), vec![0x02, 0x2c, 0x01]);
    }

    #[test]
    fn finality_rules() {
        let mut tx = simple_tx();
        assert!(is_final_tx(&tx, 0, 0));

        tx.lock_time = 100;
        tx.vin[0].sequence = 0;
        assert!(!is_final_tx(&tx, 100, 0));
        assert!(is_final_tx(&tx, 101, 0));

        tx.lock_time = LOCKTIME_THRESHOLD + 50;
        assert!(!is_final_tx(&tx, 101, i64::from(LOCKTIME_THRESHOLD)));
        assert!(is_final_tx(&tx, 101, i64::from(LOCKTIME_THRESHOLD) + 51));

        // Final sequences override the lock time.
        tx.vin[0].sequence = SEQUENCE_FINAL;
        assert!(is_final_tx(&tx, 0, 0));
    }

    #[test]
    fn input_checks_enforce_maturity_and_fee() {
        let tx = simple_tx();
        let young_coinbase = Coin {
            value: 2_000,
            script_pubkey: vec![0x51],
            height: 50,
            is_coinbase: true,
        };
        assert_eq!(
            check_tx_inputs(&tx, &[young_coinbase.clone()], 149, &params()),
            Err(ValidationError::PrematureCoinbaseSpend)
        );
        assert_eq!(
            check_tx_inputs(&tx, &[young_coinbase], 150, &params()),
            Ok(1_000)
        );

        let poor = Coin {
            value: 500,
            script_pubkey: vec![0x51],
            height: 1,
            is_coinbase: false,
        };
        assert_eq!(
            check_tx_inputs(&tx, &[poor], 150, &params()),
            Err(ValidationError::InsufficientInputValue)
        );
    }
}
